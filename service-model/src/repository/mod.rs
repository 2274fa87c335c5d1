//! Fluent repository layer
//!
//! This module turns fluent directive calls into an engine-agnostic
//! [`QueryState`] and hands it to a pluggable [`DataAccessor`].
//!
//! # Features
//!
//! - **Predicates**: [`PredicateBuilder`] for equality, comparison, between/in,
//!   null, date-part, search and grouped conditions
//! - **Relations**: [`RelationBuilder`] and [`RelationSpec`] for eager loading,
//!   counting and relation-existence filters from declarative directives
//! - **Validation**: [`ValidationGate`] runs a [`Validator`] before every write
//! - **Facade**: [`ServiceModel`] with find/list/count/paginate and validated
//!   create/update/delete, plus transaction boundaries
//!
//! # Example
//!
//! ```rust,ignore
//! use service_model::repository::{
//!     ModelDefinition, Operator, PredicateBuilder, RelationBuilder, RelationSpec, Rule,
//!     SaveOutcome, ServiceModel,
//! };
//!
//! let metadata = ModelDefinition::new("users").with_fillable(["name", "email"]);
//! let mut users = ServiceModel::new(PgUsers::new(pool), metadata);
//!
//! let active = users
//!     .query()
//!     .push_where("status", "active")
//!     .push_where_cmp("age", Operator::GreaterThanOrEqual, 18)
//!     .push_with(RelationSpec::new().plain("roles").skip("avatar"))?
//!     .all(None)
//!     .await?;
//!
//! match users.create(data, Rule::Default).await? {
//!     SaveOutcome::Saved(user) => println!("created {:?}", user),
//!     SaveOutcome::Invalid => eprintln!("{}", users.validation_errors()),
//!     SaveOutcome::NotFound => unreachable!(),
//! }
//! ```

mod accessor;
mod error;
mod metadata;
mod predicate;
mod query;
mod relation;
mod service;
mod state;
mod transaction;
mod validation;
mod value;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export all public types
pub use accessor::{DataAccessor, DeleteMethod, OrderDirection, Page, Pagination};
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult};
pub use metadata::{qualify_columns, IndexableGroup, ListableSpec, ModelDefinition, RecordMetadata};
pub use predicate::{
    Clause, Combinator, Condition, DatePart, Operator, Predicate, PredicateBuilder, PredicateKind,
};
pub use query::Query;
pub use relation::{
    normalize_directive, resolve_directives, state_from_directives, Associations, ClauseKind,
    CustomFilter, RelationBuilder, RelationFilter, RelationInstruction, RelationMode,
    RelationOptions, RelationSpec, SubOperation,
};
pub use service::{SaveOutcome, ServiceModel, SortOptions};
pub use state::QueryState;
pub use validation::{
    Constraint, Rule, RuleSet, RuleValidator, RuleValidatorBuilder, ValidationErrors,
    ValidationGate, ValidationOptions, ValidationResult, Validator,
};
pub use value::{Record, Value};
