//! # service-model
//!
//! Fluent repository layer for record-oriented services. Callers compose
//! queries (predicates, sorting, limits, relation loading, searches), run
//! validated writes and manage transactions without per-record-type
//! boilerplate. Execution is delegated to a pluggable
//! [`DataAccessor`](repository::DataAccessor); this crate only builds the
//! engine-agnostic [`QueryState`](repository::QueryState) it consumes.
//!
//! ## Features
//!
//! - **Fluent predicates**: equality shorthand and explicit operators, between/in,
//!   null, date-part, search and grouped conditions
//! - **Relation directives**: eager loading, counting and existence filters from
//!   names, lists or declarative option maps
//! - **Validated writes**: a validation gate ahead of every create/update, with
//!   a config-driven rule validator
//! - **Configuration**: Figment-based config with model metadata and rule sets
//! - **Observability**: structured `tracing` events and a JSON subscriber
//!
//! ## Example
//!
//! ```rust,ignore
//! use service_model::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let mut posts = ServiceModel::from_config(PgPosts::connect().await?, &config, "posts")?;
//!     let published = posts
//!         .query()
//!         .push_where("status", "published")
//!         .push_with(["author"])?
//!         .all(None)
//!         .await?;
//!
//!     println!("{} published posts", published.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod repository;

pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, QueryConfig, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::{init_tracing, shutdown_tracing};

    pub use crate::repository::{
        Associations, DataAccessor, DeleteMethod, ModelDefinition, Operator, OrderDirection, Page,
        Pagination, PredicateBuilder, QueryState, Record, RecordMetadata, RelationBuilder,
        RelationSpec, RepositoryError, RepositoryErrorKind, RepositoryResult, Rule, RuleValidator,
        SaveOutcome, ServiceModel, SortOptions, ValidationErrors, Validator, Value,
    };
}
