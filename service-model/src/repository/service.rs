//! Service model facade
//!
//! [`ServiceModel`] ties one [`DataAccessor`], the record type's
//! [`RecordMetadata`] and a [`ValidationGate`] together. Queries are opened
//! with [`ServiceModel::query`]; the convenience methods below open one
//! internally for the common single-call cases.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::accessor::{DataAccessor, DeleteMethod};
use super::error::RepositoryResult;
use super::metadata::RecordMetadata;
use super::query::Query;
use super::validation::{Rule, RuleValidator, ValidationErrors, ValidationGate, Validator};
use super::value::{Record, Value};
use crate::config::{Config, QueryConfig};
use crate::error::{Error, Result};

/// Result of a validated write
///
/// Validation failures and missing update targets are expected outcomes, not
/// errors. After [`SaveOutcome::Invalid`] the failing fields are available from
/// [`ServiceModel::validation_errors`].
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome<T> {
    Saved(T),
    /// The data did not pass the rule set
    Invalid,
    /// The update target does not exist
    NotFound,
}

impl<T> SaveOutcome<T> {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }

    /// The saved value, if any
    pub fn saved(self) -> Option<T> {
        match self {
            Self::Saved(value) => Some(value),
            Self::Invalid | Self::NotFound => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SaveOutcome<U> {
        match self {
            Self::Saved(value) => SaveOutcome::Saved(f(value)),
            Self::Invalid => SaveOutcome::Invalid,
            Self::NotFound => SaveOutcome::NotFound,
        }
    }
}

/// Requested sort for a paginated listing
///
/// `column` is matched case-insensitively against the group's sortable
/// columns; an `order` other than `desc` sorts ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptions {
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default = "default_order")]
    pub order: String,
}

fn default_order() -> String {
    "asc".to_string()
}

impl SortOptions {
    pub fn new(column: impl Into<String>, order: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            order: order.into(),
        }
    }
}

/// Repository facade for one record type
pub struct ServiceModel<A> {
    pub(super) accessor: A,
    pub(super) metadata: Box<dyn RecordMetadata>,
    pub(super) gate: ValidationGate,
    pub(super) query_config: QueryConfig,
}

impl<A: DataAccessor> ServiceModel<A> {
    pub fn new(accessor: A, metadata: impl RecordMetadata + 'static) -> Self {
        let query_config = QueryConfig::default();
        Self {
            accessor,
            metadata: Box::new(metadata),
            gate: ValidationGate::new(query_config.default_rule.clone()),
            query_config,
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.gate.set_validator(Box::new(validator));
        self
    }

    #[must_use]
    pub fn with_query_config(mut self, query_config: QueryConfig) -> Self {
        self.gate.set_default_rule(query_config.default_rule.clone());
        self.query_config = query_config;
        self
    }

    /// Build a service model for the configured model `name`
    ///
    /// Metadata comes from `[models.<name>]`; when `[rules.<name>]` is present
    /// a [`RuleValidator`] is installed.
    pub fn from_config(accessor: A, config: &Config, name: &str) -> Result<Self> {
        let definition = config
            .model(name)
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))?
            .clone();

        let mut model = Self::new(accessor, definition).with_query_config(config.query.clone());
        if let Some(rules) = config.rules_for(name) {
            model.gate.set_validator(Box::new(RuleValidator::from_rules(rules)?));
        }

        debug!(
            model = name,
            table = model.metadata.table(),
            validator = model.gate.has_validator(),
            "Service model configured"
        );
        Ok(model)
    }

    /// Open a new query with empty state
    pub fn query(&mut self) -> Query<'_, A> {
        Query::new(self)
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn metadata(&self) -> &dyn RecordMetadata {
        self.metadata.as_ref()
    }

    pub fn query_config(&self) -> &QueryConfig {
        &self.query_config
    }

    /// Errors of the most recent failed validation
    pub fn validation_errors(&self) -> &ValidationErrors {
        self.gate.errors()
    }

    pub fn set_validation_errors(&mut self, errors: impl Into<ValidationErrors>) {
        self.gate.set_errors(errors.into());
    }

    pub fn take_validation_errors(&mut self) -> ValidationErrors {
        self.gate.take_errors()
    }

    /// Run the validation gate without writing anything
    pub fn validate_for(&mut self, rule: impl Into<Rule>, data: &Record) -> bool {
        self.gate.validate_for(&rule.into(), data)
    }

    // ==================== Single-call shortcuts ====================

    pub async fn all(&mut self, columns: Option<&[&str]>) -> RepositoryResult<Vec<Record>> {
        self.query().all(columns).await
    }

    pub async fn find(
        &mut self,
        id: impl Into<Value>,
        columns: Option<&[&str]>,
    ) -> RepositoryResult<Option<Record>> {
        self.query().find(id, columns).await
    }

    pub async fn find_count(&mut self) -> RepositoryResult<u64> {
        self.query().find_count().await
    }

    pub async fn exists(&mut self, id: impl Into<Value>) -> RepositoryResult<bool> {
        self.query().exists(id).await
    }

    pub async fn create(
        &mut self,
        data: Record,
        rule: impl Into<Rule>,
    ) -> RepositoryResult<SaveOutcome<Record>> {
        self.query().create(data, rule).await
    }

    pub async fn update(
        &mut self,
        data: Record,
        id: impl Into<Value>,
        rule: impl Into<Rule>,
    ) -> RepositoryResult<SaveOutcome<Record>> {
        self.query().update(data, id, rule).await
    }

    pub async fn delete(
        &mut self,
        id: impl Into<Value>,
        method: DeleteMethod,
    ) -> RepositoryResult<u64> {
        self.query().delete(id, method).await
    }
}

impl<A> std::fmt::Debug for ServiceModel<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceModel")
            .field("table", &self.metadata.table())
            .field("gate", &self.gate)
            .field("query_config", &self.query_config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{record, scripted_validator, Call, RecordingAccessor};
    use crate::repository::ModelDefinition;

    const CONFIG: &str = r#"
[query]
default_rule = "store"
max_per_page = 50

[models.posts]
table = "posts"
fillable = ["title", "body"]

[rules.posts.store]
title = "required|string|max:10"
"#;

    #[test]
    fn test_save_outcome_helpers() {
        assert!(SaveOutcome::Saved(1).is_saved());
        assert_eq!(SaveOutcome::Saved(2).map(|n| n * 2), SaveOutcome::Saved(4));
        assert_eq!(SaveOutcome::<u8>::Invalid.saved(), None);
        assert!(!SaveOutcome::<u8>::NotFound.is_saved());
    }

    #[test]
    fn test_sort_options_deserialize_with_default_order() {
        let sort: SortOptions = serde_json::from_str(r#"{"column": "name"}"#).unwrap();
        assert_eq!(sort, SortOptions::new("name", "asc"));
    }

    #[tokio::test]
    async fn test_from_config_installs_rule_validator() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let mut model = ServiceModel::from_config(RecordingAccessor::default(), &config, "posts")
            .unwrap();
        assert_eq!(model.query_config().max_per_page, 50);
        assert_eq!(model.metadata().table(), "posts");

        let outcome = model.create(record(&[("body", "x".into())]), Rule::Default).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Invalid);
        assert_eq!(
            model.validation_errors().first("title"),
            Some("The title field is required.")
        );

        let outcome = model
            .create(record(&[("title", "Hello".into())]), Rule::Default)
            .await
            .unwrap();
        assert!(outcome.is_saved());
    }

    #[test]
    fn test_from_config_unknown_model() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let err = ServiceModel::from_config(RecordingAccessor::default(), &config, "comments")
            .unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(name) if name == "comments"));
    }

    #[test]
    fn test_validation_errors_can_be_replaced() {
        let mut model = ServiceModel::new(RecordingAccessor::default(), ModelDefinition::new("t"))
            .with_validator(scripted_validator(&[("name", "bad")]));
        assert!(!model.validate_for("store", &Record::new()));
        assert_eq!(model.validation_errors().first("name"), Some("bad"));

        let mut replacement = ValidationErrors::new();
        replacement.add("email", "taken");
        model.set_validation_errors(replacement);
        assert_eq!(model.validation_errors().first("email"), Some("taken"));
        assert!(model.validation_errors().get("name").is_none());

        assert_eq!(model.take_validation_errors().len(), 1);
        assert!(model.validation_errors().is_empty());
    }

    #[tokio::test]
    async fn test_shortcuts_open_fresh_queries() {
        let mut model = ServiceModel::new(
            RecordingAccessor::default().with_count(2),
            ModelDefinition::new("t"),
        );
        assert!(model.exists(1).await.unwrap());
        assert_eq!(model.find_count().await.unwrap(), 2);

        let calls = model.accessor().calls();
        let Some(Call::Count(state)) = calls.last() else {
            panic!("expected count, got {:?}", calls);
        };
        assert!(state.is_empty());
    }
}
