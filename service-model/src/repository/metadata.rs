//! Record metadata
//!
//! Per record type the service model needs to know the table and key, which
//! columns are fillable, sortable, listable, indexable and show-able, and which
//! relations are always loaded. [`RecordMetadata`] is that contract;
//! [`ModelDefinition`] implements it from the `[models.<name>]` config section.
//!
//! ```toml
//! [models.posts]
//! table = "posts"
//! fillable = ["title", "body", "status"]
//! show_able = ["id", "title", "body"]
//! required_with = ["author"]
//!
//! [models.posts.sortable]
//! list = ["title", "created_at"]
//!
//! [models.posts.indexable.list]
//! columns = ["title", "status"]
//! hidden = ["body"]
//!
//! [models.posts.listable]
//! columns = ["id", "title"]
//! key = "id"
//! value = "title"
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;
use super::relation::RelationSpec;
use super::value::Value;

/// Columns used to build a key/value selection list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListableSpec {
    pub columns: Vec<String>,
    pub key: String,
    pub value: String,
}

impl ListableSpec {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        Self {
            columns: vec![key.clone(), value.clone()],
            key,
            value,
        }
    }
}

/// Per-record-type column and relation metadata
pub trait RecordMetadata: Send + Sync {
    fn table(&self) -> &str;

    /// Primary key column
    fn key_name(&self) -> &str;

    fn fillable(&self) -> Vec<String>;

    /// Sortable columns of a named group
    fn sortable(&self, group: &str) -> Vec<String>;

    fn is_sortable(&self, column: &str, group: &str) -> bool {
        self.sortable(group).iter().any(|c| c == column)
    }

    fn listable(&self) -> ListableSpec;

    /// Columns shown on an index view of a named group
    ///
    /// `full` puts the key first, `hidden` adds the group's hidden columns.
    fn indexable(&self, full: bool, hidden: bool, group: &str) -> Vec<String>;

    /// Columns shown on a detail view
    fn show_able(&self) -> Vec<String>;

    /// Relations loaded with every query that asks for required relations
    fn required_relations(&self) -> RepositoryResult<RelationSpec>;

    /// Key column followed by fillable columns
    fn default_columns(&self) -> Vec<String> {
        let key = self.key_name().to_string();
        let mut columns = vec![key.clone()];
        columns.extend(self.fillable().into_iter().filter(|c| *c != key));
        columns
    }
}

/// Index column group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableGroup {
    #[serde(default)]
    pub columns: Vec<String>,
    /// Columns only included on request
    #[serde(default)]
    pub hidden: Vec<String>,
}

/// Record metadata loaded from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub table: String,

    #[serde(default = "default_key")]
    pub key: String,

    #[serde(default)]
    pub fillable: Vec<String>,

    /// Group name to sortable columns
    #[serde(default)]
    pub sortable: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub listable: Option<ListableSpec>,

    /// Group name to index columns
    #[serde(default)]
    pub indexable: BTreeMap<String, IndexableGroup>,

    #[serde(default)]
    pub show_able: Vec<String>,

    /// Relation spec in declarative form (name, list or map of options)
    #[serde(default)]
    pub required_with: Value,
}

fn default_key() -> String {
    "id".to_string()
}

impl ModelDefinition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: default_key(),
            fillable: Vec::new(),
            sortable: BTreeMap::new(),
            listable: None,
            indexable: BTreeMap::new(),
            show_able: Vec::new(),
            required_with: Value::Null,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn with_fillable<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_sortable<I, S>(mut self, group: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sortable
            .insert(group.into(), columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_indexable(mut self, group: impl Into<String>, index: IndexableGroup) -> Self {
        self.indexable.insert(group.into(), index);
        self
    }

    #[must_use]
    pub fn with_listable(mut self, listable: ListableSpec) -> Self {
        self.listable = Some(listable);
        self
    }

    #[must_use]
    pub fn with_show_able<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.show_able = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_required(mut self, relations: impl Into<Value>) -> Self {
        self.required_with = relations.into();
        self
    }
}

impl RecordMetadata for ModelDefinition {
    fn table(&self) -> &str {
        &self.table
    }

    fn key_name(&self) -> &str {
        &self.key
    }

    fn fillable(&self) -> Vec<String> {
        self.fillable.clone()
    }

    fn sortable(&self, group: &str) -> Vec<String> {
        self.sortable.get(group).cloned().unwrap_or_default()
    }

    /// Falls back to the key and a `name` column
    fn listable(&self) -> ListableSpec {
        self.listable
            .clone()
            .unwrap_or_else(|| ListableSpec::new(self.key.clone(), "name"))
    }

    /// A group with no index definition shows the fillable columns
    fn indexable(&self, full: bool, hidden: bool, group: &str) -> Vec<String> {
        let mut columns = Vec::new();
        if full {
            columns.push(self.key.clone());
        }

        let (visible, extra) = match self.indexable.get(group) {
            Some(index) => (index.columns.clone(), index.hidden.clone()),
            None => (self.fillable.clone(), Vec::new()),
        };
        let extra = if hidden { extra } else { Vec::new() };

        for column in visible.into_iter().chain(extra) {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }

    /// An empty show-able list shows the key and fillable columns
    fn show_able(&self) -> Vec<String> {
        if self.show_able.is_empty() {
            self.default_columns()
        } else {
            self.show_able.clone()
        }
    }

    fn required_relations(&self) -> RepositoryResult<RelationSpec> {
        RelationSpec::try_from(self.required_with.clone())
    }
}

/// Prefix bare column names with their table
///
/// Names that already carry a qualifier and the `*` wildcard are left alone.
///
/// ```rust
/// use service_model::repository::qualify_columns;
///
/// let columns = qualify_columns(&["id", "roles.name", "*"], "users");
/// assert_eq!(columns, vec!["users.id", "roles.name", "*"]);
/// ```
pub fn qualify_columns<S: AsRef<str>>(columns: &[S], table: &str) -> Vec<String> {
    columns
        .iter()
        .map(|column| {
            let column = column.as_ref();
            if column.contains('.') || column == "*" || table.is_empty() {
                column.to_string()
            } else {
                format!("{}.{}", table, column)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RelationOptions;

    fn posts() -> ModelDefinition {
        ModelDefinition::new("posts")
            .with_fillable(["title", "body", "status"])
            .with_sortable("list", ["title", "created_at"])
            .with_indexable(
                "list",
                IndexableGroup {
                    columns: vec!["title".into(), "status".into()],
                    hidden: vec!["body".into()],
                },
            )
    }

    #[test]
    fn test_default_columns_are_key_then_fillable() {
        assert_eq!(posts().default_columns(), vec!["id", "title", "body", "status"]);
    }

    #[test]
    fn test_sortable_by_group() {
        let model = posts();
        assert!(model.is_sortable("title", "list"));
        assert!(!model.is_sortable("body", "list"));
        assert!(!model.is_sortable("title", "admin"));
    }

    #[test]
    fn test_indexable_flags() {
        let model = posts();
        assert_eq!(model.indexable(false, false, "list"), vec!["title", "status"]);
        assert_eq!(
            model.indexable(true, false, "list"),
            vec!["id", "title", "status"]
        );
        assert_eq!(
            model.indexable(true, true, "list"),
            vec!["id", "title", "status", "body"]
        );
        assert_eq!(
            model.indexable(false, true, "missing"),
            vec!["title", "body", "status"]
        );
    }

    #[test]
    fn test_listable_fallback() {
        let listable = posts().listable();
        assert_eq!(listable.key, "id");
        assert_eq!(listable.value, "name");
        assert_eq!(listable.columns, vec!["id", "name"]);

        let model = posts().with_listable(ListableSpec::new("id", "title"));
        assert_eq!(model.listable().value, "title");
    }

    #[test]
    fn test_show_able_fallback() {
        assert_eq!(posts().show_able(), posts().default_columns());
        let model = posts().with_show_able(["id", "title"]);
        assert_eq!(model.show_able(), vec!["id", "title"]);
    }

    #[test]
    fn test_required_relations_from_value() {
        let model = posts().with_required(vec!["author", "tags"]);
        let spec = model.required_relations().unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.entries()[0].1, RelationOptions::Plain);

        assert!(posts().required_relations().unwrap().is_empty());
        assert!(posts().with_required(5).required_relations().is_err());
    }

    #[test]
    fn test_model_definition_deserializes_with_defaults() {
        let model: ModelDefinition = serde_json::from_str(r#"{"table": "users"}"#).unwrap();
        assert_eq!(model.key, "id");
        assert!(model.fillable.is_empty());
        assert_eq!(model.required_with, Value::Null);
    }

    #[test]
    fn test_qualify_columns() {
        assert_eq!(
            qualify_columns(&["id".to_string(), "name".to_string()], "tags"),
            vec!["tags.id", "tags.name"]
        );
        assert_eq!(qualify_columns(&["id"], ""), vec!["id"]);
    }
}
