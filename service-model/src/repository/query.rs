//! Per-query builder
//!
//! [`ServiceModel::query`] hands out a [`Query`] that owns a fresh
//! [`QueryState`]. Directive calls consume and return the builder; terminal
//! calls consume it for good, so predicates and relations of one logical query
//! can never leak into the next.
//!
//! # Example
//!
//! ```rust,ignore
//! use service_model::repository::{Operator, PredicateBuilder, RelationBuilder};
//!
//! let adults = users
//!     .query()
//!     .push_where("status", "active")
//!     .push_where_cmp("age", Operator::GreaterThan, 18)
//!     .push_with(["roles"])?
//!     .all(None)
//!     .await?;
//! ```

use tracing::{debug, info, warn};

use super::accessor::{DataAccessor, DeleteMethod, OrderDirection, Page, Pagination};
use super::error::{RepositoryOperation, RepositoryResult};
use super::metadata::{qualify_columns, ListableSpec};
use super::predicate::{Operator, PredicateBuilder};
use super::relation::{Associations, RelationBuilder, RelationSpec};
use super::service::{SaveOutcome, ServiceModel, SortOptions};
use super::state::QueryState;
use super::validation::Rule;
use super::value::{Record, Value};

/// One logical query against a [`ServiceModel`]
pub struct Query<'a, A> {
    model: &'a mut ServiceModel<A>,
    state: QueryState,
}

impl<A> PredicateBuilder for Query<'_, A> {
    fn query_state(&mut self) -> &mut QueryState {
        &mut self.state
    }
}

impl<A> RelationBuilder for Query<'_, A> {}

impl<'a, A: DataAccessor> Query<'a, A> {
    pub(super) fn new(model: &'a mut ServiceModel<A>) -> Self {
        Self {
            model,
            state: QueryState::new(),
        }
    }

    /// Directives accumulated so far
    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Abandon the query and keep its state
    pub fn into_state(self) -> QueryState {
        self.state
    }

    /// Eager-load `spec` plus the model's required relations
    ///
    /// Entries named in `spec`, including skipped ones, take precedence over
    /// the required defaults.
    pub fn push_with_required(self, spec: impl Into<RelationSpec>) -> RepositoryResult<Self> {
        let required = self.model.metadata.required_relations()?;
        let spec = spec.into().with_required(&required);
        self.push_with(spec)
    }

    fn table(&self) -> &str {
        self.model.metadata.table()
    }

    fn key_name(&self) -> String {
        self.model.metadata.key_name().to_string()
    }

    fn trace(&self, operation: RepositoryOperation) {
        debug!(
            operation = %operation,
            table = self.table(),
            predicates = self.state.predicates.len(),
            relations = self.state.relations.len(),
            "Executing query"
        );
    }

    // ==================== Reads ====================

    /// Fetch every matching record
    ///
    /// Columns default to the key and fillable columns; an explicit
    /// `push_select` wins over both.
    pub async fn all(mut self, columns: Option<&[&str]>) -> RepositoryResult<Vec<Record>> {
        let columns = owned_or(columns, || self.model.metadata.default_columns());
        self.state.select_default(&columns);
        self.trace(RepositoryOperation::FindAll);
        self.model.accessor.get(&self.state).await
    }

    pub async fn first(mut self, columns: Option<&[&str]>) -> RepositoryResult<Option<Record>> {
        let columns = owned_or(columns, || self.model.metadata.default_columns());
        self.state.select_default(&columns);
        self.trace(RepositoryOperation::First);
        self.model.accessor.first(&self.state).await
    }

    /// First record in descending key order
    pub async fn last(self, columns: Option<&[&str]>) -> RepositoryResult<Option<Record>> {
        let key = self.key_name();
        self.push_order_by(key, OrderDirection::Descending)
            .first(columns)
            .await
    }

    /// Fetch one record by primary key
    pub async fn find(
        mut self,
        id: impl Into<Value>,
        columns: Option<&[&str]>,
    ) -> RepositoryResult<Option<Record>> {
        let id = id.into();
        let columns = owned_or(columns, || self.model.metadata.default_columns());
        self.state.select_default(&columns);
        self.trace(RepositoryOperation::Find);
        let key = self.key_name();
        self.model.accessor.find(&key, &id, &self.state).await
    }

    /// First record whose `attribute` equals `value`
    pub async fn find_by(
        self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
        columns: Option<&[&str]>,
    ) -> RepositoryResult<Option<Record>> {
        self.push_where(attribute, value).first(columns).await
    }

    /// Fetch one record by primary key with the show-able columns
    pub async fn find_for_show(
        mut self,
        id: impl Into<Value>,
        columns: Option<&[&str]>,
    ) -> RepositoryResult<Option<Record>> {
        let id = id.into();
        let columns = owned_or(columns, || self.model.metadata.show_able());
        self.state.select_default(&columns);
        self.trace(RepositoryOperation::Find);
        let key = self.key_name();
        self.model.accessor.find(&key, &id, &self.state).await
    }

    /// Every record whose `attribute` equals `value`
    pub async fn find_all_by(
        self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
        columns: Option<&[&str]>,
    ) -> RepositoryResult<Vec<Record>> {
        self.push_where(attribute, value).all(columns).await
    }

    /// Key/value pairs for a selection list
    ///
    /// Pairs keep the order of the first occurrence of each key; a later record
    /// with the same key replaces the value.
    pub async fn find_list(
        mut self,
        listable: Option<ListableSpec>,
    ) -> RepositoryResult<Vec<(Value, Value)>> {
        let listable = listable.unwrap_or_else(|| self.model.metadata.listable());
        let columns = qualify_columns(&listable.columns, self.table());
        self.state.select_default(&columns);
        self.trace(RepositoryOperation::FindAll);
        let records = self.model.accessor.get(&self.state).await?;
        Ok(pluck(&records, &listable.key, &listable.value))
    }

    pub async fn find_list_by(
        self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
        listable: Option<ListableSpec>,
    ) -> RepositoryResult<Vec<(Value, Value)>> {
        self.push_where(attribute, value).find_list(listable).await
    }

    // ==================== Counts ====================

    /// Count records matching the accumulated predicates
    pub async fn find_count(self) -> RepositoryResult<u64> {
        self.trace(RepositoryOperation::Count);
        self.model.accessor.count(&self.state).await
    }

    /// Count records whose `attribute` equals `value`
    ///
    /// A list value counts membership instead. A blank attribute or value adds
    /// no filter at all.
    pub async fn find_count_by(
        self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> RepositoryResult<u64> {
        self.find_count_cmp(attribute, Operator::Equal, value).await
    }

    /// Count records matching `attribute <operator> value`
    ///
    /// List values always become an `IN` check.
    pub async fn find_count_cmp(
        self,
        attribute: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> RepositoryResult<u64> {
        let attribute = attribute.into();
        let value = value.into();
        if attribute.trim().is_empty() || value.is_blank() {
            return self.find_count().await;
        }

        let query = if value.is_list() {
            self.push_where_in(attribute.clone(), value)?
        } else {
            self.push_where_cmp(attribute.clone(), operator, value)
        };
        query.push_select([attribute]).find_count().await
    }

    pub async fn exists(self, id: impl Into<Value>) -> RepositoryResult<bool> {
        let key = self.key_name();
        self.exists_where(key, id).await
    }

    /// True when any record has `attribute = value`
    ///
    /// Unlike the count shortcuts, a blank value is still compared.
    pub async fn exists_where(
        self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> RepositoryResult<bool> {
        Ok(self.push_where(attribute, value).find_count().await? > 0)
    }

    // ==================== Pages ====================

    /// Fetch one page of records with the total count
    ///
    /// Without a `pagination` the first page of `default_per_page` records is
    /// fetched. Columns default to the group's indexable columns with the key
    /// first; `group` defaults to the configured default group. The page size
    /// is clamped to `max_per_page`. Returns the page and the columns it used.
    pub async fn paginate(
        mut self,
        pagination: Option<Pagination>,
        columns: Option<&[&str]>,
        group: Option<&str>,
        sort: Option<&SortOptions>,
    ) -> RepositoryResult<(Page<Record>, Vec<String>)> {
        let pagination = self.page_window(pagination);
        let config = &self.model.query_config;
        let group = group.unwrap_or(&config.default_group).to_string();

        let columns = owned_or(columns, || self.model.metadata.indexable(true, false, &group));
        if let Some(sort) = sort {
            self.apply_sort(sort, &group);
        }
        self.state.select_default(&columns);
        let used_columns = self.state.selected_columns.clone().unwrap_or(columns);

        self.trace(RepositoryOperation::Paginate);
        let page = self.model.accessor.paginate(&self.state, &pagination).await?;
        Ok((page, used_columns))
    }

    /// Fetch one page of records without counting the total
    pub async fn simple_paginate(
        mut self,
        pagination: Option<Pagination>,
        columns: Option<&[&str]>,
    ) -> RepositoryResult<Page<Record>> {
        let pagination = self.page_window(pagination);
        let columns = owned_or(columns, || self.model.metadata.default_columns());
        self.state.select_default(&columns);
        self.trace(RepositoryOperation::Paginate);
        self.model
            .accessor
            .simple_paginate(&self.state, &pagination)
            .await
    }

    fn page_window(&self, pagination: Option<Pagination>) -> Pagination {
        let config = &self.model.query_config;
        pagination
            .unwrap_or_else(|| Pagination::first_page(config.default_per_page))
            .clamped(config.max_per_page)
    }

    fn apply_sort(&mut self, sort: &SortOptions, group: &str) {
        let Some(column) = sort.column.as_deref() else {
            return;
        };
        let column = column.to_lowercase();
        if self.model.metadata.is_sortable(&column, group) {
            let direction = OrderDirection::from_lenient(&sort.order);
            self.state.sort.push((column, direction));
        } else {
            debug!(column = %column, group, "Ignoring sort on unsortable column");
        }
    }

    // ==================== Writes ====================

    /// Add `amount` to `column` on every matching record
    pub async fn increment(self, column: &str, amount: i64) -> RepositoryResult<u64> {
        self.trace(RepositoryOperation::Adjust);
        self.model
            .accessor
            .increment(&self.state, column, amount)
            .await
    }

    /// Subtract `amount` from `column` on every matching record
    pub async fn decrement(self, column: &str, amount: i64) -> RepositoryResult<u64> {
        self.trace(RepositoryOperation::Adjust);
        self.model
            .accessor
            .decrement(&self.state, column, amount)
            .await
    }

    /// Validate and insert a record
    pub async fn create(
        mut self,
        data: Record,
        rule: impl Into<Rule>,
    ) -> RepositoryResult<SaveOutcome<Record>> {
        if !self.model.gate.validate_for(&rule.into(), &data) {
            return Ok(SaveOutcome::Invalid);
        }

        info!(table = self.table(), fields = data.len(), "Creating record");
        let record = self.model.accessor.insert(data).await?;
        Ok(SaveOutcome::Saved(record))
    }

    /// Validate and insert a record together with its associated relations
    pub async fn create_with(
        mut self,
        data: Record,
        relations: impl Into<Associations>,
        rule: impl Into<Rule>,
    ) -> RepositoryResult<SaveOutcome<Record>> {
        if !self.model.gate.validate_for(&rule.into(), &data) {
            return Ok(SaveOutcome::Invalid);
        }

        let associations = relations.into();
        info!(
            table = self.table(),
            associated = ?associations.associated,
            "Creating record with associations"
        );
        let record = self
            .model
            .accessor
            .save_associated(data, &associations, None)
            .await?;
        Ok(SaveOutcome::Saved(record))
    }

    /// Validate and update the record with key `id`
    ///
    /// The key is written into `data` before validation. The target is looked
    /// up with the accumulated predicates; when it is absent nothing is written.
    pub async fn update(
        self,
        data: Record,
        id: impl Into<Value>,
        rule: impl Into<Rule>,
    ) -> RepositoryResult<SaveOutcome<Record>> {
        self.update_with(data, id, Associations::default(), rule)
            .await
    }

    /// [`update`](Self::update) that also saves associated relations
    pub async fn update_with(
        mut self,
        mut data: Record,
        id: impl Into<Value>,
        relations: impl Into<Associations>,
        rule: impl Into<Rule>,
    ) -> RepositoryResult<SaveOutcome<Record>> {
        let id = id.into();
        let key = self.key_name();
        data.insert(key.clone(), id.clone());

        if !self.model.gate.validate_for(&rule.into(), &data) {
            return Ok(SaveOutcome::Invalid);
        }

        self.state.select([key.clone()]);
        self.trace(RepositoryOperation::Find);
        let Some(existing) = self.model.accessor.find(&key, &id, &self.state).await? else {
            warn!(table = self.table(), id = %id, "Update target not found");
            return Ok(SaveOutcome::NotFound);
        };

        let associations = relations.into();
        info!(table = self.table(), id = %id, "Updating record");
        let record = self
            .model
            .accessor
            .save_associated(data, &associations, Some(existing))
            .await?;
        Ok(SaveOutcome::Saved(record))
    }

    /// Validate and mass-update every record whose `attribute` equals `value`
    pub async fn update_by(
        self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
        data: Record,
        rule: impl Into<Rule>,
    ) -> RepositoryResult<SaveOutcome<u64>> {
        let mut query = self.push_where(attribute, value);
        if !query.model.gate.validate_for(&rule.into(), &data) {
            return Ok(SaveOutcome::Invalid);
        }

        info!(table = query.table(), fields = data.len(), "Updating records");
        query.trace(RepositoryOperation::Update);
        let affected = query.model.accessor.update_where(&query.state, data).await?;
        Ok(SaveOutcome::Saved(affected))
    }

    // ==================== Deletes ====================

    /// Delete the record with key `id`
    pub async fn delete(self, id: impl Into<Value>, method: DeleteMethod) -> RepositoryResult<u64> {
        let key = self.key_name();
        self.delete_by(key, id, method).await
    }

    /// Delete every record whose `column` equals `value`
    pub async fn delete_by(
        self,
        column: impl Into<String>,
        value: impl Into<Value>,
        method: DeleteMethod,
    ) -> RepositoryResult<u64> {
        let query = self.push_where(column, value);
        info!(table = query.table(), method = %method, "Deleting records");
        query.trace(RepositoryOperation::Delete);
        query.model.accessor.delete(&query.state, method).await
    }

    /// Delete every record whose key is in `ids`
    ///
    /// An empty id list deletes nothing and never reaches the accessor.
    pub async fn delete_all<I>(self, ids: I, method: DeleteMethod) -> RepositoryResult<u64>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let ids: Vec<Value> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            debug!(table = self.table(), "No ids to delete");
            return Ok(0);
        }

        let key = self.key_name();
        let query = self.push_where_in(key, Value::List(ids))?;
        info!(table = query.table(), method = %method, "Deleting records by key");
        query.trace(RepositoryOperation::Delete);
        query.model.accessor.delete(&query.state, method).await
    }

    pub async fn destroy(self, id: impl Into<Value>, method: DeleteMethod) -> RepositoryResult<u64> {
        self.delete(id, method).await
    }

    pub async fn destroy_all<I>(self, ids: I, method: DeleteMethod) -> RepositoryResult<u64>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.delete_all(ids, method).await
    }
}

fn owned_or(columns: Option<&[&str]>, default: impl FnOnce() -> Vec<String>) -> Vec<String> {
    match columns {
        Some(columns) => columns.iter().map(|c| (*c).to_string()).collect(),
        None => default(),
    }
}

/// Records come back with bare column names even when selected qualified
fn bare_column(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(_, column)| column)
}

fn pluck(records: &[Record], key: &str, value: &str) -> Vec<(Value, Value)> {
    let (key, value) = (bare_column(key), bare_column(value));
    let mut pairs: Vec<(Value, Value)> = Vec::with_capacity(records.len());
    for record in records {
        let k = record.get(key).cloned().unwrap_or_default();
        let v = record.get(value).cloned().unwrap_or_default();
        match pairs.iter_mut().find(|(existing, _)| *existing == k) {
            Some(slot) => slot.1 = v,
            None => pairs.push((k, v)),
        }
    }
    pairs
}
