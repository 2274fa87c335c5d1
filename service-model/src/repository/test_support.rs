//! Test doubles for the accessor and validator seams

use std::sync::Mutex;

use super::accessor::{DataAccessor, DeleteMethod, Page, Pagination};
use super::error::{RepositoryError, RepositoryResult};
use super::relation::Associations;
use super::state::QueryState;
use super::validation::{ValidationErrors, ValidationOptions, ValidationResult, Validator};
use super::value::{Record, Value};

const UNAVAILABLE: &str = "accessor unavailable";

/// One accessor invocation with everything it received
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Get(QueryState),
    First(QueryState),
    Find {
        key: String,
        id: Value,
        query: QueryState,
    },
    Paginate(QueryState, Pagination),
    Count(QueryState),
    Insert(Record),
    SaveAssociated {
        data: Record,
        associations: Associations,
        existing: Option<Record>,
    },
    UpdateWhere(QueryState, Record),
    Delete(QueryState, DeleteMethod),
    Increment(QueryState, String, i64),
    Begin,
    Commit,
    Rollback,
}

impl Call {
    fn state(&self) -> Option<&QueryState> {
        match self {
            Self::Get(state)
            | Self::First(state)
            | Self::Paginate(state, _)
            | Self::Count(state)
            | Self::UpdateWhere(state, _)
            | Self::Delete(state, _)
            | Self::Increment(state, _, _) => Some(state),
            Self::Find { query, .. } => Some(query),
            _ => None,
        }
    }
}

/// Accessor that records every call and serves canned records
#[derive(Debug, Default)]
pub(crate) struct RecordingAccessor {
    calls: Mutex<Vec<Call>>,
    records: Vec<Record>,
    count: u64,
    failing: bool,
}

impl RecordingAccessor {
    pub(crate) fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    /// Result of count and of every write that reports affected rows
    pub(crate) fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Record calls but fail every one of them
    pub(crate) fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Query state of the most recent call that carried one
    pub(crate) fn last_state(&self) -> Option<QueryState> {
        self.calls().iter().rev().find_map(Call::state).cloned()
    }

    fn record(&self, call: Call) -> RepositoryResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.failing {
            Err(RepositoryError::connection_failed(UNAVAILABLE))
        } else {
            Ok(())
        }
    }

    fn record_transaction(&self, call: Call) -> RepositoryResult<()> {
        self.record(call)
            .map_err(|_| RepositoryError::transaction_fault(UNAVAILABLE))
    }
}

impl DataAccessor for RecordingAccessor {
    async fn get(&self, query: &QueryState) -> RepositoryResult<Vec<Record>> {
        self.record(Call::Get(query.clone()))?;
        Ok(self.records.clone())
    }

    async fn first(&self, query: &QueryState) -> RepositoryResult<Option<Record>> {
        self.record(Call::First(query.clone()))?;
        Ok(self.records.first().cloned())
    }

    async fn find(
        &self,
        key_name: &str,
        id: &Value,
        query: &QueryState,
    ) -> RepositoryResult<Option<Record>> {
        self.record(Call::Find {
            key: key_name.to_string(),
            id: id.clone(),
            query: query.clone(),
        })?;
        Ok(self
            .records
            .iter()
            .find(|record| record.get(key_name) == Some(id))
            .cloned())
    }

    async fn paginate(
        &self,
        query: &QueryState,
        pagination: &Pagination,
    ) -> RepositoryResult<Page<Record>> {
        self.record(Call::Paginate(query.clone(), pagination.clone()))?;
        Ok(Page::new(
            self.records.clone(),
            pagination.clone(),
            Some(self.count),
        ))
    }

    async fn count(&self, query: &QueryState) -> RepositoryResult<u64> {
        self.record(Call::Count(query.clone()))?;
        Ok(self.count)
    }

    async fn insert(&self, data: Record) -> RepositoryResult<Record> {
        self.record(Call::Insert(data.clone()))?;
        Ok(data)
    }

    async fn save_associated(
        &self,
        data: Record,
        associations: &Associations,
        existing: Option<Record>,
    ) -> RepositoryResult<Record> {
        self.record(Call::SaveAssociated {
            data: data.clone(),
            associations: associations.clone(),
            existing,
        })?;
        Ok(data)
    }

    async fn update_where(&self, query: &QueryState, data: Record) -> RepositoryResult<u64> {
        self.record(Call::UpdateWhere(query.clone(), data))?;
        Ok(self.count)
    }

    async fn delete(&self, query: &QueryState, method: DeleteMethod) -> RepositoryResult<u64> {
        self.record(Call::Delete(query.clone(), method))?;
        Ok(self.count)
    }

    async fn increment(&self, query: &QueryState, column: &str, amount: i64) -> RepositoryResult<u64> {
        self.record(Call::Increment(query.clone(), column.to_string(), amount))?;
        Ok(self.count)
    }

    async fn begin_transaction(&self) -> RepositoryResult<()> {
        self.record_transaction(Call::Begin)
    }

    async fn commit_transaction(&self) -> RepositoryResult<()> {
        self.record_transaction(Call::Commit)
    }

    async fn rollback_transaction(&self) -> RepositoryResult<()> {
        self.record_transaction(Call::Rollback)
    }
}

/// Validator that fails every rule with the given field errors
///
/// An empty error list passes everything.
pub(crate) fn scripted_validator(errors: &[(&str, &str)]) -> impl Validator + 'static {
    let mut scripted = ValidationErrors::new();
    for (field, message) in errors {
        scripted.add(*field, *message);
    }
    move |_: &Record, _: &ValidationOptions| {
        if scripted.is_empty() {
            ValidationResult::passed()
        } else {
            ValidationResult::failed(scripted.clone())
        }
    }
}

pub(crate) fn record(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}
