//! Data accessor contract and pagination types
//!
//! The [`DataAccessor`] trait is the seam between the service model and the
//! data store. It receives fully built [`QueryState`] values and executes
//! them; SQL generation, dialect and locking live behind it. Methods use RPITIT
//! (Return Position Impl Trait In Traits) so implementors can write plain
//! `async fn`.
//!
//! # Example
//!
//! ```rust,ignore
//! use service_model::repository::{
//!     Associations, DataAccessor, DeleteMethod, Page, Pagination, QueryState, Record,
//!     RepositoryResult,
//! };
//!
//! struct PgUsers {
//!     pool: PgPool,
//! }
//!
//! impl DataAccessor for PgUsers {
//!     async fn get(&self, query: &QueryState) -> RepositoryResult<Vec<Record>> {
//!         let sql = render_select("users", query);
//!         fetch_records(&self.pool, &sql).await
//!     }
//!     // ... other methods
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{
    RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
};
use super::predicate::PredicateBuilder;
use super::relation::Associations;
use super::state::QueryState;
use super::value::{Record, Value};

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use service_model::repository::OrderDirection;
///
/// assert_eq!(format!("{}", OrderDirection::Ascending), "asc");
/// assert_eq!(OrderDirection::from_lenient("DESC"), OrderDirection::Descending);
/// assert_eq!(OrderDirection::from_lenient("sideways"), OrderDirection::Ascending);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    #[serde(rename = "asc")]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    #[serde(rename = "desc")]
    Descending,
}

impl OrderDirection {
    /// `desc` in any case is descending; everything else is ascending
    pub fn from_lenient(order: &str) -> Self {
        if order.trim().eq_ignore_ascii_case("desc") {
            Self::Descending
        } else {
            Self::Ascending
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

/// Pagination parameters for limiting query results
///
/// # Example
///
/// ```rust
/// use service_model::repository::Pagination;
///
/// let page3 = Pagination::page(3, 20);
/// assert_eq!(page3.offset, 40);
/// assert_eq!(page3.page_number(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of results to skip
    pub offset: u64,
    /// Maximum number of results to return
    pub limit: u64,
}

impl Pagination {
    #[must_use]
    pub const fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    #[must_use]
    pub const fn first_page(limit: u64) -> Self {
        Self { offset: 0, limit }
    }

    /// Pagination for a specific page number (1-indexed)
    #[must_use]
    pub const fn page(page_number: u64, page_size: u64) -> Self {
        let offset = page_number.saturating_sub(1) * page_size;
        Self {
            offset,
            limit: page_size,
        }
    }

    /// The 1-indexed page this pagination points at
    pub const fn page_number(&self) -> u64 {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }

    /// Cap the page size at `max`; the offset is kept as given
    #[must_use]
    pub const fn clamped(self, max: u64) -> Self {
        if max == 0 || self.limit <= max {
            self
        } else {
            Self {
                offset: self.offset,
                limit: max,
            }
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    /// Total matching rows; `None` for simple pagination
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination, total: Option<u64>) -> Self {
        Self {
            items,
            pagination,
            total,
        }
    }

    /// Last page number, when the total is known
    pub fn last_page(&self) -> Option<u64> {
        let total = self.total?;
        if self.pagination.limit == 0 {
            return Some(1);
        }
        Some(total.div_ceil(self.pagination.limit).max(1))
    }

    /// Whether another page follows this one
    ///
    /// Without a total, a full page is assumed to have a successor.
    pub fn has_more(&self) -> bool {
        match self.last_page() {
            Some(last) => self.pagination.page_number() < last,
            None => self.items.len() as u64 >= self.pagination.limit && self.pagination.limit > 0,
        }
    }
}

/// Deletion strategy passed through to the accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMethod {
    /// The record type's regular delete (soft when it supports soft deletes)
    #[default]
    Delete,
    /// Permanent removal
    ForceDelete,
}

impl fmt::Display for DeleteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delete => write!(f, "delete"),
            Self::ForceDelete => write!(f, "force_delete"),
        }
    }
}

impl FromStr for DeleteMethod {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete" => Ok(Self::Delete),
            "force_delete" | "forceDelete" => Ok(Self::ForceDelete),
            other => Err(RepositoryError::new(
                RepositoryOperation::Delete,
                RepositoryErrorKind::Other,
                format!("unknown delete method '{}'", other),
            )),
        }
    }
}

/// Executes query states against a data store
///
/// One accessor serves one record type; table and key naming come from the
/// accessor's own setup. Every method receives the complete query state for
/// the call and must not retain it.
pub trait DataAccessor: Send + Sync {
    /// Fetch every record matching the query
    fn get(&self, query: &QueryState) -> impl Future<Output = RepositoryResult<Vec<Record>>> + Send;

    /// Fetch the first record matching the query
    fn first(
        &self,
        query: &QueryState,
    ) -> impl Future<Output = RepositoryResult<Option<Record>>> + Send;

    /// Fetch a record by key, honouring the rest of the query
    fn find(
        &self,
        key_name: &str,
        id: &Value,
        query: &QueryState,
    ) -> impl Future<Output = RepositoryResult<Option<Record>>> + Send {
        let scoped = query.clone().push_where(key_name, id.clone());
        async move { self.first(&scoped).await }
    }

    /// Fetch one page of matching records together with the total
    fn paginate(
        &self,
        query: &QueryState,
        pagination: &Pagination,
    ) -> impl Future<Output = RepositoryResult<Page<Record>>> + Send;

    /// Fetch one page without counting the total
    fn simple_paginate(
        &self,
        query: &QueryState,
        pagination: &Pagination,
    ) -> impl Future<Output = RepositoryResult<Page<Record>>> + Send {
        let scoped = query
            .clone()
            .push_offset(pagination.offset)
            .push_limit(pagination.limit);
        let pagination = pagination.clone();
        async move {
            let items = self.get(&scoped).await?;
            Ok(Page::new(items, pagination, None))
        }
    }

    fn count(&self, query: &QueryState) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Insert a record and return it as stored
    fn insert(&self, data: Record) -> impl Future<Output = RepositoryResult<Record>> + Send;

    /// Save a record together with its associated relations
    ///
    /// `existing` is the record being updated, or `None` for an insert.
    fn save_associated(
        &self,
        data: Record,
        associations: &Associations,
        existing: Option<Record>,
    ) -> impl Future<Output = RepositoryResult<Record>> + Send;

    /// Mass-update every matching record, returning the affected row count
    fn update_where(
        &self,
        query: &QueryState,
        data: Record,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Delete every matching record, returning the affected row count
    fn delete(
        &self,
        query: &QueryState,
        method: DeleteMethod,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Add `amount` to `column` on every matching record
    fn increment(
        &self,
        query: &QueryState,
        column: &str,
        amount: i64,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Subtract `amount` from `column` on every matching record
    fn decrement(
        &self,
        query: &QueryState,
        column: &str,
        amount: i64,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send {
        self.increment(query, column, amount.saturating_neg())
    }

    fn begin_transaction(&self) -> impl Future<Output = RepositoryResult<()>> + Send;

    fn commit_transaction(&self) -> impl Future<Output = RepositoryResult<()>> + Send;

    fn rollback_transaction(&self) -> impl Future<Output = RepositoryResult<()>> + Send;
}
