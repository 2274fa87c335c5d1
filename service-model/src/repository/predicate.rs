//! Predicate building
//!
//! Heterogeneous "push" calls are normalized into discrete [`Predicate`]
//! entries appended to a [`QueryState`] in call order. The [`PredicateBuilder`]
//! trait supplies the fluent surface to anything that owns a query state: the
//! state itself (for nested groups and custom relation filters) and the
//! per-query builder handed out by the service model.
//!
//! # Example
//!
//! ```rust
//! use service_model::repository::{Operator, PredicateBuilder, QueryState};
//!
//! let state = QueryState::new()
//!     .push_where("status", "active")
//!     .push_where_cmp("age", Operator::GreaterThan, 18)
//!     .push_where_in("role", vec!["admin", "editor"])
//!     .unwrap();
//!
//! assert_eq!(state.predicates.len(), 3);
//! assert_eq!(state.predicates[1].operator(), Some(Operator::GreaterThan));
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::accessor::OrderDirection;
use super::error::{RepositoryError, RepositoryResult};
use super::relation::RelationFilter;
use super::state::QueryState;
use super::value::Value;

/// Comparison operators for simple predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Operator {
    /// Equal to (=)
    #[default]
    #[serde(rename = "=")]
    Equal,
    /// Not equal to (!=)
    #[serde(rename = "!=")]
    NotEqual,
    /// Greater than (>)
    #[serde(rename = ">")]
    GreaterThan,
    /// Greater than or equal to (>=)
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    /// Less than (<)
    #[serde(rename = "<")]
    LessThan,
    /// Less than or equal to (<=)
    #[serde(rename = "<=")]
    LessThanOrEqual,
    /// Pattern matching (LIKE)
    #[serde(rename = "LIKE")]
    Like,
    /// Negated pattern matching (NOT LIKE)
    #[serde(rename = "NOT LIKE")]
    NotLike,
    /// Case-insensitive pattern matching (ILIKE)
    #[serde(rename = "ILIKE")]
    ILike,
    /// Negated case-insensitive pattern matching (NOT ILIKE)
    #[serde(rename = "NOT ILIKE")]
    NotILike,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Like => write!(f, "LIKE"),
            Self::NotLike => write!(f, "NOT LIKE"),
            Self::ILike => write!(f, "ILIKE"),
            Self::NotILike => write!(f, "NOT ILIKE"),
        }
    }
}

impl FromStr for Operator {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Self::Equal),
            "!=" | "<>" => Ok(Self::NotEqual),
            ">" => Ok(Self::GreaterThan),
            ">=" => Ok(Self::GreaterThanOrEqual),
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessThanOrEqual),
            "like" => Ok(Self::Like),
            "not like" => Ok(Self::NotLike),
            "ilike" => Ok(Self::ILike),
            "not ilike" => Ok(Self::NotILike),
            other => Err(RepositoryError::invalid_predicate_shape(format!(
                "unsupported comparison operator '{}'",
                other
            ))),
        }
    }
}

/// How a predicate joins the predicates before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// Portion of a date/time column compared by a date-part predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePart {
    /// The calendar date
    #[default]
    Date,
    Month,
    Day,
    Time,
}

/// Flat tag describing what a predicate checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    Simple,
    NullCheck,
    NotNullCheck,
    Between,
    NotBetween,
    In,
    NotIn,
    Date,
    Month,
    Day,
    Time,
    RawGroup,
    Exists,
    NotExists,
}

/// One `[column, operator, value]` condition of a raw multi-condition group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// Equality condition
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, Operator::Equal, value)
    }

    /// Resolve positional condition arguments
    ///
    /// Two arguments are `(column, value)` with equality; three are
    /// `(column, operator, value)`. A null third argument carries no meaning and
    /// collapses to the two-argument form.
    ///
    /// ```rust
    /// use service_model::repository::{Condition, Operator, Value};
    ///
    /// let c = Condition::from_args(&["age".into(), ">".into(), 18.into()]).unwrap();
    /// assert_eq!(c.operator, Operator::GreaterThan);
    ///
    /// let c = Condition::from_args(&["status".into(), "active".into()]).unwrap();
    /// assert_eq!(c.operator, Operator::Equal);
    /// assert_eq!(c.value, Value::from("active"));
    /// ```
    pub fn from_args(args: &[Value]) -> RepositoryResult<Self> {
        let column = match args.first() {
            Some(Value::String(column)) => column.clone(),
            Some(other) => {
                return Err(RepositoryError::invalid_predicate_shape(format!(
                    "condition column must be a string, got {}",
                    other.type_name()
                )))
            }
            None => {
                return Err(RepositoryError::invalid_predicate_shape(
                    "condition requires a column",
                ))
            }
        };

        match args {
            [_, value] | [_, value, Value::Null] => Ok(Self::eq(column, value.clone())),
            [_, Value::String(op), value] => Ok(Self::new(column, op.parse()?, value.clone())),
            [_, op, _] => Err(RepositoryError::invalid_predicate_shape(format!(
                "condition operator must be a string, got {}",
                op.type_name()
            ))),
            _ => Err(RepositoryError::invalid_predicate_shape(format!(
                "condition expects 2 or 3 arguments, got {}",
                args.len()
            ))),
        }
    }

    /// Resolve a list of conditions from a value
    ///
    /// Accepts a list of positional condition lists, or a map of
    /// `column -> value` equality pairs.
    pub fn list_from_value(value: &Value) -> RepositoryResult<Vec<Self>> {
        match value {
            Value::List(items) => items
                .iter()
                .flat_map(|item| match item {
                    Value::List(args) => vec![Self::from_args(args)],
                    Value::Map(entries) => entries
                        .iter()
                        .map(|(column, value)| Ok(Self::eq(column.clone(), value.clone())))
                        .collect(),
                    other => vec![Err(RepositoryError::invalid_predicate_shape(format!(
                        "condition must be a list or map, got {}",
                        other.type_name()
                    )))],
                })
                .collect(),
            Value::Map(entries) => Ok(entries
                .iter()
                .map(|(column, value)| Self::eq(column.clone(), value.clone()))
                .collect()),
            other => Err(RepositoryError::invalid_predicate_shape(format!(
                "conditions must be a list or map, got {}",
                other.type_name()
            ))),
        }
    }
}

/// What a single predicate checks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Clause {
    /// `column <operator> value`
    Compare {
        column: String,
        operator: Operator,
        value: Value,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negate: bool },
    /// `column [NOT] BETWEEN low AND high`
    Between {
        column: String,
        low: Value,
        high: Value,
        negate: bool,
    },
    /// `column [NOT] IN (values...)`
    In {
        column: String,
        values: Vec<Value>,
        negate: bool,
    },
    /// Compare one part of a date/time column
    DatePart {
        column: String,
        part: DatePart,
        value: Value,
    },
    /// Parenthesized group of predicates, forwarded as-is
    Group { predicates: Vec<Predicate> },
    /// Relation existence: `count(relation filtered) <operator> count`
    Exists {
        relation: String,
        filter: RelationFilter,
        operator: Operator,
        count: i64,
        negate: bool,
    },
}

/// A single filter condition and how it joins the ones before it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub combinator: Combinator,
    #[serde(flatten)]
    pub clause: Clause,
}

impl Predicate {
    pub fn new(clause: Clause, combinator: Combinator) -> Self {
        Self { combinator, clause }
    }

    /// `column <operator> value`
    pub fn compare(
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
        combinator: Combinator,
    ) -> Self {
        Self::new(
            Clause::Compare {
                column: column.into(),
                operator,
                value: value.into(),
            },
            combinator,
        )
    }

    /// `column IS NULL` or `column IS NOT NULL`
    pub fn null_check(column: impl Into<String>, negate: bool) -> Self {
        Self::new(
            Clause::Null {
                column: column.into(),
                negate,
            },
            Combinator::And,
        )
    }

    /// Between check; `values` must be an ordered `[low, high]` pair
    pub fn between(
        column: impl Into<String>,
        values: impl Into<Value>,
        negate: bool,
    ) -> RepositoryResult<Self> {
        let column = column.into();
        match values.into() {
            Value::List(pair) if pair.len() == 2 => {
                let mut pair = pair.into_iter();
                let (low, high) = (pair.next(), pair.next());
                Ok(Self::new(
                    Clause::Between {
                        column,
                        low: low.unwrap_or_default(),
                        high: high.unwrap_or_default(),
                        negate,
                    },
                    Combinator::And,
                ))
            }
            Value::List(pair) => Err(RepositoryError::invalid_predicate_shape(format!(
                "between on '{}' expects exactly 2 values, got {}",
                column,
                pair.len()
            ))),
            other => Err(RepositoryError::invalid_predicate_shape(format!(
                "between on '{}' expects a [low, high] list, got {}",
                column,
                other.type_name()
            ))),
        }
    }

    /// Membership check; `values` must be a non-empty list
    pub fn in_list(
        column: impl Into<String>,
        values: impl Into<Value>,
        negate: bool,
    ) -> RepositoryResult<Self> {
        let column = column.into();
        match values.into() {
            Value::List(values) if !values.is_empty() => Ok(Self::new(
                Clause::In {
                    column,
                    values,
                    negate,
                },
                Combinator::And,
            )),
            Value::List(_) => Err(RepositoryError::invalid_predicate_shape(format!(
                "in on '{}' expects a non-empty list",
                column
            ))),
            other => Err(RepositoryError::invalid_predicate_shape(format!(
                "in on '{}' expects a list, got {}",
                column,
                other.type_name()
            ))),
        }
    }

    /// Compare one part of a date/time column
    pub fn date_part(column: impl Into<String>, part: DatePart, value: impl Into<Value>) -> Self {
        Self::new(
            Clause::DatePart {
                column: column.into(),
                part,
                value: value.into(),
            },
            Combinator::And,
        )
    }

    /// Raw multi-condition group
    pub fn group(conditions: impl IntoIterator<Item = Condition>, combinator: Combinator) -> Self {
        let predicates = conditions
            .into_iter()
            .map(|c| Self::compare(c.column, c.operator, c.value, Combinator::And))
            .collect();
        Self::new(Clause::Group { predicates }, combinator)
    }

    /// OR-combined substring match; naive LIKE semantics, not full-text
    pub fn search(column: impl Into<String>, term: impl Into<Value>) -> Self {
        let pattern = format!("%{}%", term.into().to_text());
        Self::compare(column, Operator::Like, pattern, Combinator::Or)
    }

    pub fn kind(&self) -> PredicateKind {
        match &self.clause {
            Clause::Compare { .. } => PredicateKind::Simple,
            Clause::Null { negate: false, .. } => PredicateKind::NullCheck,
            Clause::Null { negate: true, .. } => PredicateKind::NotNullCheck,
            Clause::Between { negate: false, .. } => PredicateKind::Between,
            Clause::Between { negate: true, .. } => PredicateKind::NotBetween,
            Clause::In { negate: false, .. } => PredicateKind::In,
            Clause::In { negate: true, .. } => PredicateKind::NotIn,
            Clause::DatePart { part, .. } => match part {
                DatePart::Date => PredicateKind::Date,
                DatePart::Month => PredicateKind::Month,
                DatePart::Day => PredicateKind::Day,
                DatePart::Time => PredicateKind::Time,
            },
            Clause::Group { .. } => PredicateKind::RawGroup,
            Clause::Exists { negate: false, .. } => PredicateKind::Exists,
            Clause::Exists { negate: true, .. } => PredicateKind::NotExists,
        }
    }

    /// The column this predicate targets, if it targets exactly one
    pub fn column(&self) -> Option<&str> {
        match &self.clause {
            Clause::Compare { column, .. }
            | Clause::Null { column, .. }
            | Clause::Between { column, .. }
            | Clause::In { column, .. }
            | Clause::DatePart { column, .. } => Some(column),
            Clause::Group { .. } | Clause::Exists { .. } => None,
        }
    }

    pub fn operator(&self) -> Option<Operator> {
        match &self.clause {
            Clause::Compare { operator, .. } | Clause::Exists { operator, .. } => Some(*operator),
            _ => None,
        }
    }

    /// The compared value of simple and date-part predicates
    pub fn value(&self) -> Option<&Value> {
        match &self.clause {
            Clause::Compare { value, .. } | Clause::DatePart { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Fluent predicate, ordering and projection directives over a [`QueryState`]
///
/// Every method appends to the live state and hands the owner back for
/// chaining; nothing is executed. Methods whose arguments have a required shape
/// return a [`RepositoryResult`] and fail with `InvalidPredicateShape`.
pub trait PredicateBuilder: Sized {
    /// The state directives are appended to
    fn query_state(&mut self) -> &mut QueryState;

    /// `column = value`
    #[must_use]
    fn push_where(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_state().push_predicate(Predicate::compare(
            column,
            Operator::Equal,
            value,
            Combinator::And,
        ));
        self
    }

    /// `column <operator> value`
    #[must_use]
    fn push_where_cmp(
        mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.query_state()
            .push_predicate(Predicate::compare(column, operator, value, Combinator::And));
        self
    }

    /// `OR column = value`
    #[must_use]
    fn push_or_where(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_state().push_predicate(Predicate::compare(
            column,
            Operator::Equal,
            value,
            Combinator::Or,
        ));
        self
    }

    /// `OR column <operator> value`
    #[must_use]
    fn push_or_where_cmp(
        mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.query_state()
            .push_predicate(Predicate::compare(column, operator, value, Combinator::Or));
        self
    }

    /// Raw multi-condition group, forwarded without re-resolution
    #[must_use]
    fn push_where_group(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.query_state()
            .push_predicate(Predicate::group(conditions, Combinator::And));
        self
    }

    /// OR-joined raw multi-condition group
    #[must_use]
    fn push_or_where_group(mut self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        self.query_state()
            .push_predicate(Predicate::group(conditions, Combinator::Or));
        self
    }

    /// Group built by a predicate function run against a fresh state
    ///
    /// The function may only add predicates; any other directive fails with
    /// `InvalidPredicateShape`.
    fn push_where_nested<F>(self, build: F) -> RepositoryResult<Self>
    where
        F: FnOnce(QueryState) -> RepositoryResult<QueryState>,
    {
        self.push_nested(build, Combinator::And)
    }

    /// OR-joined group built by a predicate function
    fn push_or_where_nested<F>(self, build: F) -> RepositoryResult<Self>
    where
        F: FnOnce(QueryState) -> RepositoryResult<QueryState>,
    {
        self.push_nested(build, Combinator::Or)
    }

    /// Only predicates may be set inside a group; sort, limit, offset,
    /// select, grouping, having and relation directives are rejected.
    #[doc(hidden)]
    fn push_nested<F>(mut self, build: F, combinator: Combinator) -> RepositoryResult<Self>
    where
        F: FnOnce(QueryState) -> RepositoryResult<QueryState>,
    {
        let nested = build(QueryState::new())?;
        let predicates_only = QueryState {
            predicates: nested.predicates.clone(),
            ..QueryState::default()
        };
        if nested != predicates_only {
            return Err(RepositoryError::invalid_predicate_shape(
                "nested groups accept predicates only",
            ));
        }
        self.query_state().push_predicate(Predicate::new(
            Clause::Group {
                predicates: nested.predicates,
            },
            combinator,
        ));
        Ok(self)
    }

    /// `column IS NULL`
    #[must_use]
    fn push_where_null(mut self, column: impl Into<String>) -> Self {
        self.query_state()
            .push_predicate(Predicate::null_check(column, false));
        self
    }

    /// `column IS NOT NULL`
    #[must_use]
    fn push_where_not_null(mut self, column: impl Into<String>) -> Self {
        self.query_state()
            .push_predicate(Predicate::null_check(column, true));
        self
    }

    /// `column BETWEEN low AND high`
    fn push_where_between(
        mut self,
        column: impl Into<String>,
        values: impl Into<Value>,
    ) -> RepositoryResult<Self> {
        let predicate = Predicate::between(column, values, false)?;
        self.query_state().push_predicate(predicate);
        Ok(self)
    }

    /// `column NOT BETWEEN low AND high`
    fn push_where_not_between(
        mut self,
        column: impl Into<String>,
        values: impl Into<Value>,
    ) -> RepositoryResult<Self> {
        let predicate = Predicate::between(column, values, true)?;
        self.query_state().push_predicate(predicate);
        Ok(self)
    }

    /// `column IN (values...)`
    fn push_where_in(
        mut self,
        column: impl Into<String>,
        values: impl Into<Value>,
    ) -> RepositoryResult<Self> {
        let predicate = Predicate::in_list(column, values, false)?;
        self.query_state().push_predicate(predicate);
        Ok(self)
    }

    /// `column NOT IN (values...)`
    fn push_where_not_in(
        mut self,
        column: impl Into<String>,
        values: impl Into<Value>,
    ) -> RepositoryResult<Self> {
        let predicate = Predicate::in_list(column, values, true)?;
        self.query_state().push_predicate(predicate);
        Ok(self)
    }

    /// `OR column LIKE %term%`
    #[must_use]
    fn push_search(mut self, column: impl Into<String>, term: impl Into<Value>) -> Self {
        self.query_state()
            .push_predicate(Predicate::search(column, term));
        self
    }

    /// One OR-combined substring match per `(column, term)` entry
    #[must_use]
    fn push_search_map<K, V>(mut self, terms: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (column, term) in terms {
            self.query_state()
                .push_predicate(Predicate::search(column, term));
        }
        self
    }

    /// Compare the date part of a column
    #[must_use]
    fn push_where_date(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_state()
            .push_predicate(Predicate::date_part(column, DatePart::Date, value));
        self
    }

    /// Compare the month part of a column
    #[must_use]
    fn push_where_month(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_state()
            .push_predicate(Predicate::date_part(column, DatePart::Month, value));
        self
    }

    /// Compare the day part of a column
    #[must_use]
    fn push_where_day(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_state()
            .push_predicate(Predicate::date_part(column, DatePart::Day, value));
        self
    }

    /// Compare the time part of a column
    #[must_use]
    fn push_where_time(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query_state()
            .push_predicate(Predicate::date_part(column, DatePart::Time, value));
        self
    }

    #[must_use]
    fn push_order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.query_state().sort.push((column.into(), direction));
        self
    }

    #[must_use]
    fn push_limit(mut self, limit: u64) -> Self {
        self.query_state().limit = Some(limit);
        self
    }

    /// Alias of [`push_limit`](Self::push_limit)
    #[must_use]
    fn push_take(self, count: u64) -> Self {
        self.push_limit(count)
    }

    #[must_use]
    fn push_offset(mut self, offset: u64) -> Self {
        self.query_state().offset = Some(offset);
        self
    }

    /// Alias of [`push_offset`](Self::push_offset)
    #[must_use]
    fn push_skip(self, count: u64) -> Self {
        self.push_offset(count)
    }

    /// Replace the selected column set
    #[must_use]
    fn push_select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_state().select(columns);
        self
    }

    #[must_use]
    fn push_group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_state()
            .group_by
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// `HAVING column <operator> value`
    #[must_use]
    fn push_having(
        mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.query_state()
            .having
            .push(Predicate::compare(column, operator, value, Combinator::And));
        self
    }
}
