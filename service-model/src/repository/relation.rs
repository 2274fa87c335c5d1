//! Relation spec resolution
//!
//! A relation spec names related record sets to eager-load or count, each with
//! optional options: `false` to skip it, a custom filter function, or a map of
//! directive names to arguments (`{"pushWhere": ["approved", true]}`). Resolving
//! a spec yields one [`RelationInstruction`] per kept entry, carrying the ordered
//! [`SubOperation`] list the accessor applies to the related query.
//!
//! Directive names lose a literal `push` prefix and their first letter is
//! lowered (`pushWhereIn` becomes `whereIn`); the result must name one of the
//! closed set of [`ClauseKind`]s or resolution fails with
//! `UnsupportedRelationOperation`.
//!
//! # Example
//!
//! ```rust
//! use service_model::repository::{RelationMode, RelationSpec, Value};
//!
//! let spec = RelationSpec::new()
//!     .plain("author")
//!     .skip("tags")
//!     .directives(
//!         "comments",
//!         Value::Map(vec![("pushWhere".into(), Value::from(vec!["approved", "1"]))]),
//!     );
//!
//! let instructions = spec.resolve(RelationMode::EagerLoad).unwrap();
//! assert_eq!(instructions.len(), 2);
//! assert!(instructions[0].sub_operations().is_empty());
//! assert_eq!(instructions[1].sub_operations()[0].clause.name(), "where");
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::warn;

use super::accessor::OrderDirection;
use super::error::{RepositoryError, RepositoryResult};
use super::predicate::{Clause, Combinator, Condition, Operator, Predicate, PredicateBuilder};
use super::state::QueryState;
use super::value::Value;

/// Literal prefix marking a key as a fluent directive
const DIRECTIVE_PREFIX: &str = "push";

/// Key that count-mode options are nested under
const COUNT_FILTER_KEY: &str = "pushWhere";

type FilterFn = dyn Fn(QueryState) -> RepositoryResult<QueryState> + Send + Sync;

/// Caller-supplied function building a related query by hand
#[derive(Clone)]
pub struct CustomFilter(Arc<FilterFn>);

impl CustomFilter {
    pub fn new<F>(filter: F) -> Self
    where
        F: Fn(QueryState) -> RepositoryResult<QueryState> + Send + Sync + 'static,
    {
        Self(Arc::new(filter))
    }

    /// Run the filter against `state`
    pub fn apply(&self, state: QueryState) -> RepositoryResult<QueryState> {
        (self.0)(state)
    }
}

impl fmt::Debug for CustomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomFilter(..)")
    }
}

impl PartialEq for CustomFilter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for CustomFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<custom filter>")
    }
}

/// Options attached to one relation name
#[derive(Debug, Clone, PartialEq)]
pub enum RelationOptions {
    /// Drop the relation; used to switch off a default relation
    Skip,
    /// Load or count with no filtering
    Plain,
    /// Map of directive names to arguments
    Directives(Value),
    /// Hand-built related query
    Custom(CustomFilter),
}

/// Ordered mapping of relation name to options
///
/// Inserting a name that is already present replaces its options in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationSpec {
    entries: Vec<(String, RelationOptions)>,
}

impl RelationSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, options: RelationOptions) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = options,
            None => self.entries.push((name, options)),
        }
    }

    #[must_use]
    pub fn plain(mut self, name: impl Into<String>) -> Self {
        self.insert(name, RelationOptions::Plain);
        self
    }

    #[must_use]
    pub fn skip(mut self, name: impl Into<String>) -> Self {
        self.insert(name, RelationOptions::Skip);
        self
    }

    #[must_use]
    pub fn directives(mut self, name: impl Into<String>, options: impl Into<Value>) -> Self {
        self.insert(name, RelationOptions::Directives(options.into()));
        self
    }

    #[must_use]
    pub fn custom<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(QueryState) -> RepositoryResult<QueryState> + Send + Sync + 'static,
    {
        self.insert(name, RelationOptions::Custom(CustomFilter::new(filter)));
        self
    }

    pub fn entries(&self) -> &[(String, RelationOptions)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when `name` has an entry, including a skipped one
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// Append `required` entries whose names this spec does not mention
    #[must_use]
    pub fn with_required(mut self, required: &RelationSpec) -> Self {
        for (name, options) in &required.entries {
            if !self.contains(name) {
                self.entries.push((name.clone(), options.clone()));
            }
        }
        self
    }

    /// Translate every kept entry into a relation instruction
    pub fn resolve(&self, mode: RelationMode) -> RepositoryResult<Vec<RelationInstruction>> {
        let mut instructions = Vec::with_capacity(self.entries.len());
        for (name, options) in &self.entries {
            let filter = match options {
                RelationOptions::Skip => continue,
                RelationOptions::Plain => RelationFilter::Operations(Vec::new()),
                RelationOptions::Custom(filter) => RelationFilter::Custom(filter.clone()),
                RelationOptions::Directives(options) => {
                    let options = match mode {
                        RelationMode::CountOnly => nest_count_filter(options),
                        RelationMode::EagerLoad => options.clone(),
                    };
                    let operations = resolve_directives(&options).map_err(|e| {
                        RepositoryError {
                            message: format!("relation '{}': {}", name, e.message),
                            ..e
                        }
                    })?;
                    RelationFilter::Operations(operations)
                }
            };
            instructions.push(RelationInstruction {
                name: name.clone(),
                mode,
                filter,
            });
        }
        Ok(instructions)
    }
}

fn nest_count_filter(options: &Value) -> Value {
    if options.get(COUNT_FILTER_KEY).is_some() {
        options.clone()
    } else {
        Value::Map(vec![(COUNT_FILTER_KEY.to_string(), options.clone())])
    }
}

impl From<&str> for RelationSpec {
    fn from(name: &str) -> Self {
        Self::from(vec![name])
    }
}

impl From<String> for RelationSpec {
    fn from(name: String) -> Self {
        Self::from(vec![name])
    }
}

impl<S: Into<String>> From<Vec<S>> for RelationSpec {
    fn from(names: Vec<S>) -> Self {
        let mut spec = Self::new();
        for name in names {
            let name = name.into();
            if !name.trim().is_empty() {
                spec.insert(name, RelationOptions::Plain);
            }
        }
        spec
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for RelationSpec {
    fn from(names: [S; N]) -> Self {
        Self::from(Vec::from(names))
    }
}

impl TryFrom<Value> for RelationSpec {
    type Error = RepositoryError;

    /// Accepts a name, a list of names and maps, or a map of name to options
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let mut spec = Self::new();
        spec.extend_from_value(value)?;
        Ok(spec)
    }
}

impl RelationSpec {
    fn extend_from_value(&mut self, value: Value) -> RepositoryResult<()> {
        match value {
            Value::Null => Ok(()),
            Value::String(name) => {
                if !name.trim().is_empty() {
                    self.insert(name, RelationOptions::Plain);
                }
                Ok(())
            }
            Value::List(items) => items
                .into_iter()
                .try_for_each(|item| self.extend_from_value(item)),
            Value::Map(entries) => {
                for (name, options) in entries {
                    let options = match options {
                        Value::Boolean(false) => RelationOptions::Skip,
                        Value::Boolean(true) | Value::Null => RelationOptions::Plain,
                        Value::Map(ref m) if m.is_empty() => RelationOptions::Plain,
                        Value::List(ref l) if l.is_empty() => RelationOptions::Plain,
                        other => RelationOptions::Directives(other),
                    };
                    self.insert(name, options);
                }
                Ok(())
            }
            other => Err(RepositoryError::invalid_relation_spec(format!(
                "expected a relation name, list or map, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Whether a relation is loaded or only counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationMode {
    #[default]
    EagerLoad,
    CountOnly,
}

/// Closed set of clause operations a directive can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClauseKind {
    Where,
    OrWhere,
    WhereIn,
    WhereNotIn,
    WhereBetween,
    WhereNotBetween,
    WhereNull,
    WhereNotNull,
    WhereDate,
    WhereMonth,
    WhereDay,
    WhereTime,
    WhereHas,
    WhereDoesntHave,
    Has,
    DoesntHave,
    OrderBy,
    Limit,
    Offset,
    Take,
    Skip,
    Select,
    With,
    WithCount,
    GroupBy,
    Having,
    Search,
}

const CLAUSE_TABLE: &[(&str, ClauseKind)] = &[
    ("where", ClauseKind::Where),
    ("orWhere", ClauseKind::OrWhere),
    ("whereIn", ClauseKind::WhereIn),
    ("whereNotIn", ClauseKind::WhereNotIn),
    ("whereBetween", ClauseKind::WhereBetween),
    ("whereNotBetween", ClauseKind::WhereNotBetween),
    ("whereNull", ClauseKind::WhereNull),
    ("whereNotNull", ClauseKind::WhereNotNull),
    ("whereDate", ClauseKind::WhereDate),
    ("whereMonth", ClauseKind::WhereMonth),
    ("whereDay", ClauseKind::WhereDay),
    ("whereTime", ClauseKind::WhereTime),
    ("whereHas", ClauseKind::WhereHas),
    ("whereDoesntHave", ClauseKind::WhereDoesntHave),
    ("has", ClauseKind::Has),
    ("doesntHave", ClauseKind::DoesntHave),
    ("orderBy", ClauseKind::OrderBy),
    ("limit", ClauseKind::Limit),
    ("offset", ClauseKind::Offset),
    ("take", ClauseKind::Take),
    ("skip", ClauseKind::Skip),
    ("select", ClauseKind::Select),
    ("with", ClauseKind::With),
    ("withCount", ClauseKind::WithCount),
    ("groupBy", ClauseKind::GroupBy),
    ("having", ClauseKind::Having),
    ("search", ClauseKind::Search),
];

impl ClauseKind {
    /// Look up a normalized operation name; matching is case-sensitive
    pub fn from_name(name: &str) -> Option<Self> {
        CLAUSE_TABLE
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
    }

    /// Resolve a raw directive key such as `pushWhereIn`
    pub fn from_directive(key: &str) -> RepositoryResult<Self> {
        Self::from_name(&normalize_directive(key))
            .ok_or_else(|| RepositoryError::unsupported_relation_operation(key))
    }

    pub fn name(self) -> &'static str {
        CLAUSE_TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map_or("unknown", |(name, _)| name)
    }

    /// Operations whose name mentions "where" take a condition list argument
    pub fn is_where_family(self) -> bool {
        self.name().to_ascii_lowercase().contains("where")
    }
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ClauseKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Strip the directive prefix and lower the first letter
///
/// ```rust
/// use service_model::repository::normalize_directive;
///
/// assert_eq!(normalize_directive("pushWhereIn"), "whereIn");
/// assert_eq!(normalize_directive("orderBy"), "orderBy");
/// assert_eq!(normalize_directive("PushWhere"), "pushWhere");
/// ```
pub fn normalize_directive(key: &str) -> String {
    let stripped = key.strip_prefix(DIRECTIVE_PREFIX).unwrap_or(key);
    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One clause operation to apply to a related query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubOperation {
    pub clause: ClauseKind,
    /// Positional arguments for the clause
    pub args: Vec<Value>,
    /// Nested instructions for with/withCount/whereHas/whereDoesntHave
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<RelationInstruction>,
}

impl SubOperation {
    /// Build the operation for one directive argument
    ///
    /// Where-family clauses get a flat list argument wrapped in one extra list
    /// layer; nested lists pass through unchanged.
    pub fn new(clause: ClauseKind, arg: Value) -> RepositoryResult<Self> {
        let relations = match clause {
            ClauseKind::With | ClauseKind::WhereHas | ClauseKind::WhereDoesntHave => {
                RelationSpec::try_from(arg.clone())?.resolve(RelationMode::EagerLoad)?
            }
            ClauseKind::WithCount => {
                RelationSpec::try_from(arg.clone())?.resolve(RelationMode::CountOnly)?
            }
            _ => Vec::new(),
        };

        let args = if clause.is_where_family() && arg.is_list() && !arg.is_nested_list() {
            vec![Value::List(vec![arg])]
        } else {
            vec![arg]
        };

        Ok(Self {
            clause,
            args,
            relations,
        })
    }

    /// Apply this operation to `state`
    pub fn apply(&self, state: QueryState) -> RepositoryResult<QueryState> {
        let args = peel(&self.args);
        let clause = self.clause;
        match clause {
            ClauseKind::Where => apply_where(state, args, Combinator::And),
            ClauseKind::OrWhere => apply_where(state, args, Combinator::Or),
            ClauseKind::WhereIn | ClauseKind::WhereNotIn => {
                let [column, values] = positional::<2>(clause, args)?;
                let column = column_name(clause, column)?;
                if clause == ClauseKind::WhereIn {
                    state.push_where_in(column, values.clone())
                } else {
                    state.push_where_not_in(column, values.clone())
                }
            }
            ClauseKind::WhereBetween | ClauseKind::WhereNotBetween => {
                let [column, values] = positional::<2>(clause, args)?;
                let column = column_name(clause, column)?;
                if clause == ClauseKind::WhereBetween {
                    state.push_where_between(column, values.clone())
                } else {
                    state.push_where_not_between(column, values.clone())
                }
            }
            ClauseKind::WhereNull => {
                let [column] = positional::<1>(clause, args)?;
                Ok(state.push_where_null(column_name(clause, column)?))
            }
            ClauseKind::WhereNotNull => {
                let [column] = positional::<1>(clause, args)?;
                Ok(state.push_where_not_null(column_name(clause, column)?))
            }
            ClauseKind::WhereDate
            | ClauseKind::WhereMonth
            | ClauseKind::WhereDay
            | ClauseKind::WhereTime => {
                let [column, value] = positional::<2>(clause, args)?;
                let column = column_name(clause, column)?;
                let value = value.clone();
                Ok(match clause {
                    ClauseKind::WhereDate => state.push_where_date(column, value),
                    ClauseKind::WhereMonth => state.push_where_month(column, value),
                    ClauseKind::WhereDay => state.push_where_day(column, value),
                    _ => state.push_where_time(column, value),
                })
            }
            ClauseKind::WhereHas | ClauseKind::WhereDoesntHave => {
                let negate = clause == ClauseKind::WhereDoesntHave;
                Ok(self
                    .relations
                    .iter()
                    .fold(state, |state, instruction| {
                        push_exists(state, instruction.clone(), negate)
                    }))
            }
            ClauseKind::Has => {
                let (relation, rest) = match args {
                    [relation, rest @ ..] => (column_name(clause, relation)?, rest),
                    [] => return Err(shape_error(clause, "expects a relation name")),
                };
                let (operator, count) = match rest {
                    [] => (Operator::GreaterThanOrEqual, 1),
                    [count] => (Operator::GreaterThanOrEqual, integer(clause, count)?),
                    [Value::String(op), count] => (op.parse()?, integer(clause, count)?),
                    _ => return Err(shape_error(clause, "expects [relation, operator, count]")),
                };
                Ok(state.push_has(relation, operator, count))
            }
            ClauseKind::DoesntHave => {
                let [relation] = positional::<1>(clause, args)?;
                Ok(state.push_doesnt_have(column_name(clause, relation)?))
            }
            ClauseKind::OrderBy => {
                let (column, direction) = match args {
                    [column] => (column_name(clause, column)?, OrderDirection::Ascending),
                    [column, direction] => (
                        column_name(clause, column)?,
                        OrderDirection::from_lenient(&direction.to_text()),
                    ),
                    _ => return Err(shape_error(clause, "expects [column, direction]")),
                };
                Ok(state.push_order_by(column, direction))
            }
            ClauseKind::Limit | ClauseKind::Take => {
                let [count] = positional::<1>(clause, args)?;
                Ok(state.push_limit(unsigned(clause, count)?))
            }
            ClauseKind::Offset | ClauseKind::Skip => {
                let [count] = positional::<1>(clause, args)?;
                Ok(state.push_offset(unsigned(clause, count)?))
            }
            ClauseKind::Select => Ok(state.push_select(column_names(clause, args)?)),
            ClauseKind::GroupBy => Ok(state.push_group_by(column_names(clause, args)?)),
            ClauseKind::Having => {
                let condition = Condition::from_args(args)?;
                Ok(state.push_having(condition.column, condition.operator, condition.value))
            }
            ClauseKind::Search => match args {
                [Value::Map(terms)] => Ok(state.push_search_map(terms.clone())),
                [column, term] => Ok(state.push_search(column_name(clause, column)?, term.clone())),
                _ => Err(shape_error(clause, "expects [column, term] or a column map")),
            },
            ClauseKind::With | ClauseKind::WithCount => {
                let mut state = state;
                for instruction in &self.relations {
                    state.push_relation(instruction.clone());
                }
                Ok(state)
            }
        }
    }
}

/// Resolve a directive map into ordered sub-operations
pub fn resolve_directives(options: &Value) -> RepositoryResult<Vec<SubOperation>> {
    let entries = match options {
        Value::Map(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(RepositoryError::invalid_relation_spec(format!(
                "relation options must be a map of directives, got {}",
                other.type_name()
            )))
        }
    };

    entries
        .iter()
        .map(|(key, arg)| SubOperation::new(ClauseKind::from_directive(key)?, arg.clone()))
        .collect()
}

/// Build a query state from a top-level directive map
///
/// ```rust
/// use service_model::repository::{state_from_directives, Value};
///
/// let directives: Value = serde_json::from_str(
///     r#"{"pushWhere": ["status", "active"], "pushOrderBy": ["name", "desc"], "pushLimit": 5}"#,
/// ).unwrap();
/// let state = state_from_directives(&directives).unwrap();
/// assert_eq!(state.predicates.len(), 1);
/// assert_eq!(state.limit, Some(5));
/// ```
pub fn state_from_directives(options: &Value) -> RepositoryResult<QueryState> {
    resolve_directives(options)?
        .iter()
        .try_fold(QueryState::new(), |state, operation| operation.apply(state))
}

/// Filter applied to a related query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationFilter {
    Operations(Vec<SubOperation>),
    Custom(CustomFilter),
}

impl Default for RelationFilter {
    fn default() -> Self {
        Self::Operations(Vec::new())
    }
}

/// Normalized directive to eager-load or count a related record set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationInstruction {
    /// Relation name, possibly a dotted nested path
    pub name: String,
    pub mode: RelationMode,
    pub filter: RelationFilter,
}

impl RelationInstruction {
    /// Unfiltered instruction
    pub fn new(name: impl Into<String>, mode: RelationMode) -> Self {
        Self {
            name: name.into(),
            mode,
            filter: RelationFilter::default(),
        }
    }

    /// Ordered sub-operations; empty for custom filters
    pub fn sub_operations(&self) -> &[SubOperation] {
        match &self.filter {
            RelationFilter::Operations(operations) => operations,
            RelationFilter::Custom(_) => &[],
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.filter, RelationFilter::Custom(_))
    }

    /// Translate the filter into the related query's own state
    pub fn sub_query(&self) -> RepositoryResult<QueryState> {
        match &self.filter {
            RelationFilter::Custom(filter) => filter.apply(QueryState::new()),
            RelationFilter::Operations(operations) => operations
                .iter()
                .try_fold(QueryState::new(), |state, operation| operation.apply(state)),
        }
    }
}

/// Relation directives on top of [`PredicateBuilder`]
///
/// Resolution failures are logged and returned; nothing is appended when any
/// entry of the spec is rejected.
pub trait RelationBuilder: PredicateBuilder {
    /// Eager-load the relations named by `spec`
    fn push_with(mut self, spec: impl Into<RelationSpec>) -> RepositoryResult<Self> {
        let instructions = resolve_logged(&spec.into(), RelationMode::EagerLoad)?;
        let state = self.query_state();
        for instruction in instructions {
            state.push_relation(instruction);
        }
        Ok(self)
    }

    /// Count the relations named by `spec`
    fn push_with_count(mut self, spec: impl Into<RelationSpec>) -> RepositoryResult<Self> {
        let instructions = resolve_logged(&spec.into(), RelationMode::CountOnly)?;
        let state = self.query_state();
        for instruction in instructions {
            state.push_relation(instruction);
        }
        Ok(self)
    }

    /// Keep records with `count(relation) <operator> count`
    #[must_use]
    fn push_has(mut self, relation: impl Into<String>, operator: Operator, count: i64) -> Self {
        self.query_state().push_predicate(Predicate::new(
            Clause::Exists {
                relation: relation.into(),
                filter: RelationFilter::default(),
                operator,
                count,
                negate: false,
            },
            Combinator::And,
        ));
        self
    }

    /// Keep records with no related record
    #[must_use]
    fn push_doesnt_have(mut self, relation: impl Into<String>) -> Self {
        self.query_state().push_predicate(Predicate::new(
            Clause::Exists {
                relation: relation.into(),
                filter: RelationFilter::default(),
                operator: Operator::GreaterThanOrEqual,
                count: 1,
                negate: true,
            },
            Combinator::And,
        ));
        self
    }

    /// Keep records with at least one related record matching the options
    fn push_where_has(mut self, spec: impl Into<RelationSpec>) -> RepositoryResult<Self> {
        let instructions = resolve_logged(&spec.into(), RelationMode::EagerLoad)?;
        let state = self.query_state();
        for instruction in instructions {
            *state = push_exists(state.take(), instruction, false);
        }
        Ok(self)
    }

    /// Keep records with no related record matching the options
    fn push_where_doesnt_have(mut self, spec: impl Into<RelationSpec>) -> RepositoryResult<Self> {
        let instructions = resolve_logged(&spec.into(), RelationMode::EagerLoad)?;
        let state = self.query_state();
        for instruction in instructions {
            *state = push_exists(state.take(), instruction, true);
        }
        Ok(self)
    }
}

fn resolve_logged(
    spec: &RelationSpec,
    mode: RelationMode,
) -> RepositoryResult<Vec<RelationInstruction>> {
    spec.resolve(mode).inspect_err(|e| {
        warn!(
            error = %e,
            mode = ?mode,
            relations = spec.len(),
            "Relation spec rejected"
        );
    })
}

fn push_exists(mut state: QueryState, instruction: RelationInstruction, negate: bool) -> QueryState {
    state.push_predicate(Predicate::new(
        Clause::Exists {
            relation: instruction.name,
            filter: instruction.filter,
            operator: Operator::GreaterThanOrEqual,
            count: 1,
            negate,
        },
        Combinator::And,
    ));
    state
}

fn apply_where(
    state: QueryState,
    args: &[Value],
    combinator: Combinator,
) -> RepositoryResult<QueryState> {
    let is_condition_list = !args.is_empty() && args.iter().all(|a| a.is_list() || a.is_map());
    let conditions = if is_condition_list {
        Condition::list_from_value(&Value::List(args.to_vec()))?
    } else {
        vec![Condition::from_args(args)?]
    };

    let mut state = state;
    match <[Condition; 1]>::try_from(conditions) {
        Ok([condition]) => state.push_predicate(Predicate::compare(
            condition.column,
            condition.operator,
            condition.value,
            combinator,
        )),
        Err(conditions) if conditions.is_empty() => {}
        Err(conditions) => state.push_predicate(Predicate::group(conditions, combinator)),
    }
    Ok(state)
}

/// Drop singleton list layers so `[[["a", 1]]]` reads as `["a", 1]`
fn peel(args: &[Value]) -> &[Value] {
    let mut args = args;
    while let [Value::List(inner)] = args {
        args = inner;
    }
    args
}

fn positional<const N: usize>(clause: ClauseKind, args: &[Value]) -> RepositoryResult<[&Value; N]> {
    let refs: Vec<&Value> = args.iter().collect();
    refs.try_into().map_err(|refs: Vec<&Value>| {
        shape_error(
            clause,
            &format!("expects {} argument(s), got {}", N, refs.len()),
        )
    })
}

fn column_name(clause: ClauseKind, value: &Value) -> RepositoryResult<String> {
    match value {
        Value::String(name) if !name.is_empty() => Ok(name.clone()),
        other => Err(shape_error(
            clause,
            &format!("expects a column name, got {}", other.type_name()),
        )),
    }
}

fn column_names(clause: ClauseKind, args: &[Value]) -> RepositoryResult<Vec<String>> {
    args.iter().map(|arg| column_name(clause, arg)).collect()
}

fn integer(clause: ClauseKind, value: &Value) -> RepositoryResult<i64> {
    value
        .as_i64()
        .ok_or_else(|| shape_error(clause, &format!("expects an integer, got {}", value.type_name())))
}

fn unsigned(clause: ClauseKind, value: &Value) -> RepositoryResult<u64> {
    let n = integer(clause, value)?;
    u64::try_from(n).map_err(|_| shape_error(clause, "expects a non-negative integer"))
}

fn shape_error(clause: ClauseKind, detail: &str) -> RepositoryError {
    RepositoryError::invalid_predicate_shape(format!("{} {}", clause, detail))
}

/// Relations saved alongside a record
///
/// ```rust
/// use service_model::repository::Associations;
///
/// assert_eq!(Associations::from("tags").associated, vec!["tags".to_string()]);
/// assert!(Associations::from("  ").is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Associations {
    pub associated: Vec<String>,
}

impl Associations {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            associated: names
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.trim().is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.associated.is_empty()
    }
}

impl From<&str> for Associations {
    fn from(name: &str) -> Self {
        Self::new([name])
    }
}

impl From<String> for Associations {
    fn from(name: String) -> Self {
        Self::new([name])
    }
}

impl<S: Into<String>> From<Vec<S>> for Associations {
    fn from(names: Vec<S>) -> Self {
        Self::new(names)
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Associations {
    fn from(names: [S; N]) -> Self {
        Self::new(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{PredicateKind, RepositoryErrorKind};

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn test_normalize_directive() {
        assert_eq!(normalize_directive("pushWhere"), "where");
        assert_eq!(normalize_directive("pushWithCount"), "withCount");
        assert_eq!(normalize_directive("pushOrWhere"), "orWhere");
        assert_eq!(normalize_directive("where"), "where");
        assert_eq!(normalize_directive("push"), "");
        // the prefix is literal, not a character set
        assert_eq!(normalize_directive("pushHas"), "has");
        assert_eq!(normalize_directive("shuffle"), "shuffle");
    }

    #[test]
    fn test_clause_lookup_is_case_sensitive() {
        assert_eq!(ClauseKind::from_name("whereIn"), Some(ClauseKind::WhereIn));
        assert_eq!(ClauseKind::from_name("wherein"), None);
        assert_eq!(ClauseKind::WhereDoesntHave.name(), "whereDoesntHave");
        assert!(ClauseKind::OrWhere.is_where_family());
        assert!(!ClauseKind::OrderBy.is_where_family());
    }

    #[test]
    fn test_false_entry_is_absent() {
        let spec = RelationSpec::try_from(map(vec![
            ("author", Value::Boolean(false)),
            ("comments", Value::Boolean(true)),
        ]))
        .unwrap();
        let instructions = spec.resolve(RelationMode::EagerLoad).unwrap();
        assert_eq!(instructions.len(), 1);
        assert_eq!(instructions[0].name, "comments");
    }

    #[test]
    fn test_bare_names_have_no_sub_operations() {
        let spec = RelationSpec::from(vec!["author", "comments.user"]);
        let instructions = spec.resolve(RelationMode::EagerLoad).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[1].name, "comments.user");
        assert!(instructions.iter().all(|i| i.sub_operations().is_empty()));
        assert!(instructions.iter().all(|i| i.mode == RelationMode::EagerLoad));
    }

    #[test]
    fn test_flat_where_argument_is_wrapped() {
        let spec = RelationSpec::new().directives(
            "comments",
            map(vec![("pushWhere", Value::from(vec!["approved", "yes"]))]),
        );
        let instructions = spec.resolve(RelationMode::EagerLoad).unwrap();
        let operation = &instructions[0].sub_operations()[0];
        assert_eq!(operation.clause, ClauseKind::Where);
        assert_eq!(
            operation.args,
            vec![Value::List(vec![Value::from(vec!["approved", "yes"])])]
        );
    }

    #[test]
    fn test_nested_where_argument_passes_through() {
        let nested = Value::List(vec![
            Value::from(vec!["approved", "yes"]),
            Value::List(vec!["votes".into(), ">".into(), 3.into()]),
        ]);
        let spec = RelationSpec::new().directives(
            "comments",
            map(vec![("pushWhere", nested.clone())]),
        );
        let instructions = spec.resolve(RelationMode::EagerLoad).unwrap();
        assert_eq!(instructions[0].sub_operations()[0].args, vec![nested]);
    }

    #[test]
    fn test_non_where_argument_is_not_wrapped() {
        let spec = RelationSpec::new().directives(
            "comments",
            map(vec![("pushOrderBy", Value::from(vec!["created_at", "desc"]))]),
        );
        let instructions = spec.resolve(RelationMode::EagerLoad).unwrap();
        assert_eq!(
            instructions[0].sub_operations()[0].args,
            vec![Value::from(vec!["created_at", "desc"])]
        );
    }

    #[test]
    fn test_unknown_directive_is_rejected() {
        let spec = RelationSpec::new().directives(
            "comments",
            map(vec![("pushFrobnicate", Value::from(1))]),
        );
        let err = spec.resolve(RelationMode::EagerLoad).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnsupportedRelationOperation);
        assert!(err.message.contains("comments"));
        assert!(err.message.contains("pushFrobnicate"));
    }

    #[test]
    fn test_count_mode_nests_options_under_filter_key() {
        let spec = RelationSpec::new().directives("comments", Value::from(vec!["approved", "yes"]));
        let instructions = spec.resolve(RelationMode::CountOnly).unwrap();
        let operation = &instructions[0].sub_operations()[0];
        assert_eq!(instructions[0].mode, RelationMode::CountOnly);
        assert_eq!(operation.clause, ClauseKind::Where);

        let sub = instructions[0].sub_query().unwrap();
        assert_eq!(sub.predicates.len(), 1);
        assert_eq!(sub.predicates[0].column(), Some("approved"));
    }

    #[test]
    fn test_count_mode_keeps_existing_filter_key() {
        let options = map(vec![
            ("pushWhere", Value::from(vec!["approved", "yes"])),
            ("pushLimit", Value::from(3)),
        ]);
        let spec = RelationSpec::new().directives("comments", options);
        let instructions = spec.resolve(RelationMode::CountOnly).unwrap();
        let clauses: Vec<ClauseKind> = instructions[0]
            .sub_operations()
            .iter()
            .map(|op| op.clause)
            .collect();
        assert_eq!(clauses, vec![ClauseKind::Where, ClauseKind::Limit]);
    }

    #[test]
    fn test_custom_filter_passes_through() {
        let spec = RelationSpec::new().custom("comments", |q| Ok(q.push_where("approved", true)));
        let instructions = spec.resolve(RelationMode::EagerLoad).unwrap();
        assert!(instructions[0].is_custom());
        assert!(instructions[0].sub_operations().is_empty());

        let sub = instructions[0].sub_query().unwrap();
        assert_eq!(sub.predicates[0].value(), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_sub_query_translates_operations_in_order() {
        let options = map(vec![
            ("pushWhere", Value::List(vec!["votes".into(), ">".into(), 3.into()])),
            ("pushWhereIn", Value::List(vec!["status".into(), Value::from(vec!["a", "b"])])),
            ("pushWhereNull", Value::from("deleted_at")),
            ("pushOrderBy", Value::from(vec!["created_at", "desc"])),
            ("pushTake", Value::from(10)),
            ("pushSelect", Value::from(vec!["id", "body"])),
            ("pushWith", Value::from("user")),
        ]);
        let spec = RelationSpec::new().directives("comments", options);
        let instruction = &spec.resolve(RelationMode::EagerLoad).unwrap()[0];
        let sub = instruction.sub_query().unwrap();

        assert_eq!(sub.predicates[0].operator(), Some(Operator::GreaterThan));
        assert_eq!(sub.predicates[1].kind(), PredicateKind::In);
        assert_eq!(sub.predicates[2].kind(), PredicateKind::NullCheck);
        assert_eq!(
            sub.sort,
            vec![("created_at".to_string(), OrderDirection::Descending)]
        );
        assert_eq!(sub.limit, Some(10));
        assert_eq!(
            sub.selected_columns,
            Some(vec!["id".to_string(), "body".to_string()])
        );
        assert_eq!(sub.relations[0].name, "user");
    }

    #[test]
    fn test_sub_query_where_map_builds_group() {
        let options = map(vec![(
            "pushWhere",
            map(vec![("approved", Value::from(true)), ("spam", Value::from(false))]),
        )]);
        let instruction = &RelationSpec::new()
            .directives("comments", options)
            .resolve(RelationMode::EagerLoad)
            .unwrap()[0];
        let sub = instruction.sub_query().unwrap();
        assert_eq!(sub.predicates.len(), 1);
        assert_eq!(sub.predicates[0].kind(), PredicateKind::RawGroup);
    }

    #[test]
    fn test_sub_query_rejects_malformed_between() {
        let options = map(vec![(
            "pushWhereBetween",
            Value::List(vec!["age".into(), Value::from(vec![1, 2, 3])]),
        )]);
        let instruction = &RelationSpec::new()
            .directives("users", options)
            .resolve(RelationMode::EagerLoad)
            .unwrap()[0];
        let err = instruction.sub_query().unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidPredicateShape);
    }

    #[test]
    fn test_nested_with_rejects_unknown_directive_at_resolution() {
        let options = map(vec![(
            "pushWith",
            map(vec![("user", map(vec![("pushExplode", Value::from(1))]))]),
        )]);
        let err = RelationSpec::new()
            .directives("comments", options)
            .resolve(RelationMode::EagerLoad)
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnsupportedRelationOperation);
    }

    #[test]
    fn test_with_required_keeps_caller_entries() {
        let required = RelationSpec::from(vec!["author", "tags"]);
        let spec = RelationSpec::new()
            .skip("author")
            .plain("comments")
            .with_required(&required);

        let names: Vec<&str> = spec.entries().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["author", "comments", "tags"]);

        let resolved = spec.resolve(RelationMode::EagerLoad).unwrap();
        let names: Vec<&str> = resolved.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["comments", "tags"]);
    }

    #[test]
    fn test_spec_from_value_rejects_scalars() {
        let err = RelationSpec::try_from(Value::from(3)).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidRelationSpec);

        let spec = RelationSpec::try_from(Value::List(vec![
            "author".into(),
            map(vec![("comments", Value::Boolean(false))]),
        ]))
        .unwrap();
        assert_eq!(spec.len(), 2);
        assert_eq!(spec.entries()[1].1, RelationOptions::Skip);
    }

    #[test]
    fn test_eager_options_must_be_a_map() {
        let spec = RelationSpec::new().directives("comments", Value::from("approved"));
        let err = spec.resolve(RelationMode::EagerLoad).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidRelationSpec);
    }

    #[test]
    fn test_relation_builder_existence_predicates() {
        let state = QueryState::new()
            .push_has("comments", Operator::GreaterThan, 2)
            .push_doesnt_have("flags")
            .push_where_has(RelationSpec::new().directives(
                "tags",
                map(vec![("pushWhere", Value::from(vec!["name", "rust"]))]),
            ))
            .unwrap();

        let kinds: Vec<PredicateKind> = state.predicates.iter().map(Predicate::kind).collect();
        assert_eq!(
            kinds,
            vec![
                PredicateKind::Exists,
                PredicateKind::NotExists,
                PredicateKind::Exists
            ]
        );
        match &state.predicates[2].clause {
            Clause::Exists { relation, filter, .. } => {
                assert_eq!(relation, "tags");
                assert!(matches!(filter, RelationFilter::Operations(ops) if ops.len() == 1));
            }
            other => panic!("expected exists, got {:?}", other),
        }
    }

    #[test]
    fn test_push_with_failure_appends_nothing() {
        let result = QueryState::new().push_with(RelationSpec::new().plain("author").directives(
            "comments",
            map(vec![("pushNope", Value::from(1))]),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_push_with_count_marks_mode() {
        let state = QueryState::new().push_with_count("comments").unwrap();
        assert_eq!(state.relations[0].mode, RelationMode::CountOnly);
        assert!(state.relations[0].sub_operations().is_empty());
    }

    #[test]
    fn test_state_from_directives() {
        let directives: Value = serde_json::from_str(
            r#"{
                "pushWhere": [["status", "active"], ["age", ">", 18]],
                "pushWith": {"comments": {"pushLimit": 5}},
                "pushSearch": {"name": "ali"}
            }"#,
        )
        .unwrap();
        let state = state_from_directives(&directives).unwrap();
        assert_eq!(state.predicates[0].kind(), PredicateKind::RawGroup);
        assert_eq!(state.predicates[1].operator(), Some(Operator::Like));
        assert_eq!(state.relations[0].name, "comments");
        assert_eq!(state.relations[0].sub_query().unwrap().limit, Some(5));
    }

    #[test]
    fn test_associations_from_names() {
        assert_eq!(
            Associations::from(vec!["tags", "", "images"]).associated,
            vec!["tags".to_string(), "images".to_string()]
        );
        assert!(Associations::from("").is_empty());
        assert!(Associations::default().is_empty());
    }
}
