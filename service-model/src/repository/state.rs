//! Query state accumulator
//!
//! A [`QueryState`] collects predicates, relation instructions and the
//! sort/limit/offset/select/group/having directives of one logical query. It is
//! a plain value: builders own it, terminal calls hand it to the data accessor
//! by reference and then drop it.

use serde::Serialize;

use super::accessor::OrderDirection;
use super::predicate::{Predicate, PredicateBuilder};
use super::relation::{RelationBuilder, RelationInstruction};

/// Engine-agnostic description of one logical query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryState {
    /// Filters in the order they were issued
    pub predicates: Vec<Predicate>,
    /// Relation load and count instructions in the order they were issued
    pub relations: Vec<RelationInstruction>,
    pub sort: Vec<(String, OrderDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Selected columns; `None` lets the caller's default column set apply
    pub selected_columns: Option<Vec<String>>,
    pub group_by: Vec<String>,
    pub having: Vec<Predicate>,
}

impl QueryState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no directive of any kind has been recorded
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
            && self.relations.is_empty()
            && self.sort.is_empty()
            && self.limit.is_none()
            && self.offset.is_none()
            && self.selected_columns.is_none()
            && self.group_by.is_empty()
            && self.having.is_empty()
    }

    pub fn push_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn push_relation(&mut self, instruction: RelationInstruction) {
        self.relations.push(instruction);
    }

    /// Replace the selected column set, dropping duplicates but keeping order
    pub fn select<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if !selected.contains(&column) {
                selected.push(column);
            }
        }
        self.selected_columns = Some(selected);
    }

    /// Select `columns` only when nothing was selected explicitly
    pub fn select_default(&mut self, columns: &[String]) {
        if self.selected_columns.is_none() {
            self.select(columns.iter().cloned());
        }
    }

    /// Take the accumulated state, leaving an empty one behind
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl PredicateBuilder for QueryState {
    fn query_state(&mut self) -> &mut QueryState {
        self
    }
}

impl RelationBuilder for QueryState {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Operator;

    #[test]
    fn test_new_state_is_empty() {
        assert!(QueryState::new().is_empty());
    }

    #[test]
    fn test_any_directive_makes_state_non_empty() {
        assert!(!QueryState::new().push_where("a", 1).is_empty());
        assert!(!QueryState::new().push_limit(1).is_empty());
        assert!(!QueryState::new().push_select(["id"]).is_empty());
        assert!(!QueryState::new()
            .push_having("n", Operator::GreaterThan, 1)
            .is_empty());
    }

    #[test]
    fn test_select_deduplicates_in_order() {
        let mut state = QueryState::new();
        state.select(["id", "name", "id", "email"]);
        assert_eq!(
            state.selected_columns,
            Some(vec![
                "id".to_string(),
                "name".to_string(),
                "email".to_string()
            ])
        );
    }

    #[test]
    fn test_select_default_keeps_explicit_selection() {
        let mut state = QueryState::new().push_select(["name"]);
        state.select_default(&["id".to_string(), "email".to_string()]);
        assert_eq!(state.selected_columns, Some(vec!["name".to_string()]));

        let mut state = QueryState::new();
        state.select_default(&["id".to_string()]);
        assert_eq!(state.selected_columns, Some(vec!["id".to_string()]));
    }

    #[test]
    fn test_take_leaves_empty_state() {
        let mut state = QueryState::new().push_where("status", "active").push_limit(5);
        let taken = state.take();
        assert!(state.is_empty());
        assert_eq!(taken.predicates.len(), 1);
        assert_eq!(taken.limit, Some(5));
    }

    #[test]
    fn test_serializes_to_json() {
        let state = QueryState::new()
            .push_where_cmp("age", Operator::GreaterThan, 18)
            .push_order_by("name", OrderDirection::Ascending);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["predicates"][0]["type"], "compare");
        assert_eq!(json["predicates"][0]["operator"], ">");
        assert_eq!(json["predicates"][0]["combinator"], "AND");
        assert_eq!(json["sort"][0][1], "asc");
    }
}
