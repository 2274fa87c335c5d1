//! Validation gate and rule-set validator
//!
//! Mutating calls run their input through a [`Validator`] under a named rule
//! before anything reaches the data accessor. The [`ValidationGate`] owns the
//! validator and keeps the errors of the most recent failed check until they are
//! overwritten or cleared.
//!
//! [`RuleValidator`] is a config-driven validator using pipe-separated
//! constraint strings:
//!
//! ```rust
//! use service_model::repository::{Record, RuleValidator, ValidationOptions, Validator};
//!
//! let validator = RuleValidator::builder()
//!     .with_rule("default", "email", "required|string|max:255")
//!     .with_rule("default", "age", "nullable|integer|min:18")
//!     .build()
//!     .unwrap();
//!
//! let mut data = Record::new();
//! data.insert("age".into(), 12.into());
//!
//! let result = validator.validate(&data, &ValidationOptions::new("default"));
//! assert!(!result.valid);
//! assert_eq!(
//!     result.errors.first("email"),
//!     Some("The email field is required.")
//! );
//! assert_eq!(result.errors.first("age"), Some("The age must be at least 18."));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{RepositoryError, RepositoryResult};
use super::value::{Record, Value};

/// Validation error messages keyed by field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message for a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with at least one message
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// First message recorded for a field
    pub fn first(&self, field: &str) -> Option<&str> {
        self.0.get(field)?.first().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl From<BTreeMap<String, Vec<String>>> for ValidationErrors {
    fn from(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self(errors)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.values().flatten().map(String::as_str).collect();
        write!(f, "{}", messages.join(" "))
    }
}

/// Outcome of one validation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: ValidationErrors,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            valid: true,
            errors: ValidationErrors::new(),
        }
    }

    pub fn failed(errors: ValidationErrors) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Options passed to the validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOptions {
    /// Name of the rule set to apply
    pub rule: String,
}

impl ValidationOptions {
    pub fn new(rule: impl Into<String>) -> Self {
        Self { rule: rule.into() }
    }
}

/// Pass/fail check of input data under a named rule set
pub trait Validator: Send + Sync {
    fn validate(&self, data: &Record, options: &ValidationOptions) -> ValidationResult;
}

impl<F> Validator for F
where
    F: Fn(&Record, &ValidationOptions) -> ValidationResult + Send + Sync,
{
    fn validate(&self, data: &Record, options: &ValidationOptions) -> ValidationResult {
        self(data, options)
    }
}

/// Which rule set a mutating call validates under
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Rule {
    /// The configured default rule
    #[default]
    Default,
    /// A specific rule set
    Named(String),
    /// No validation at all
    Skip,
}

impl Rule {
    /// Rule set name to validate under, or `None` to skip validation
    pub fn resolve<'a>(&'a self, default_rule: &'a str) -> Option<&'a str> {
        match self {
            Self::Default => Some(default_rule),
            Self::Named(name) => Some(name),
            Self::Skip => None,
        }
    }
}

impl From<&str> for Rule {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Rule {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl<R: Into<Rule>> From<Option<R>> for Rule {
    fn from(rule: Option<R>) -> Self {
        rule.map_or(Self::Skip, Into::into)
    }
}

/// Runs validation ahead of writes and retains the last failure's errors
pub struct ValidationGate {
    validator: Option<Box<dyn Validator>>,
    default_rule: String,
    errors: ValidationErrors,
}

impl ValidationGate {
    pub fn new(default_rule: impl Into<String>) -> Self {
        Self {
            validator: None,
            default_rule: default_rule.into(),
            errors: ValidationErrors::new(),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn set_validator(&mut self, validator: Box<dyn Validator>) {
        self.validator = Some(validator);
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    pub fn default_rule(&self) -> &str {
        &self.default_rule
    }

    pub fn set_default_rule(&mut self, rule: impl Into<String>) {
        self.default_rule = rule.into();
    }

    /// Validate `data` under `rule`
    ///
    /// Returns true when the rule is skipped or the data passes. A missing
    /// validator passes everything. On failure the validator's errors replace
    /// the stored ones.
    pub fn validate_for(&mut self, rule: &Rule, data: &Record) -> bool {
        let Some(rule_name) = rule.resolve(&self.default_rule) else {
            debug!("Validation skipped");
            return true;
        };

        let Some(validator) = self.validator.as_ref() else {
            debug!(rule = rule_name, "No validator configured, accepting data");
            return true;
        };

        let result = validator.validate(data, &ValidationOptions::new(rule_name));
        if result.valid {
            return true;
        }

        warn!(
            rule = rule_name,
            fields = ?result.errors.fields().collect::<Vec<_>>(),
            "Validation failed"
        );
        self.errors = result.errors;
        false
    }

    /// Errors of the most recent failed validation
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn set_errors(&mut self, errors: ValidationErrors) {
        self.errors = errors;
    }

    pub fn take_errors(&mut self) -> ValidationErrors {
        std::mem::take(&mut self.errors)
    }
}

impl fmt::Debug for ValidationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationGate")
            .field("has_validator", &self.validator.is_some())
            .field("default_rule", &self.default_rule)
            .field("errors", &self.errors)
            .finish()
    }
}

/// A single parsed field constraint
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Required,
    Nullable,
    String,
    Numeric,
    Integer,
    Boolean,
    Array,
    Min(f64),
    Max(f64),
    In(Vec<String>),
}

impl Constraint {
    /// Parse one `name[:args]` constraint
    pub fn parse(raw: &str) -> RepositoryResult<Self> {
        let (name, args) = match raw.split_once(':') {
            Some((name, args)) => (name.trim(), Some(args.trim())),
            None => (raw.trim(), None),
        };

        let bound = |args: Option<&str>| -> RepositoryResult<f64> {
            args.and_then(|a| a.parse::<f64>().ok()).ok_or_else(|| {
                RepositoryError::validation_failed(format!(
                    "constraint '{}' needs a numeric argument",
                    raw
                ))
            })
        };

        match name {
            "required" => Ok(Self::Required),
            "nullable" => Ok(Self::Nullable),
            "string" => Ok(Self::String),
            "numeric" => Ok(Self::Numeric),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            "min" => Ok(Self::Min(bound(args)?)),
            "max" => Ok(Self::Max(bound(args)?)),
            "in" => Ok(Self::In(
                args.unwrap_or_default()
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )),
            _ => Err(RepositoryError::validation_failed(format!(
                "unknown constraint '{}'",
                raw
            ))),
        }
    }

    /// Parse a pipe-separated constraint string
    pub fn parse_list(raw: &str) -> RepositoryResult<Vec<Self>> {
        raw.split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Field name to constraint string for one rule
pub type RuleSet = BTreeMap<String, String>;

/// Builder collecting raw rule sets before parsing
#[derive(Debug, Clone, Default)]
pub struct RuleValidatorBuilder {
    rules: BTreeMap<String, RuleSet>,
}

impl RuleValidatorBuilder {
    #[must_use]
    pub fn with_rule(
        mut self,
        rule: impl Into<String>,
        field: impl Into<String>,
        constraints: impl Into<String>,
    ) -> Self {
        self.rules
            .entry(rule.into())
            .or_default()
            .insert(field.into(), constraints.into());
        self
    }

    #[must_use]
    pub fn with_rule_set(mut self, rule: impl Into<String>, set: RuleSet) -> Self {
        self.rules.entry(rule.into()).or_default().extend(set);
        self
    }

    /// Parse every constraint string
    pub fn build(self) -> RepositoryResult<RuleValidator> {
        let mut rules = BTreeMap::new();
        for (rule, set) in self.rules {
            let mut fields = BTreeMap::new();
            for (field, raw) in set {
                let constraints = Constraint::parse_list(&raw).map_err(|e| {
                    RepositoryError::validation_failed(format!(
                        "rule '{}', field '{}': {}",
                        rule, field, e.message
                    ))
                })?;
                fields.insert(field, constraints);
            }
            rules.insert(rule, fields);
        }
        Ok(RuleValidator { rules })
    }
}

/// Validator backed by named rule sets of field constraints
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    rules: BTreeMap<String, BTreeMap<String, Vec<Constraint>>>,
}

impl RuleValidator {
    pub fn builder() -> RuleValidatorBuilder {
        RuleValidatorBuilder::default()
    }

    /// Build from already collected rule sets
    pub fn from_rules(rules: &BTreeMap<String, RuleSet>) -> RepositoryResult<Self> {
        rules
            .iter()
            .fold(RuleValidatorBuilder::default(), |builder, (rule, set)| {
                builder.with_rule_set(rule.clone(), set.clone())
            })
            .build()
    }

    pub fn has_rule(&self, rule: &str) -> bool {
        self.rules.contains_key(rule)
    }

    fn check_field(field: &str, value: Option<&Value>, constraints: &[Constraint]) -> Vec<String> {
        let label = field.replace('_', " ");
        let missing = value.map_or(true, Value::is_blank);

        if missing {
            if constraints.contains(&Constraint::Required) {
                return vec![format!("The {} field is required.", label)];
            }
            return Vec::new();
        }
        let Some(value) = value else {
            return Vec::new();
        };

        let numeric_context = constraints
            .iter()
            .any(|c| matches!(c, Constraint::Numeric | Constraint::Integer));

        let mut messages = Vec::new();
        for constraint in constraints {
            let message = match constraint {
                Constraint::Required | Constraint::Nullable => None,
                Constraint::String => (!matches!(value, Value::String(_)))
                    .then(|| format!("The {} must be a string.", label)),
                Constraint::Numeric => value
                    .as_f64()
                    .is_none()
                    .then(|| format!("The {} must be a number.", label)),
                Constraint::Integer => (!is_integer(value))
                    .then(|| format!("The {} must be an integer.", label)),
                Constraint::Boolean => (!is_boolean(value))
                    .then(|| format!("The {} field must be true or false.", label)),
                Constraint::Array => (!matches!(value, Value::List(_) | Value::Map(_)))
                    .then(|| format!("The {} must be an array.", label)),
                Constraint::Min(min) => match measure(value, numeric_context) {
                    Some(Size::Number(n)) if n < *min => {
                        Some(format!("The {} must be at least {}.", label, number(*min)))
                    }
                    Some(Size::Chars(n)) if (n as f64) < *min => Some(format!(
                        "The {} must be at least {} characters.",
                        label,
                        number(*min)
                    )),
                    Some(Size::Items(n)) if (n as f64) < *min => Some(format!(
                        "The {} must have at least {} items.",
                        label,
                        number(*min)
                    )),
                    _ => None,
                },
                Constraint::Max(max) => match measure(value, numeric_context) {
                    Some(Size::Number(n)) if n > *max => Some(format!(
                        "The {} may not be greater than {}.",
                        label,
                        number(*max)
                    )),
                    Some(Size::Chars(n)) if (n as f64) > *max => Some(format!(
                        "The {} may not be greater than {} characters.",
                        label,
                        number(*max)
                    )),
                    Some(Size::Items(n)) if (n as f64) > *max => Some(format!(
                        "The {} may not have more than {} items.",
                        label,
                        number(*max)
                    )),
                    _ => None,
                },
                Constraint::In(allowed) => (!allowed.contains(&value.to_text()))
                    .then(|| format!("The selected {} is invalid.", label)),
            };
            messages.extend(message);
        }
        messages
    }
}

impl Validator for RuleValidator {
    fn validate(&self, data: &Record, options: &ValidationOptions) -> ValidationResult {
        let Some(fields) = self.rules.get(&options.rule) else {
            debug!(rule = %options.rule, "No rule set with this name, accepting data");
            return ValidationResult::passed();
        };

        let mut errors = ValidationErrors::new();
        for (field, constraints) in fields {
            for message in Self::check_field(field, data.get(field), constraints) {
                errors.add(field.clone(), message);
            }
        }

        if errors.is_empty() {
            ValidationResult::passed()
        } else {
            ValidationResult::failed(errors)
        }
    }
}

enum Size {
    Number(f64),
    Chars(usize),
    Items(usize),
}

fn measure(value: &Value, numeric_context: bool) -> Option<Size> {
    match value {
        Value::Integer(n) => Some(Size::Number(*n as f64)),
        Value::Float(f) => Some(Size::Number(*f)),
        Value::String(s) if numeric_context => s.trim().parse().ok().map(Size::Number),
        Value::String(s) => Some(Size::Chars(s.chars().count())),
        Value::List(items) => Some(Size::Items(items.len())),
        Value::Map(entries) => Some(Size::Items(entries.len())),
        Value::Null | Value::Boolean(_) => None,
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Integer(_) => true,
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_boolean(value: &Value) -> bool {
    match value {
        Value::Boolean(_) => true,
        Value::Integer(n) => *n == 0 || *n == 1,
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    }
}

fn number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;

    fn record(entries: Vec<(&str, Value)>) -> Record {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn validator() -> RuleValidator {
        RuleValidator::builder()
            .with_rule("default", "title", "required|string|min:3|max:10")
            .with_rule("default", "views", "nullable|integer|min:0")
            .with_rule("default", "status", "in:draft,published")
            .with_rule("default", "tags", "array|max:2")
            .with_rule("strict", "title", "required")
            .with_rule("strict", "author_id", "required|numeric")
            .build()
            .unwrap()
    }

    #[test]
    fn test_rule_resolution() {
        assert_eq!(Rule::Default.resolve("default"), Some("default"));
        assert_eq!(Rule::from("admin").resolve("default"), Some("admin"));
        assert_eq!(Rule::Skip.resolve("default"), None);
        assert_eq!(Rule::from(None::<&str>), Rule::Skip);
        assert_eq!(Rule::from(Some("x")), Rule::Named("x".into()));
    }

    #[test]
    fn test_valid_data_passes() {
        let data = record(vec![
            ("title", "Hello".into()),
            ("views", 10.into()),
            ("status", "draft".into()),
            ("tags", vec!["a"].into()),
        ]);
        let result = validator().validate(&data, &ValidationOptions::new("default"));
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_messages_per_constraint() {
        let data = record(vec![
            ("title", "Hi".into()),
            ("views", "many".into()),
            ("status", "archived".into()),
            ("tags", vec!["a", "b", "c"].into()),
        ]);
        let result = validator().validate(&data, &ValidationOptions::new("default"));
        assert!(!result.valid);
        assert_eq!(
            result.errors.first("title"),
            Some("The title must be at least 3 characters.")
        );
        assert_eq!(
            result.errors.first("views"),
            Some("The views must be an integer.")
        );
        assert_eq!(
            result.errors.first("status"),
            Some("The selected status is invalid.")
        );
        assert_eq!(
            result.errors.first("tags"),
            Some("The tags may not have more than 2 items.")
        );
    }

    #[test]
    fn test_required_and_underscored_label() {
        let data = record(vec![("title", "  ".into())]);
        let result = validator().validate(&data, &ValidationOptions::new("strict"));
        assert_eq!(
            result.errors.first("title"),
            Some("The title field is required.")
        );
        assert_eq!(
            result.errors.first("author_id"),
            Some("The author id field is required.")
        );
    }

    #[test]
    fn test_absent_optional_fields_are_skipped() {
        let data = record(vec![("title", "Hello".into()), ("views", Value::Null)]);
        let result = validator().validate(&data, &ValidationOptions::new("default"));
        assert!(result.valid);
    }

    #[test]
    fn test_numeric_min_uses_value() {
        let data = record(vec![("title", "Hello".into()), ("views", (-1).into())]);
        let result = validator().validate(&data, &ValidationOptions::new("default"));
        assert_eq!(
            result.errors.first("views"),
            Some("The views must be at least 0.")
        );
    }

    #[test]
    fn test_unknown_rule_set_passes() {
        let result = validator().validate(&Record::new(), &ValidationOptions::new("missing"));
        assert!(result.valid);
    }

    #[test]
    fn test_unknown_constraint_fails_build() {
        let err = RuleValidator::builder()
            .with_rule("default", "title", "required|shiny")
            .build()
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
        assert!(err.message.contains("shiny"));
        assert!(Constraint::parse("max:abc").is_err());
    }

    #[test]
    fn test_gate_without_validator_passes() {
        let mut gate = ValidationGate::new("default");
        assert!(gate.validate_for(&Rule::Default, &Record::new()));
        assert!(gate.errors().is_empty());
    }

    #[test]
    fn test_gate_skip_bypasses_validator() {
        let mut gate = ValidationGate::new("default")
            .with_validator(|_: &Record, _: &ValidationOptions| {
                let mut errors = ValidationErrors::new();
                errors.add("any", "always fails");
                ValidationResult::failed(errors)
            });
        assert!(gate.validate_for(&Rule::Skip, &Record::new()));
        assert!(!gate.validate_for(&Rule::Default, &Record::new()));
        assert_eq!(gate.errors().first("any"), Some("always fails"));
    }

    #[test]
    fn test_gate_passes_rule_name_through() {
        let mut gate = ValidationGate::new("default").with_validator(
            |_: &Record, options: &ValidationOptions| {
                if options.rule == "admin" {
                    ValidationResult::passed()
                } else {
                    let mut errors = ValidationErrors::new();
                    errors.add("rule", options.rule.clone());
                    ValidationResult::failed(errors)
                }
            },
        );
        assert!(gate.validate_for(&Rule::from("admin"), &Record::new()));
        assert!(!gate.validate_for(&Rule::Default, &Record::new()));
        assert_eq!(gate.errors().first("rule"), Some("default"));
    }

    #[test]
    fn test_gate_errors_are_overwritable() {
        let mut gate = ValidationGate::new("default");
        let mut errors = ValidationErrors::new();
        errors.add("name", "taken");
        gate.set_errors(errors.clone());
        assert_eq!(gate.errors(), &errors);
        assert_eq!(gate.take_errors(), errors);
        assert!(gate.errors().is_empty());
    }

    #[test]
    fn test_errors_display_joins_messages() {
        let mut errors = ValidationErrors::new();
        errors.add("a", "First.");
        errors.add("b", "Second.");
        assert_eq!(errors.to_string(), "First. Second.");
    }
}
