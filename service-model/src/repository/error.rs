//! Repository error types
//!
//! Structured errors for query composition, relation resolution and accessor
//! faults. Validation failures and missing update targets are not errors; they
//! are reported through [`SaveOutcome`](super::SaveOutcome).
//!
//! # Example
//!
//! ```rust
//! use service_model::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("users", "42");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Accumulating predicates or other directives
    BuildQuery,
    /// Translating relation directives into instructions
    ResolveRelations,
    /// Finding a single record by key
    Find,
    /// Fetching all matching records
    FindAll,
    /// Fetching the first matching record
    First,
    /// Fetching a page of records
    Paginate,
    /// Counting matching records
    Count,
    /// Inserting a record
    Create,
    /// Updating one or more records
    Update,
    /// Deleting records
    Delete,
    /// Incrementing or decrementing a column
    Adjust,
    /// Validating input data
    Validate,
    /// Begin, commit or rollback
    Transaction,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildQuery => write!(f, "build_query"),
            Self::ResolveRelations => write!(f, "resolve_relations"),
            Self::Find => write!(f, "find"),
            Self::FindAll => write!(f, "find_all"),
            Self::First => write!(f, "first"),
            Self::Paginate => write!(f, "paginate"),
            Self::Count => write!(f, "count"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Adjust => write!(f, "adjust"),
            Self::Validate => write!(f, "validate"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Record was not found
    NotFound,
    /// Validation failed before the write reached the accessor
    ValidationFailed,
    /// Between/in/condition arguments had the wrong arity or type
    InvalidPredicateShape,
    /// A relation directive named an operation with no clause behind it
    UnsupportedRelationOperation,
    /// A relation spec could not be interpreted at all
    InvalidRelationSpec,
    /// Begin, commit or rollback failed
    TransactionFault,
    /// Failed to connect to the data store
    ConnectionFailed,
    /// Operation timed out
    Timeout,
    /// Underlying data store error
    DatabaseError,
    /// Serialization or deserialization error
    SerializationError,
    /// Other unclassified error
    Other,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::InvalidPredicateShape => write!(f, "invalid_predicate_shape"),
            Self::UnsupportedRelationOperation => write!(f, "unsupported_relation_operation"),
            Self::InvalidRelationSpec => write!(f, "invalid_relation_spec"),
            Self::TransactionFault => write!(f, "transaction_fault"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DatabaseError => write!(f, "database_error"),
            Self::SerializationError => write!(f, "serialization_error"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Structured repository error with operation context
///
/// # Example
///
/// ```rust
/// use service_model::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::invalid_predicate_shape("between expects [low, high]");
/// assert!(!error.is_retriable());
///
/// let error = RepositoryError::database_error(RepositoryOperation::FindAll, "syntax error")
///     .with_entity("users", "*");
/// assert!(error.to_string().contains("[users: *]"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The record type involved (usually the table)
    pub entity_type: Option<String>,
    /// The key of the record involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::Find,
            kind: RepositoryErrorKind::NotFound,
            message: "Record not found".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
        }
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Validate,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Create an error for malformed between/in/condition arguments
    pub fn invalid_predicate_shape(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::BuildQuery,
            RepositoryErrorKind::InvalidPredicateShape,
            message,
        )
    }

    /// Create an error for a relation directive with no matching clause
    pub fn unsupported_relation_operation(name: impl AsRef<str>) -> Self {
        Self::new(
            RepositoryOperation::ResolveRelations,
            RepositoryErrorKind::UnsupportedRelationOperation,
            format!("Unsupported relation operation '{}'", name.as_ref()),
        )
    }

    /// Create an error for a relation spec that cannot be interpreted
    pub fn invalid_relation_spec(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::ResolveRelations,
            RepositoryErrorKind::InvalidRelationSpec,
            message,
        )
    }

    /// Create a transaction fault
    pub fn transaction_fault(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Transaction,
            RepositoryErrorKind::TransactionFault,
            message,
        )
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindAll,
            RepositoryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Create a data store error
    pub fn database_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::DatabaseError, message)
    }

    /// Create a serialization error
    pub fn serialization_error(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::SerializationError, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is transient
    ///
    /// This layer never retries; the flag is for callers that want to.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::ConnectionFailed | RepositoryErrorKind::Timeout
        )
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(ref entity_type), Some(ref entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::BuildQuery), "build_query");
        assert_eq!(
            format!("{}", RepositoryOperation::ResolveRelations),
            "resolve_relations"
        );
        assert_eq!(format!("{}", RepositoryOperation::FindAll), "find_all");
        assert_eq!(format!("{}", RepositoryOperation::Adjust), "adjust");
        assert_eq!(format!("{}", RepositoryOperation::Transaction), "transaction");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(
            format!("{}", RepositoryErrorKind::InvalidPredicateShape),
            "invalid_predicate_shape"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::UnsupportedRelationOperation),
            "unsupported_relation_operation"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::TransactionFault),
            "transaction_fault"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Other), "other");
    }

    #[test]
    fn test_unsupported_relation_operation_message() {
        let error = RepositoryError::unsupported_relation_operation("frobnicate");
        assert_eq!(error.operation, RepositoryOperation::ResolveRelations);
        assert_eq!(error.kind, RepositoryErrorKind::UnsupportedRelationOperation);
        assert!(error.message.contains("'frobnicate'"));
    }

    #[test]
    fn test_transaction_fault_convenience() {
        let error = RepositoryError::transaction_fault("commit failed");
        assert_eq!(error.operation, RepositoryOperation::Transaction);
        assert_eq!(error.kind, RepositoryErrorKind::TransactionFault);
    }

    #[test]
    fn test_with_entity_and_operation() {
        let error = RepositoryError::database_error(RepositoryOperation::Find, "boom")
            .with_entity("posts", "7")
            .with_operation(RepositoryOperation::Update);

        assert_eq!(error.operation, RepositoryOperation::Update);
        assert_eq!(error.entity_type, Some("posts".to_string()));
        assert_eq!(error.entity_id, Some("7".to_string()));
    }

    #[test]
    fn test_is_retriable() {
        assert!(RepositoryError::connection_failed("refused").is_retriable());
        assert!(RepositoryError::timeout(RepositoryOperation::Count, "slow").is_retriable());
        assert!(!RepositoryError::not_found("users", "1").is_retriable());
        assert!(!RepositoryError::invalid_predicate_shape("bad").is_retriable());
        assert!(!RepositoryError::transaction_fault("rollback").is_retriable());
    }

    #[test]
    fn test_display_without_entity() {
        let error = RepositoryError::invalid_relation_spec("expected a name");
        let display = error.to_string();
        assert!(display.contains("invalid_relation_spec"));
        assert!(display.contains("resolve_relations"));
        assert!(!display.contains('['));
    }

    #[test]
    fn test_display_with_entity() {
        let display = RepositoryError::not_found("users", "usr_123").to_string();
        assert!(display.contains("not_found"));
        assert!(display.contains("[users: usr_123]"));
    }
}
