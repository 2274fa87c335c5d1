//! Transaction boundaries
//!
//! Thin pass-through to the accessor's transaction primitives. Nesting,
//! retries and isolation are the accessor's business; faults come back exactly
//! as the accessor reported them.

use tracing::{info, warn};

use super::accessor::DataAccessor;
use super::error::RepositoryResult;
use super::service::ServiceModel;

impl<A: DataAccessor> ServiceModel<A> {
    pub async fn start_transaction(&self) -> RepositoryResult<()> {
        info!(table = self.metadata.table(), "Starting transaction");
        self.accessor
            .begin_transaction()
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to start transaction"))
    }

    pub async fn commit_transaction(&self) -> RepositoryResult<()> {
        info!(table = self.metadata.table(), "Committing transaction");
        self.accessor
            .commit_transaction()
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to commit transaction"))
    }

    pub async fn rollback_transaction(&self) -> RepositoryResult<()> {
        info!(table = self.metadata.table(), "Rolling back transaction");
        self.accessor
            .rollback_transaction()
            .await
            .inspect_err(|e| warn!(error = %e, "Failed to roll back transaction"))
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::test_support::{record, Call, RecordingAccessor};
    use crate::repository::{
        ModelDefinition, RepositoryErrorKind, RepositoryOperation, Rule, ServiceModel,
    };

    #[tokio::test]
    async fn test_transaction_calls_are_sequenced() {
        let mut model = ServiceModel::new(RecordingAccessor::default(), ModelDefinition::new("t"));
        model.start_transaction().await.unwrap();
        model
            .create(record(&[("name", "a".into())]), Rule::Skip)
            .await
            .unwrap();
        model.commit_transaction().await.unwrap();
        model.start_transaction().await.unwrap();
        model.rollback_transaction().await.unwrap();

        let calls = model.accessor().calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0], Call::Begin);
        assert!(matches!(calls[1], Call::Insert(_)));
        assert_eq!(calls[2], Call::Commit);
        assert_eq!(calls[3], Call::Begin);
        assert_eq!(calls[4], Call::Rollback);
    }

    #[tokio::test]
    async fn test_transaction_fault_is_passed_through() {
        let model = ServiceModel::new(
            RecordingAccessor::default().failing(),
            ModelDefinition::new("t"),
        );
        let err = model.commit_transaction().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::TransactionFault);
        assert_eq!(err.operation, RepositoryOperation::Transaction);
        assert_eq!(err.message, "accessor unavailable");
    }
}
