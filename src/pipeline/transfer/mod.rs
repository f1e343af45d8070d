//! Batch transfer: queue validated files, then push each one to a storage
//! sink and register its metadata, isolating failures per item.
//!
//! Lifecycle of an item: Pending → Transferring → Persisted | Failed.

pub mod orchestrator;
pub mod queue;
pub mod traits;
pub mod types;

pub use orchestrator::*;
pub use queue::*;
pub use traits::*;
pub use types::*;

use serde::Serialize;
use thiserror::Error;

use crate::models::ItemStatus;
use crate::pipeline::cancel::Interruption;

/// Why a single item failed to transfer. Recorded on the item; never aborts
/// the batch.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransferError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Storage rejected the file: {0}")]
    StorageRejected(String),

    #[error("Registry rejected the record: {0}")]
    RegistryRejected(String),

    #[error("Transfer interrupted: {0}")]
    Cancelled(Interruption),

    #[error("Invalid item state: {0}")]
    InvalidState(#[from] InvalidTransition),
}

impl TransferError {
    /// Classify a storage sink failure.
    pub fn from_sink(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Network(msg) => Self::NetworkFailure(msg),
            CollaboratorError::Rejected(msg) => Self::StorageRejected(msg),
        }
    }

    /// Classify a metadata registry failure.
    pub fn from_registry(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Network(msg) => Self::NetworkFailure(msg),
            CollaboratorError::Rejected(msg) => Self::RegistryRejected(msg),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NetworkFailure(_) => "network_failure",
            Self::StorageRejected(_) => "storage_rejected",
            Self::RegistryRejected(_) => "registry_rejected",
            Self::Cancelled(_) => "cancelled",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("cannot move item from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ItemStatus,
    pub to: ItemStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_and_registry_rejections_classify_differently() {
        let sink = TransferError::from_sink(CollaboratorError::Rejected("quota".into()));
        let registry = TransferError::from_registry(CollaboratorError::Rejected("quota".into()));
        assert_eq!(sink.kind(), "storage_rejected");
        assert_eq!(registry.kind(), "registry_rejected");
    }

    #[test]
    fn network_failures_classify_the_same_from_either_side() {
        let a = TransferError::from_sink(CollaboratorError::Network("reset".into()));
        let b = TransferError::from_registry(CollaboratorError::Network("reset".into()));
        assert_eq!(a, b);
    }

    #[test]
    fn serializes_with_kind_and_detail() {
        let json =
            serde_json::to_value(TransferError::Cancelled(Interruption::DeadlineExceeded)).unwrap();
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["detail"], "deadline_exceeded");
    }
}
