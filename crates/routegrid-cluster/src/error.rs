//! Coordinator error types.

use thiserror::Error;

use routegrid_state::{NodeId, ResourceId, SchemaError, StoreError, Version};

use crate::coordinator::CoordinatorStatus;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors surfaced by [`ClusterCoordinator`](crate::ClusterCoordinator).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// `setup` has not been called.
    #[error("coordinator is not set up")]
    NotReady,

    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("malformed coordination document: {0}")]
    MalformedDocument(#[from] SchemaError),

    /// Another writer committed between our read and our write.
    #[error("version conflict: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        expected: Option<Version>,
        actual: Option<Version>,
    },

    #[error("resource '{resource_id}' is already assigned to {owner}")]
    AlreadyAssigned { resource_id: ResourceId, owner: NodeId },

    /// Mutations are refused while the cached view cannot be trusted.
    #[error("coordinator cannot accept mutations while {0}")]
    InvalidCoordinatorState(CoordinatorStatus),
}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionConflict {
                expected, actual, ..
            } => CoordinatorError::VersionConflict { expected, actual },
            StoreError::Unavailable(msg) => CoordinatorError::StoreUnavailable(msg),
        }
    }
}

impl CoordinatorError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoordinatorError::VersionConflict { .. })
    }
}
