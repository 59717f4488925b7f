//! Error types for routegrid document stores.

use thiserror::Error;

use crate::document::Version;

/// Result type alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The presented version no longer matches the stored one: another writer
    /// committed first.
    #[error("version conflict on '{key}': expected {expected:?}, found {actual:?}")]
    VersionConflict {
        key: String,
        expected: Option<Version>,
        actual: Option<Version>,
    },

    /// Transport or storage failure. Retrying later may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// The stored bytes do not form a valid coordination document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid document json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("routing entry stored under '{key}' names resource '{resource_id}'")]
    KeyMismatch { key: String, resource_id: String },

    #[error("empty identifier in {0}")]
    EmptyIdentifier(&'static str),
}
