//! The document store interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Optimistic concurrency token returned on every read.
///
/// `seq_no` grows with every committed write; `primary_term` changes when the
/// store's primary changes (for the redb store: every time it is reopened).
/// Callers treat the pair as opaque and hand it back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub seq_no: u64,
    pub primary_term: u64,
}

impl Version {
    pub fn new(seq_no: u64, primary_term: u64) -> Self {
        Self {
            seq_no,
            primary_term,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.seq_no, self.primary_term)
    }
}

/// A document body as stored, with the version it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub body: Vec<u8>,
    pub version: Version,
}

/// Key-addressed store with conditional writes.
///
/// Implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the document stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`](crate::StoreError::Unavailable) on
    /// transport or storage failure. A missing document is `Ok(None)`.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredDocument>>;

    /// Store `body` under `key` if the current version equals `if_version`.
    ///
    /// `if_version = None` means "create": it succeeds only if no document
    /// exists yet. Returns the version of the newly stored body.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::VersionConflict`](crate::StoreError::VersionConflict)
    /// if another writer committed first, `Unavailable` otherwise.
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        if_version: Option<Version>,
    ) -> StoreResult<Version>;
}
