//! In-memory document store with fault injection.
//!
//! Clones share the same underlying map, so several coordinators in one test
//! can race on a single document exactly as separate processes would race on
//! a shared store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::document::{DocumentStore, StoredDocument, Version};
use crate::error::{StoreError, StoreResult};

/// One-shot faults, each consumed by the next matching call.
#[derive(Debug, Default, Clone)]
pub struct FaultConfig {
    /// Next `get` fails with `Unavailable`.
    pub force_get_fail: bool,
    /// Next `put` fails with `Unavailable`.
    pub force_put_fail: bool,
    /// Next `put` fails with `VersionConflict` regardless of the version.
    pub force_put_conflict: bool,
    /// While set, every call fails with `Unavailable`.
    pub offline: bool,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<String, StoredDocument>,
    faults: FaultConfig,
    primary_term: u64,
    puts: u64,
}

#[derive(Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                primary_term: 1,
                ..Inner::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_next_get(&self) {
        self.lock().faults.force_get_fail = true;
    }

    pub fn fail_next_put(&self) {
        self.lock().faults.force_put_fail = true;
    }

    pub fn conflict_next_put(&self) {
        self.lock().faults.force_put_conflict = true;
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().faults.offline = offline;
    }

    /// Overwrite the stored body without a version check, bumping the version.
    ///
    /// Used to plant corrupt or foreign documents.
    pub fn overwrite(&self, key: &str, body: Vec<u8>) -> Version {
        let mut inner = self.lock();
        let seq_no = inner
            .documents
            .get(key)
            .map_or(0, |doc| doc.version.seq_no + 1);
        let version = Version::new(seq_no, inner.primary_term);
        inner
            .documents
            .insert(key.to_string(), StoredDocument { body, version });
        version
    }

    /// Raw stored document, bypassing fault injection.
    pub fn peek(&self, key: &str) -> Option<StoredDocument> {
        self.lock().documents.get(key).cloned()
    }

    /// Number of successful writes so far.
    pub fn put_count(&self) -> u64 {
        self.lock().puts
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredDocument>> {
        let mut inner = self.lock();
        if inner.faults.offline {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        if inner.faults.force_get_fail {
            inner.faults.force_get_fail = false;
            return Err(StoreError::Unavailable(
                "simulated read failure (forced)".to_string(),
            ));
        }
        Ok(inner.documents.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        if_version: Option<Version>,
    ) -> StoreResult<Version> {
        let mut inner = self.lock();
        if inner.faults.offline {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        if inner.faults.force_put_fail {
            inner.faults.force_put_fail = false;
            return Err(StoreError::Unavailable(
                "simulated write failure (forced)".to_string(),
            ));
        }

        let current = inner.documents.get(key).map(|doc| doc.version);
        if inner.faults.force_put_conflict || current != if_version {
            inner.faults.force_put_conflict = false;
            return Err(StoreError::VersionConflict {
                key: key.to_string(),
                expected: if_version,
                actual: current,
            });
        }

        let version = Version::new(current.map_or(0, |v| v.seq_no + 1), inner.primary_term);
        inner
            .documents
            .insert(key.to_string(), StoredDocument { body, version });
        inner.puts += 1;
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_documents() {
        let a = MemoryDocumentStore::new();
        let b = a.clone();
        let v = a.put("k", b"x".to_vec(), None).await.unwrap();
        assert_eq!(b.get("k").await.unwrap().unwrap().version, v);
    }

    #[tokio::test]
    async fn forced_faults_fire_once() {
        let store = MemoryDocumentStore::new();
        store.fail_next_get();
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(store.get("k").await.unwrap().is_none());

        store.fail_next_put();
        assert!(matches!(
            store.put("k", b"x".to_vec(), None).await,
            Err(StoreError::Unavailable(_))
        ));
        store.put("k", b"x".to_vec(), None).await.unwrap();
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn forced_conflict_ignores_matching_version() {
        let store = MemoryDocumentStore::new();
        let v0 = store.put("k", b"x".to_vec(), None).await.unwrap();
        store.conflict_next_put();
        let err = store.put("k", b"y".to_vec(), Some(v0)).await.unwrap_err();
        assert!(err.is_conflict());
        store.put("k", b"y".to_vec(), Some(v0)).await.unwrap();
    }

    #[tokio::test]
    async fn offline_blocks_everything_until_restored() {
        let store = MemoryDocumentStore::new();
        store.set_offline(true);
        assert!(store.get("k").await.is_err());
        assert!(store.put("k", b"x".to_vec(), None).await.is_err());
        store.set_offline(false);
        assert!(store.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn overwrite_invalidates_held_versions() {
        let store = MemoryDocumentStore::new();
        let v0 = store.put("k", b"x".to_vec(), None).await.unwrap();
        let v1 = store.overwrite("k", b"garbage".to_vec());
        assert_ne!(v0, v1);
        assert!(store.put("k", b"y".to_vec(), Some(v0)).await.unwrap_err().is_conflict());
        assert_eq!(store.peek("k").unwrap().body, b"garbage");
    }
}
