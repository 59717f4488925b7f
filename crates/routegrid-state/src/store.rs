//! RedbDocumentStore — durable document store backed by redb.
//!
//! Bodies and versions live in separate tables and are updated together in a
//! single write transaction, so the version check and the write commit
//! atomically. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::document::{DocumentStore, StoredDocument, Version};
use crate::error::{StoreError, StoreResult};
use crate::tables::*;

/// Every redb failure is a storage outage from the coordinator's point of view.
fn unavailable<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct RedbDocumentStore {
    db: Arc<Database>,
    primary_term: u64,
}

impl RedbDocumentStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// Each open starts a new primary term.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(unavailable)?;
        let store = Self::init(db)?;
        debug!(?path, primary_term = store.primary_term, "document store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(unavailable)?;
        let store = Self::init(db)?;
        debug!("in-memory document store opened");
        Ok(store)
    }

    /// The primary term stamped on versions written through this handle.
    pub fn primary_term(&self) -> u64 {
        self.primary_term
    }

    /// Create all tables if absent and claim the next primary term.
    fn init(db: Database) -> StoreResult<Self> {
        let txn = db.begin_write().map_err(unavailable)?;
        let primary_term;
        {
            txn.open_table(DOCUMENTS).map_err(unavailable)?;
            txn.open_table(VERSIONS).map_err(unavailable)?;
            let mut meta = txn.open_table(META).map_err(unavailable)?;
            let previous = meta
                .get(PRIMARY_TERM_KEY)
                .map_err(unavailable)?
                .map(|guard| guard.value())
                .unwrap_or(0);
            primary_term = previous + 1;
            meta.insert(PRIMARY_TERM_KEY, primary_term)
                .map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)?;
        Ok(Self {
            db: Arc::new(db),
            primary_term,
        })
    }

    fn get_sync(&self, key: &str) -> StoreResult<Option<StoredDocument>> {
        let txn = self.db.begin_read().map_err(unavailable)?;
        let versions = txn.open_table(VERSIONS).map_err(unavailable)?;
        let Some((seq_no, primary_term)) = versions
            .get(key)
            .map_err(unavailable)?
            .map(|guard| guard.value())
        else {
            return Ok(None);
        };

        let documents = txn.open_table(DOCUMENTS).map_err(unavailable)?;
        let body = documents
            .get(key)
            .map_err(unavailable)?
            .map(|guard| guard.value().to_vec())
            .ok_or_else(|| {
                StoreError::Unavailable(format!("document '{key}' has a version but no body"))
            })?;

        Ok(Some(StoredDocument {
            body,
            version: Version::new(seq_no, primary_term),
        }))
    }

    fn put_sync(
        &self,
        key: &str,
        body: &[u8],
        if_version: Option<Version>,
    ) -> StoreResult<Version> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        let next;
        {
            let mut versions = txn.open_table(VERSIONS).map_err(unavailable)?;
            let current = versions
                .get(key)
                .map_err(unavailable)?
                .map(|guard| {
                    let (seq_no, primary_term) = guard.value();
                    Version::new(seq_no, primary_term)
                });

            if current != if_version {
                // Dropping the uncommitted transaction aborts it.
                return Err(StoreError::VersionConflict {
                    key: key.to_string(),
                    expected: if_version,
                    actual: current,
                });
            }

            next = Version::new(current.map_or(0, |v| v.seq_no + 1), self.primary_term);
            versions
                .insert(key, (next.seq_no, next.primary_term))
                .map_err(unavailable)?;

            let mut documents = txn.open_table(DOCUMENTS).map_err(unavailable)?;
            documents.insert(key, body).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)?;
        debug!(%key, version = %next, "document stored");
        Ok(next)
    }
}

#[async_trait]
impl DocumentStore for RedbDocumentStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredDocument>> {
        self.get_sync(key)
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        if_version: Option<Version>,
    ) -> StoreResult<Version> {
        self.put_sync(key, &body, if_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "routing-table";

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = RedbDocumentStore::open_in_memory().unwrap();
        assert!(store.get(KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_then_read_back() {
        let store = RedbDocumentStore::open_in_memory().unwrap();
        let version = store.put(KEY, b"{}".to_vec(), None).await.unwrap();
        assert_eq!(version, Version::new(0, store.primary_term()));

        let stored = store.get(KEY).await.unwrap().unwrap();
        assert_eq!(stored.body, b"{}");
        assert_eq!(stored.version, version);
    }

    #[tokio::test]
    async fn create_fails_when_document_exists() {
        let store = RedbDocumentStore::open_in_memory().unwrap();
        let v0 = store.put(KEY, b"a".to_vec(), None).await.unwrap();

        let err = store.put(KEY, b"b".to_vec(), None).await.unwrap_err();
        match err {
            StoreError::VersionConflict { expected, actual, .. } => {
                assert_eq!(expected, None);
                assert_eq!(actual, Some(v0));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected_and_body_kept() {
        let store = RedbDocumentStore::open_in_memory().unwrap();
        let v0 = store.put(KEY, b"first".to_vec(), None).await.unwrap();
        let v1 = store.put(KEY, b"second".to_vec(), Some(v0)).await.unwrap();
        assert_eq!(v1.seq_no, v0.seq_no + 1);

        let err = store.put(KEY, b"lost".to_vec(), Some(v0)).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get(KEY).await.unwrap().unwrap();
        assert_eq!(stored.body, b"second");
        assert_eq!(stored.version, v1);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = RedbDocumentStore::open_in_memory().unwrap();
        store.put("a", b"1".to_vec(), None).await.unwrap();
        store.put("b", b"2".to_vec(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().unwrap().body, b"1");
        assert_eq!(store.get("b").await.unwrap().unwrap().body, b"2");
    }

    #[tokio::test]
    async fn persistence_survives_reopen_with_new_term() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("routes.redb");

        let (v0, first_term) = {
            let store = RedbDocumentStore::open(&db_path).unwrap();
            let v0 = store.put(KEY, b"kept".to_vec(), None).await.unwrap();
            (v0, store.primary_term())
        };

        let store = RedbDocumentStore::open(&db_path).unwrap();
        assert_eq!(store.primary_term(), first_term + 1);

        let stored = store.get(KEY).await.unwrap().unwrap();
        assert_eq!(stored.body, b"kept");
        assert_eq!(stored.version, v0);

        // Writes after reopen carry the new term.
        let v1 = store.put(KEY, b"next".to_vec(), Some(v0)).await.unwrap();
        assert_eq!(v1, Version::new(v0.seq_no + 1, first_term + 1));
    }
}
