//! Typed read/write of the coordination document through a [`DocumentStore`].

use std::sync::Arc;

use routegrid_state::{CoordinationDocument, DocumentStore, Version};

use crate::error::CoordinatorResult;

/// A store handle bound to the one key holding the coordination document.
#[derive(Clone)]
pub struct DocumentAccess {
    store: Arc<dyn DocumentStore>,
    key: String,
}

impl DocumentAccess {
    pub fn new(store: Arc<dyn DocumentStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Read and validate the document.
    ///
    /// A document that was never written reads as empty with no version; the
    /// next write then only succeeds if nobody else created it first.
    pub async fn read(&self) -> CoordinatorResult<(CoordinationDocument, Option<Version>)> {
        match self.store.get(&self.key).await? {
            Some(stored) => {
                let doc = CoordinationDocument::decode(&stored.body)?;
                Ok((doc, Some(stored.version)))
            }
            None => Ok((CoordinationDocument::default(), None)),
        }
    }

    /// Write `doc` if the stored version still equals `version`.
    pub async fn write(
        &self,
        doc: &CoordinationDocument,
        version: Option<Version>,
    ) -> CoordinatorResult<Version> {
        let body = doc.encode()?;
        Ok(self.store.put(&self.key, body, version).await?)
    }
}
