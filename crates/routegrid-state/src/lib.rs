//! routegrid-state — the shared coordination document and where it lives.
//!
//! Every routegrid node reads and rewrites one JSON document holding node
//! heartbeats and the resource routing table. Stores hand out a
//! `(seq_no, primary_term)` [`Version`] on every read and accept a write only
//! if the caller presents the version currently stored, which is the sole
//! synchronisation primitive between nodes.
//!
//! # Architecture
//!
//! ```text
//! CoordinationDocument (types.rs)
//!   ├── nodes:         node_id     → NodeHeartbeat
//!   └── routing_table: resource_id → RoutingEntry
//!
//! DocumentStore (document.rs, async trait)
//!   ├── RedbDocumentStore   — durable, redb-backed (store.rs)
//!   └── MemoryDocumentStore — in-process, fault injection for tests (memory.rs)
//! ```
//!
//! Stores deal in raw bytes; [`CoordinationDocument::decode`] owns schema
//! validation so a corrupt document surfaces as a [`SchemaError`] rather than
//! a partially populated map.

pub mod document;
pub mod error;
pub mod memory;
pub mod store;
pub mod tables;
pub mod types;

pub use document::{DocumentStore, StoredDocument, Version};
pub use error::{SchemaError, StoreError, StoreResult};
pub use memory::MemoryDocumentStore;
pub use store::RedbDocumentStore;
pub use types::*;
