//! routegrid-cluster — peer coordination over a single shared document.
//!
//! Lets independent processes share one routing table of resources to owning
//! nodes without talking to each other. The only medium is a versioned
//! document in a [`DocumentStore`](routegrid_state::DocumentStore) that
//! accepts conditional writes.
//!
//! # Architecture
//!
//! ```text
//! ClusterCoordinator (one per process)
//!   ├── node_id            random UUID, fixed for the process lifetime
//!   ├── DocumentAccess     read → (document, version), write(document, version)
//!   ├── Ticker             heartbeat loop, cancellable through one handle
//!   │   └── reconcile()    read → evict expired peers → stamp heartbeat → write
//!   ├── routing cache      lookup() / routing_snapshot(), served synchronously
//!   ├── assign/unassign    read → check → mutate → write, conflicts surfaced
//!   └── settings task      watch stream → Timing (floor + jitter)
//! ```
//!
//! # Failure handling
//!
//! A version conflict during a heartbeat cycle is expected when nodes race and
//! is retried on the next tick. Any other store or decode failure marks the
//! coordinator invalid: lookups keep serving the last known table, but
//! `assign`/`unassign` are refused until a read succeeds again.

pub mod access;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod ticker;
pub mod timing;

pub use access::DocumentAccess;
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{ClusterCoordinator, CoordinatorBuilder, CoordinatorStatus, CycleOutcome};
pub use error::{CoordinatorError, CoordinatorResult};
pub use ticker::Ticker;
pub use timing::{jitter, Timing, JITTER_MAX, JITTER_MIN, UPDATE_FLOOR};
