//! ClusterCoordinator — shared routing table over one versioned document.
//!
//! Every node runs one coordinator. Nodes never talk to each other: each one
//! periodically reads the coordination document, evicts peers whose heartbeat
//! went stale (releasing the resources they owned), stamps its own heartbeat
//! and writes the document back under the version it read. A write that loses
//! the race fails with a version conflict and is simply retried on the next
//! cycle.
//!
//! Within a process, the heartbeat cycle and `assign`/`unassign` share a single
//! async mutex around read → mutate → write, so the version presented on a
//! write is always the one obtained by the read just before it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use routegrid_core::{CoordinatorSettings, SettingsReceiver, DEFAULT_DOCUMENT_KEY};
use routegrid_state::{
    CoordinationDocument, DocumentStore, NodeHeartbeat, NodeId, ResourceId, RouteState,
    RoutingEntry, RoutingTable, Version,
};

use crate::access::DocumentAccess;
use crate::clock::{Clock, SystemClock};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ticker::Ticker;
use crate::timing::Timing;

/// Health of the coordinator's view of the shared document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorStatus {
    /// `setup` not called yet.
    Uninitialized,
    /// Last store interaction succeeded (or lost a benign race).
    Valid,
    /// Last read or write failed; mutations are refused until a read succeeds.
    Invalid,
    /// `stop` was called.
    Stopped,
}

impl std::fmt::Display for CoordinatorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CoordinatorStatus::Uninitialized => "uninitialized",
            CoordinatorStatus::Valid => "valid",
            CoordinatorStatus::Invalid => "invalid",
            CoordinatorStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What one heartbeat cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Document written; lists the peers evicted in this cycle.
    Committed { evicted: Vec<NodeId> },
    /// Another writer won the race; nothing written.
    Conflict,
    ReadFailed,
    WriteFailed,
    /// Coordinator not set up, or stopped.
    Skipped,
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn slot<T>(lock: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the coordinator handle and its background tasks.
struct Inner {
    node_id: NodeId,
    document_key: String,
    clock: Arc<dyn Clock>,
    access: RwLock<Option<DocumentAccess>>,
    /// Last known document version. Holding this lock is the critical section
    /// around every read → mutate → write.
    version: tokio::sync::Mutex<Option<Version>>,
    routes: RwLock<RoutingTable>,
    nodes: RwLock<BTreeMap<NodeId, NodeHeartbeat>>,
    status: RwLock<CoordinatorStatus>,
    timing: RwLock<Timing>,
}

impl Inner {
    fn status(&self) -> CoordinatorStatus {
        *read_lock(&self.status)
    }

    fn set_status(&self, next: CoordinatorStatus) {
        let mut status = write_lock(&self.status);
        let previous = *status;
        if previous != next {
            debug!(node_id = %self.node_id, from = %previous, to = %next, "coordinator status changed");
            *status = next;
        }
    }

    fn timing(&self) -> Timing {
        *read_lock(&self.timing)
    }

    fn apply_settings(&self, settings: CoordinatorSettings) {
        let timing = Timing::derive(&settings);
        *write_lock(&self.timing) = timing;
        info!(
            node_id = %self.node_id,
            update_interval = ?timing.update_interval,
            timeout_threshold = ?timing.timeout_threshold,
            "coordinator timing updated"
        );
    }

    fn access(&self) -> CoordinatorResult<DocumentAccess> {
        read_lock(&self.access)
            .clone()
            .ok_or(CoordinatorError::NotReady)
    }

    /// Refuse mutations unless the cached view is trusted.
    fn ensure_valid(&self) -> CoordinatorResult<()> {
        match self.status() {
            CoordinatorStatus::Valid => Ok(()),
            CoordinatorStatus::Uninitialized => Err(CoordinatorError::NotReady),
            other => Err(CoordinatorError::InvalidCoordinatorState(other)),
        }
    }

    fn mirror(&self, doc: &CoordinationDocument) {
        *write_lock(&self.routes) = doc.routing_table.clone();
        *write_lock(&self.nodes) = doc.nodes.clone();
    }

    /// Read the document, replacing the cache and the held version.
    ///
    /// Success marks the coordinator valid; a store or decode failure marks
    /// it invalid.
    async fn refresh(&self, version: &mut Option<Version>) -> CoordinatorResult<CoordinationDocument> {
        let access = self.access()?;
        match access.read().await {
            Ok((doc, read_version)) => {
                *version = read_version;
                self.mirror(&doc);
                if self.status() != CoordinatorStatus::Stopped {
                    self.set_status(CoordinatorStatus::Valid);
                }
                Ok(doc)
            }
            Err(e) => {
                self.set_status(CoordinatorStatus::Invalid);
                Err(e)
            }
        }
    }

    /// Write the document under the held version.
    ///
    /// A conflict leaves the status untouched; any other failure marks the
    /// coordinator invalid. On success the cache reflects what was written.
    async fn commit(&self, doc: &CoordinationDocument, version: &mut Option<Version>) -> CoordinatorResult<()> {
        let access = self.access()?;
        match access.write(doc, *version).await {
            Ok(written) => {
                *version = Some(written);
                self.mirror(doc);
                Ok(())
            }
            Err(e) if e.is_conflict() => Err(e),
            Err(e) => {
                self.set_status(CoordinatorStatus::Invalid);
                Err(e)
            }
        }
    }

    async fn reconcile(&self) -> CycleOutcome {
        let mut version = self.version.lock().await;

        match self.status() {
            CoordinatorStatus::Uninitialized | CoordinatorStatus::Stopped => {
                return CycleOutcome::Skipped;
            }
            CoordinatorStatus::Valid | CoordinatorStatus::Invalid => {}
        }

        let mut doc = match self.refresh(&mut version).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(node_id = %self.node_id, error = %e, "failed to read coordination document");
                return CycleOutcome::ReadFailed;
            }
        };

        let now = self.clock.now_millis();
        let evicted: BTreeSet<NodeId> = if self.status() == CoordinatorStatus::Valid {
            let routes_before = doc.routing_table.len();
            let evicted = doc.evict_expired(now, self.timing().timeout_millis());
            if !evicted.is_empty() {
                warn!(
                    node_id = %self.node_id,
                    evicted = ?evicted,
                    released_routes = routes_before - doc.routing_table.len(),
                    "evicted expired nodes"
                );
            }
            evicted
        } else {
            BTreeSet::new()
        };

        doc.touch(&self.node_id, now);

        match self.commit(&doc, &mut version).await {
            Ok(()) => {
                debug!(
                    node_id = %self.node_id,
                    nodes = doc.nodes.len(),
                    routes = doc.routing_table.len(),
                    "heartbeat published"
                );
                CycleOutcome::Committed {
                    evicted: evicted.into_iter().collect(),
                }
            }
            Err(e) if e.is_conflict() => {
                warn!(node_id = %self.node_id, error = %e, "heartbeat lost a write race; retrying next cycle");
                CycleOutcome::Conflict
            }
            Err(e) => {
                error!(node_id = %self.node_id, error = %e, "failed to write coordination document");
                CycleOutcome::WriteFailed
            }
        }
    }

    async fn assign(
        &self,
        resource_id: &str,
        resource_type: &str,
        state: RouteState,
        owner: Option<&str>,
    ) -> CoordinatorResult<()> {
        let mut version = self.version.lock().await;
        self.ensure_valid()?;

        let mut doc = self.refresh(&mut version).await?;
        if let Some(existing) = doc.routing_table.get(resource_id) {
            return Err(CoordinatorError::AlreadyAssigned {
                resource_id: resource_id.to_string(),
                owner: existing.owner_node.clone(),
            });
        }

        let owner = owner.unwrap_or(&self.node_id).to_string();
        doc.routing_table.insert(
            resource_id.to_string(),
            RoutingEntry::new(resource_id, resource_type, owner.clone(), state),
        );
        doc.touch(&self.node_id, self.clock.now_millis());

        // A conflict here is returned to the caller, unlike in the heartbeat loop.
        self.commit(&doc, &mut version).await?;
        info!(node_id = %self.node_id, %resource_id, %resource_type, %owner, %state, "resource assigned");
        Ok(())
    }

    async fn unassign(&self, resource_id: &str) -> CoordinatorResult<()> {
        let mut version = self.version.lock().await;
        self.ensure_valid()?;

        let mut doc = self.refresh(&mut version).await?;
        let removed = doc.routing_table.remove(resource_id);
        doc.touch(&self.node_id, self.clock.now_millis());

        self.commit(&doc, &mut version).await?;
        match removed {
            Some(entry) => {
                info!(node_id = %self.node_id, %resource_id, owner = %entry.owner_node, "resource unassigned")
            }
            None => debug!(node_id = %self.node_id, %resource_id, "unassign of unknown resource"),
        }
        Ok(())
    }

    /// Leave the cluster and mark the coordinator stopped.
    ///
    /// The status flips while the version lock is still held, so no queued
    /// cycle or mutation can write a heartbeat back afterwards.
    async fn withdraw(&self) {
        let mut version = self.version.lock().await;
        self.release_self(&mut version).await;
        self.set_status(CoordinatorStatus::Stopped);
    }

    /// Best-effort removal of this node's heartbeat and of every route it
    /// owns, in one write. Errors are logged only.
    async fn release_self(&self, version: &mut Option<Version>) {
        let mut doc = match self.refresh(version).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(node_id = %self.node_id, error = %e, "could not read document to withdraw heartbeat");
                return;
            }
        };

        let had_heartbeat = doc.nodes.remove(&self.node_id).is_some();
        let routes_before = doc.routing_table.len();
        doc.routing_table
            .retain(|_, entry| entry.owner_node != self.node_id);
        let released = routes_before - doc.routing_table.len();
        if !had_heartbeat && released == 0 {
            debug!(node_id = %self.node_id, "nothing to withdraw");
            return;
        }

        match self.commit(&doc, version).await {
            Ok(()) => info!(node_id = %self.node_id, released_routes = released, "heartbeat withdrawn"),
            Err(e) => warn!(
                node_id = %self.node_id,
                error = %e,
                "could not withdraw heartbeat; peers will evict this node after the timeout"
            ),
        }
    }
}

/// Builder for [`ClusterCoordinator`].
pub struct CoordinatorBuilder {
    clock: Arc<dyn Clock>,
    document_key: String,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            document_key: DEFAULT_DOCUMENT_KEY.to_string(),
        }
    }
}

impl CoordinatorBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn document_key(mut self, key: impl Into<String>) -> Self {
        self.document_key = key.into();
        self
    }

    pub fn build(self) -> ClusterCoordinator {
        let node_id = Uuid::new_v4().to_string();
        debug!(%node_id, document_key = %self.document_key, "coordinator created");
        ClusterCoordinator {
            inner: Arc::new(Inner {
                node_id,
                document_key: self.document_key,
                clock: self.clock,
                access: RwLock::new(None),
                version: tokio::sync::Mutex::new(None),
                routes: RwLock::new(RoutingTable::new()),
                nodes: RwLock::new(BTreeMap::new()),
                status: RwLock::new(CoordinatorStatus::Uninitialized),
                timing: RwLock::new(Timing::default()),
            }),
            ticker: Mutex::new(None),
            settings_task: Mutex::new(None),
        }
    }
}

/// Per-process participant in the shared routing table.
pub struct ClusterCoordinator {
    inner: Arc<Inner>,
    ticker: Mutex<Option<Ticker>>,
    settings_task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for ClusterCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterCoordinator {
    /// Coordinator with a fresh random node id and the system clock.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn document_key(&self) -> &str {
        &self.inner.document_key
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status()
    }

    pub fn is_valid(&self) -> bool {
        self.status() == CoordinatorStatus::Valid
    }

    /// Effective interval and timeout currently in force.
    pub fn timing(&self) -> Timing {
        self.inner.timing()
    }

    /// Wire the store and settings stream.
    ///
    /// Takes the current settings synchronously and applies later ones from a
    /// background task, so this must be called within a Tokio runtime.
    /// Calling it again replaces the store and the subscription.
    pub fn setup(&self, store: Arc<dyn DocumentStore>, mut settings: SettingsReceiver) {
        let initial = *settings.borrow_and_update();
        self.inner.apply_settings(initial);
        *write_lock(&self.inner.access) =
            Some(DocumentAccess::new(store, self.inner.document_key.clone()));
        self.inner.set_status(CoordinatorStatus::Valid);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            while settings.changed().await.is_ok() {
                let next = *settings.borrow_and_update();
                inner.apply_settings(next);
            }
            debug!(node_id = %inner.node_id, "settings stream closed");
        });
        if let Some(previous) = slot(&self.settings_task).replace(task) {
            previous.abort();
        }

        info!(node_id = %self.inner.node_id, document_key = %self.inner.document_key, "coordinator set up");
    }

    /// Start the heartbeat loop. The first cycle runs immediately.
    ///
    /// Starting an already running coordinator is a no-op.
    pub fn start(&self) -> CoordinatorResult<()> {
        match self.status() {
            CoordinatorStatus::Uninitialized => return Err(CoordinatorError::NotReady),
            CoordinatorStatus::Stopped => {
                return Err(CoordinatorError::InvalidCoordinatorState(
                    CoordinatorStatus::Stopped,
                ))
            }
            CoordinatorStatus::Valid | CoordinatorStatus::Invalid => {}
        }

        let mut ticker = slot(&self.ticker);
        if ticker.is_some() {
            debug!(node_id = %self.inner.node_id, "heartbeat loop already running");
            return Ok(());
        }

        let tick_inner = Arc::clone(&self.inner);
        let period_inner = Arc::clone(&self.inner);
        *ticker = Some(Ticker::spawn(
            move || {
                let inner = Arc::clone(&tick_inner);
                async move {
                    inner.reconcile().await;
                }
            },
            move || period_inner.timing().update_interval,
        ));

        info!(
            node_id = %self.inner.node_id,
            interval = ?self.inner.timing().update_interval,
            "heartbeat loop started"
        );
        Ok(())
    }

    /// Stop the loop, withdraw this node's heartbeat along with the routes it
    /// owns, and drop the settings subscription.
    ///
    /// The final write is best effort: if it fails, peers evict this node and
    /// its routes once its heartbeat times out.
    pub async fn stop(&self) -> CoordinatorResult<()> {
        if self.status() == CoordinatorStatus::Uninitialized {
            return Err(CoordinatorError::NotReady);
        }

        let ticker = slot(&self.ticker).take();
        if let Some(ticker) = ticker {
            ticker.cancel().await;
        }

        self.inner.withdraw().await;

        if let Some(task) = slot(&self.settings_task).take() {
            task.abort();
        }

        info!(node_id = %self.inner.node_id, "coordinator stopped");
        Ok(())
    }

    /// Run one heartbeat cycle now.
    ///
    /// The background loop calls this on every tick; errors are absorbed
    /// into the returned outcome and the coordinator status.
    pub async fn reconcile(&self) -> CycleOutcome {
        self.inner.reconcile().await
    }

    /// Claim `resource_id` for `owner` (this node if `None`).
    ///
    /// # Errors
    ///
    /// - `NotReady` before `setup`, `InvalidCoordinatorState` while the view
    ///   is untrusted or after `stop`.
    /// - `AlreadyAssigned` if the resource already has an owner.
    /// - `VersionConflict` if another node wrote in between; the caller
    ///   decides whether to retry.
    /// - `StoreUnavailable` / `MalformedDocument` from the store.
    pub async fn assign(
        &self,
        resource_id: &str,
        resource_type: &str,
        state: RouteState,
        owner: Option<&str>,
    ) -> CoordinatorResult<()> {
        self.inner
            .assign(resource_id, resource_type, state, owner)
            .await
    }

    /// Release `resource_id`. Releasing an unknown resource is not an error.
    pub async fn unassign(&self, resource_id: &str) -> CoordinatorResult<()> {
        self.inner.unassign(resource_id).await
    }

    /// Cached routing entry for `resource_id`, valid or not.
    pub fn lookup(&self, resource_id: &str) -> Option<RoutingEntry> {
        read_lock(&self.inner.routes).get(resource_id).cloned()
    }

    /// Cached routing table, ordered by resource id.
    pub fn routing_snapshot(&self) -> Vec<(ResourceId, RoutingEntry)> {
        read_lock(&self.inner.routes)
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub fn routes_owned_by(&self, node_id: &str) -> Vec<RoutingEntry> {
        read_lock(&self.inner.routes)
            .values()
            .filter(|entry| entry.owner_node == node_id)
            .cloned()
            .collect()
    }

    /// Node heartbeats as of the last read or committed write.
    pub fn live_nodes(&self) -> BTreeMap<NodeId, NodeHeartbeat> {
        read_lock(&self.inner.nodes).clone()
    }
}

impl Drop for ClusterCoordinator {
    fn drop(&mut self) {
        if let Some(ticker) = slot(&self.ticker).take() {
            ticker.abort();
        }
        if let Some(task) = slot(&self.settings_task).take() {
            task.abort();
        }
    }
}
