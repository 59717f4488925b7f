//! Domain types for the coordination document.
//!
//! The document is persisted as JSON. Decoding is strict: unknown fields,
//! unknown schema versions and inconsistent routing keys are rejected instead
//! of being silently dropped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Unique identifier for a node (one per running coordinator).
pub type NodeId = String;

/// Unique identifier for a routed resource.
pub type ResourceId = String;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 1;

// ── Routing ────────────────────────────────────────────────────────

/// Lifecycle state of a routed resource, as reported by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    Initializing,
    Started,
    Closed,
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RouteState::Initializing => "initializing",
            RouteState::Started => "started",
            RouteState::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RouteState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "initializing" => Ok(RouteState::Initializing),
            "started" => Ok(RouteState::Started),
            "closed" => Ok(RouteState::Closed),
            other => Err(format!("unknown route state: {other}")),
        }
    }
}

/// An ownership claim binding one resource to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingEntry {
    pub resource_id: ResourceId,
    /// Free-form resource kind, e.g. "session" or "job".
    pub resource_type: String,
    pub owner_node: NodeId,
    pub state: RouteState,
}

impl RoutingEntry {
    pub fn new(
        resource_id: impl Into<ResourceId>,
        resource_type: impl Into<String>,
        owner_node: impl Into<NodeId>,
        state: RouteState,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            owner_node: owner_node.into(),
            state,
        }
    }
}

/// Routing table ordered by resource id.
pub type RoutingTable = BTreeMap<ResourceId, RoutingEntry>;

// ── Heartbeats ─────────────────────────────────────────────────────

/// Liveness record for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeHeartbeat {
    /// Milliseconds since the Unix epoch.
    pub last_update_timestamp: u64,
}

impl NodeHeartbeat {
    pub fn at(timestamp_ms: u64) -> Self {
        Self {
            last_update_timestamp: timestamp_ms,
        }
    }

    /// True if the heartbeat is older than `timeout_ms` at `now_ms`.
    pub fn is_expired(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_update_timestamp) > timeout_ms
    }
}

// ── Document ───────────────────────────────────────────────────────

/// The single persisted aggregate shared by all nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinationDocument {
    pub schema_version: u32,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, NodeHeartbeat>,
    #[serde(default)]
    pub routing_table: RoutingTable,
}

impl Default for CoordinationDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            nodes: BTreeMap::new(),
            routing_table: RoutingTable::new(),
        }
    }
}

impl CoordinationDocument {
    /// Decode and validate a stored document.
    pub fn decode(bytes: &[u8]) -> Result<Self, SchemaError> {
        let doc: CoordinationDocument = serde_json::from_slice(bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn encode(&self) -> Result<Vec<u8>, SchemaError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                found: self.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        if self.nodes.keys().any(|id| id.is_empty()) {
            return Err(SchemaError::EmptyIdentifier("nodes"));
        }
        for (key, entry) in &self.routing_table {
            if key.is_empty() || entry.owner_node.is_empty() {
                return Err(SchemaError::EmptyIdentifier("routing_table"));
            }
            if *key != entry.resource_id {
                return Err(SchemaError::KeyMismatch {
                    key: key.clone(),
                    resource_id: entry.resource_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Record a heartbeat for `node_id` at `now_ms`.
    pub fn touch(&mut self, node_id: &str, now_ms: u64) {
        self.nodes
            .insert(node_id.to_string(), NodeHeartbeat::at(now_ms));
    }

    /// Remove every node whose heartbeat expired, along with the routes it owns.
    ///
    /// The expired set is computed before anything is removed; survivors are
    /// then rebuilt from it. Returns the evicted node ids.
    pub fn evict_expired(&mut self, now_ms: u64, timeout_ms: u64) -> BTreeSet<NodeId> {
        let expired: BTreeSet<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, hb)| hb.is_expired(now_ms, timeout_ms))
            .map(|(id, _)| id.clone())
            .collect();

        if expired.is_empty() {
            return expired;
        }

        self.nodes = std::mem::take(&mut self.nodes)
            .into_iter()
            .filter(|(id, _)| !expired.contains(id))
            .collect();
        self.routing_table = std::mem::take(&mut self.routing_table)
            .into_iter()
            .filter(|(_, entry)| !expired.contains(&entry.owner_node))
            .collect();

        expired
    }

    /// Resources currently owned by `node_id`.
    pub fn routes_owned_by<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a RoutingEntry> {
        self.routing_table
            .values()
            .filter(move |entry| entry.owner_node == node_id)
    }
}
