//! Offline subcommands: inspect or edit the routing document directly.
//!
//! These open the redb file themselves, so they must not run while a daemon
//! holds the same database.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use routegrid_cluster::{ClusterCoordinator, DocumentAccess};
use routegrid_core::{settings_channel, CoordinatorSettings, RoutegridConfig};
use routegrid_state::{RedbDocumentStore, RouteState};
use tracing::{debug, warn};

/// Database handle plus the parts of the config needed to address the document.
pub struct OfflineStore {
    store: RedbDocumentStore,
    document_key: String,
    settings: CoordinatorSettings,
}

impl OfflineStore {
    pub fn open(data_dir: &Path, config: Option<&Path>) -> anyhow::Result<Self> {
        let config = match config {
            Some(path) => RoutegridConfig::from_file(path)?,
            None => RoutegridConfig::default(),
        };
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir {}", data_dir.display()))?;
        let db_path = config.database_path(data_dir);
        let store = RedbDocumentStore::open(&db_path)
            .with_context(|| format!("open routing database {}", db_path.display()))?;
        debug!(path = ?db_path, "routing database opened");

        Ok(Self {
            store,
            document_key: config.store.document_key.clone(),
            settings: config.settings(),
        })
    }

    /// A coordinator bound to this store for a single mutation.
    fn coordinator(&self) -> ClusterCoordinator {
        let coordinator = ClusterCoordinator::builder()
            .document_key(self.document_key.clone())
            .build();
        let (_tx, rx) = settings_channel(self.settings);
        coordinator.setup(Arc::new(self.store.clone()), rx);
        coordinator
    }
}

/// Stored routing table rendered as pretty JSON.
pub async fn routes_json(store: &OfflineStore) -> anyhow::Result<String> {
    let access = DocumentAccess::new(Arc::new(store.store.clone()), store.document_key.clone());
    let (doc, _) = access.read().await?;
    Ok(serde_json::to_string_pretty(&doc.routing_table)?)
}

pub async fn print_routes(store: &OfflineStore) -> anyhow::Result<()> {
    println!("{}", routes_json(store).await?);
    Ok(())
}

/// Assign `resource` to `owner`.
///
/// The route is written by a short-lived coordinator whose own heartbeat is
/// withdrawn before returning, so the owner must be some other node.
pub async fn assign(
    store: &OfflineStore,
    resource: &str,
    resource_type: &str,
    state: RouteState,
    owner: &str,
) -> anyhow::Result<()> {
    let coordinator = store.coordinator();
    let result = coordinator
        .assign(resource, resource_type, state, Some(owner))
        .await;
    if result.is_ok() && !coordinator.live_nodes().contains_key(owner) {
        warn!(%owner, %resource, "owner has no heartbeat in the routing document");
    }
    coordinator.stop().await?;
    result?;

    if let Some(entry) = coordinator.lookup(resource) {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    Ok(())
}

pub async fn unassign(store: &OfflineStore, resource: &str) -> anyhow::Result<()> {
    let coordinator = store.coordinator();
    let result = coordinator.unassign(resource).await;
    coordinator.stop().await?;
    result?;
    println!("unassigned {resource}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use routegrid_state::{CoordinationDocument, RoutingTable};

    fn open(dir: &tempfile::TempDir) -> OfflineStore {
        OfflineStore::open(dir.path(), None).unwrap()
    }

    #[tokio::test]
    async fn empty_database_has_no_routes() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let table: RoutingTable = serde_json::from_str(&routes_json(&store).await.unwrap()).unwrap();
        assert!(table.is_empty());
    }

    async fn read_doc(store: &OfflineStore) -> CoordinationDocument {
        let access = DocumentAccess::new(Arc::new(store.store.clone()), store.document_key.clone());
        access.read().await.unwrap().0
    }

    #[tokio::test]
    async fn assign_and_unassign_leave_no_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);

        // A running node sharing the database.
        let daemon = store.coordinator();
        daemon.reconcile().await;
        let owner = daemon.node_id().to_string();

        assign(&store, "res-1", "session", RouteState::Started, &owner)
            .await
            .unwrap();
        let table: RoutingTable = serde_json::from_str(&routes_json(&store).await.unwrap()).unwrap();
        assert_eq!(table["res-1"].owner_node, owner);
        assert_eq!(table["res-1"].state, RouteState::Started);

        // Only the daemon's heartbeat remains, and every route points at it.
        let doc = read_doc(&store).await;
        assert_eq!(doc.nodes.keys().collect::<Vec<_>>(), vec![&owner]);
        for entry in doc.routing_table.values() {
            assert!(doc.nodes.contains_key(&entry.owner_node));
        }

        assert!(assign(&store, "res-1", "session", RouteState::Started, "node-b")
            .await
            .is_err());

        unassign(&store, "res-1").await.unwrap();
        let table: RoutingTable = serde_json::from_str(&routes_json(&store).await.unwrap()).unwrap();
        assert!(table.is_empty());
        assert_eq!(read_doc(&store).await.nodes.len(), 1);
    }

    #[tokio::test]
    async fn config_selects_database_and_document() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("routegrid.toml");
        std::fs::write(
            &config_path,
            "[store]\npath = \"custom.redb\"\ndocument_key = \"edge\"\n",
        )
        .unwrap();

        let store = OfflineStore::open(dir.path(), Some(&config_path)).unwrap();
        assert_eq!(store.document_key, "edge");
        assert!(dir.path().join("custom.redb").exists());
    }
}
