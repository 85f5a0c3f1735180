//! Store-to-document synchronisation
//!
//! The relational store is authoritative. After every committed mutation the
//! hub re-reads the project graph and folds it into the project's document,
//! broadcasting the resulting update. Documents exist only while at least
//! one socket is open on the project.

use super::document::{DocumentSnapshot, ProjectDocument};
use super::registry::{ConnectionRegistry, ServerMessage};
use crate::events::{CrudAction, CrudEvent, EntityType};
use crate::store::{StoreResult, TaskStore};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct DocumentHub {
    store: Arc<dyn TaskStore>,
    registry: Arc<ConnectionRegistry>,
    documents: DashMap<i64, Arc<Mutex<ProjectDocument>>>,
}

impl DocumentHub {
    pub fn new(store: Arc<dyn TaskStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            documents: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn document(&self, project_id: i64) -> Arc<Mutex<ProjectDocument>> {
        self.documents
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(ProjectDocument::new(project_id))))
            .clone()
    }

    pub fn is_loaded(&self, project_id: i64) -> bool {
        self.documents.contains_key(&project_id)
    }

    /// Current document state, loading it from the store on first use
    pub async fn snapshot(&self, project_id: i64) -> StoreResult<DocumentSnapshot> {
        let doc = self.document(project_id);
        let mut doc = doc.lock().await;
        if doc.version() == 0 {
            let graph = self.store.get_project_graph(project_id).await?;
            doc.sync_from(&graph);
        }
        Ok(doc.snapshot())
    }

    /// Re-read the project and broadcast the difference. No-op for projects
    /// without a loaded document.
    pub async fn refresh(&self, project_id: i64) -> StoreResult<usize> {
        let Some(doc) = self.documents.get(&project_id).map(|d| d.clone()) else {
            return Ok(0);
        };
        let graph = self.store.get_project_graph(project_id).await?;
        let update = doc.lock().await.sync_from(&graph);
        Ok(match update {
            Some(update) => {
                debug!(project_id, version = update.version, "Document updated");
                self.registry.broadcast(project_id, &ServerMessage::Update(update))
            }
            None => 0,
        })
    }

    /// Drop the document once the last socket has left
    pub fn release(&self, project_id: i64) {
        if self.registry.connection_count(project_id) == 0 {
            self.documents.remove(&project_id);
        }
    }

    pub async fn handle_event(&self, event: &CrudEvent) {
        let project_id = event.project_id;
        if event.entity_type == EntityType::Project && event.action == CrudAction::Deleted {
            self.documents.remove(&project_id);
            let closed = self.registry.close_project(project_id);
            info!(project_id, closed, "Project deleted, sockets closed");
            return;
        }
        if let Err(e) = self.refresh(project_id).await {
            warn!(project_id, error = %e, "Failed to refresh shared document");
        }
    }

    /// Consume the event bus until it closes
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<CrudEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.handle_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Document hub lagged, resyncing all documents");
                        let loaded: Vec<i64> = self.documents.iter().map(|d| *d.key()).collect();
                        for project_id in loaded {
                            if let Err(e) = self.refresh(project_id).await {
                                warn!(project_id, error = %e, "Resync failed");
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventEmitter};
    use crate::store::{CreateTaskRequest, SqliteStore};

    async fn setup() -> (Arc<dyn TaskStore>, Arc<DocumentHub>, i64) {
        let store: Arc<dyn TaskStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let user = store.create_user("a@example.com", "A", "hash").await.unwrap();
        let project = store.create_project(user.id, "Launch").await.unwrap();
        let hub = Arc::new(DocumentHub::new(store.clone(), Arc::new(ConnectionRegistry::new())));
        (store, hub, project.id)
    }

    fn create(title: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_snapshot_loads_from_store() {
        let (store, hub, project_id) = setup().await;
        store.create_task(project_id, &create("Design")).await.unwrap();

        let snapshot = hub.snapshot(project_id).await.unwrap();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.version, 1);
        assert!(hub.is_loaded(project_id));
    }

    #[tokio::test]
    async fn test_refresh_broadcasts_store_changes() {
        let (store, hub, project_id) = setup().await;
        let (_, mut rx) = hub.registry().register(project_id, 1);
        hub.snapshot(project_id).await.unwrap();

        let task = store.create_task(project_id, &create("Build")).await.unwrap();
        assert_eq!(hub.refresh(project_id).await.unwrap(), 1);

        match rx.recv().await.unwrap() {
            ServerMessage::Update(update) => {
                assert_eq!(update.upserted_tasks[0].id, task.id);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        // Nothing changed since
        assert_eq!(hub.refresh(project_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unloaded_projects_are_skipped() {
        let (store, hub, project_id) = setup().await;
        store.create_task(project_id, &create("Build")).await.unwrap();
        assert_eq!(hub.refresh(project_id).await.unwrap(), 0);
        assert!(!hub.is_loaded(project_id));
    }

    #[tokio::test]
    async fn test_project_deletion_event_closes_sockets() {
        let (_store, hub, project_id) = setup().await;
        let bus = EventBus::default();
        let handle = hub.clone().spawn(bus.subscribe());

        let (_, mut rx) = hub.registry().register(project_id, 1);
        hub.snapshot(project_id).await.unwrap();
        bus.emit_deleted(EntityType::Project, project_id, project_id);

        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::ProjectDeleted { project_id }
        );
        assert!(rx.recv().await.is_none());
        assert!(!hub.is_loaded(project_id));
        handle.abort();
    }

    #[tokio::test]
    async fn test_release_keeps_document_while_sockets_remain() {
        let (_store, hub, project_id) = setup().await;
        let (first, _rx1) = hub.registry().register(project_id, 1);
        let (_second, _rx2) = hub.registry().register(project_id, 1);
        hub.snapshot(project_id).await.unwrap();

        hub.registry().unregister(&first);
        hub.release(project_id);
        assert!(hub.is_loaded(project_id));
    }
}
