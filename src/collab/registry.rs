//! Live socket registry
//!
//! Tracks every open collaboration socket by project so document updates
//! and "project deleted" notices reach the right clients.

use super::document::{DocumentSnapshot, DocumentUpdate};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Messages pushed to collaboration sockets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot(DocumentSnapshot),
    Update(DocumentUpdate),
    ProjectDeleted { project_id: i64 },
    /// The socket is about to be closed by the server
    Close { reason: String },
}

/// Messages accepted from collaboration sockets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for a fresh snapshot
    Sync,
    Ping,
}

struct Connection {
    project_id: i64,
    user_id: i64,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a socket; the receiver yields what should be written to it
    pub fn register(
        &self,
        project_id: i64,
        user_id: i64,
    ) -> (Uuid, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            Connection {
                project_id,
                user_id,
                sender,
            },
        );
        debug!(connection = %id, project_id, user_id, "Collaboration socket registered");
        (id, receiver)
    }

    /// Remove a socket; returns the project it belonged to
    pub fn unregister(&self, id: &Uuid) -> Option<i64> {
        self.connections.remove(id).map(|(_, c)| {
            debug!(connection = %id, project_id = c.project_id, "Collaboration socket removed");
            c.project_id
        })
    }

    pub fn connection_count(&self, project_id: i64) -> usize {
        self.connections
            .iter()
            .filter(|c| c.project_id == project_id)
            .count()
    }

    /// Projects with at least one open socket
    pub fn active_projects(&self) -> Vec<i64> {
        let mut projects: Vec<i64> = self.connections.iter().map(|c| c.project_id).collect();
        projects.sort_unstable();
        projects.dedup();
        projects
    }

    /// Send to every socket of one project. Sockets whose receiver is gone
    /// are dropped. Returns the number of deliveries.
    pub fn broadcast(&self, project_id: i64, message: &ServerMessage) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.connections.iter().filter(|c| c.project_id == project_id) {
            if entry.sender.send(message.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.connections.remove(&id);
        }
        delivered
    }

    /// Tell every socket of `project_id` that it is gone, then drop them.
    /// Dropping the sender ends the socket's write loop.
    pub fn close_project(&self, project_id: i64) -> usize {
        let notice = ServerMessage::ProjectDeleted { project_id };
        let closed = self.broadcast(project_id, &notice);
        self.connections.retain(|_, c| c.project_id != project_id);
        closed
    }

    /// Force-close every socket a user holds on a project
    pub fn close_user(&self, project_id: i64, user_id: i64, reason: &str) -> usize {
        let close = ServerMessage::Close {
            reason: reason.to_string(),
        };
        let mut closed = 0;
        self.connections.retain(|_, c| {
            if c.project_id == project_id && c.user_id == user_id {
                let _ = c.sender.send(close.clone());
                closed += 1;
                false
            } else {
                true
            }
        });
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_only_project_sockets() {
        let registry = ConnectionRegistry::new();
        let (_, mut a) = registry.register(1, 10);
        let (_, mut b) = registry.register(1, 11);
        let (_, mut other) = registry.register(2, 10);

        let msg = ServerMessage::Update(DocumentUpdate {
            version: 3,
            removed_tasks: vec![5],
            ..Default::default()
        });
        assert_eq!(registry.broadcast(1, &msg), 2);

        assert_eq!(a.recv().await.unwrap(), msg);
        assert_eq!(b.recv().await.unwrap(), msg);
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_project_notifies_and_removes() {
        let registry = ConnectionRegistry::new();
        let (_, mut rx) = registry.register(4, 1);
        registry.register(5, 1);

        assert_eq!(registry.close_project(4), 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::ProjectDeleted { project_id: 4 }
        );
        // Sender dropped, stream ends
        assert!(rx.recv().await.is_none());
        assert_eq!(registry.connection_count(4), 0);
        assert_eq!(registry.active_projects(), vec![5]);
    }

    #[test]
    fn test_dead_receivers_are_pruned() {
        let registry = ConnectionRegistry::new();
        let (_, rx) = registry.register(1, 1);
        drop(rx);
        assert_eq!(registry.broadcast(1, &ServerMessage::Close { reason: "x".into() }), 0);
        assert_eq!(registry.connection_count(1), 0);
    }

    #[test]
    fn test_close_user_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = registry.register(1, 1);
        let (_, _rx2) = registry.register(1, 2);

        assert_eq!(registry.close_user(1, 2, "access revoked"), 1);
        assert_eq!(registry.unregister(&id), Some(1));
        assert_eq!(registry.unregister(&id), None);
        assert_eq!(registry.connection_count(1), 0);
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_value(ServerMessage::ProjectDeleted { project_id: 3 }).unwrap();
        assert_eq!(json["type"], "project_deleted");
        let parsed: ClientMessage = serde_json::from_str(r#"{"type":"sync"}"#).unwrap();
        assert_eq!(parsed, ClientMessage::Sync);
    }
}
