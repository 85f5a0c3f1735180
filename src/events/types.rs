//! CRUD event types

use serde::{Deserialize, Serialize};

/// The type of entity that was mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Task,
    Dependency,
    /// Several entities changed in one bulk transaction
    Graph,
}

/// The CRUD action performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudAction {
    Created,
    Updated,
    Deleted,
}

/// A CRUD event emitted after a committed mutation.
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrudEvent {
    pub entity_type: EntityType,
    pub action: CrudAction,
    pub entity_id: i64,
    pub project_id: i64,
    /// Entity data after the mutation, if any
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl CrudEvent {
    pub fn new(entity_type: EntityType, action: CrudAction, entity_id: i64, project_id: i64) -> Self {
        Self {
            entity_type,
            action,
            entity_id,
            project_id,
            payload: serde_json::Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Sink for CRUD events
pub trait EventEmitter: Send + Sync {
    /// Fire-and-forget
    fn emit(&self, event: CrudEvent);

    fn emit_created(&self, entity_type: EntityType, id: i64, project_id: i64, payload: serde_json::Value) {
        self.emit(CrudEvent::new(entity_type, CrudAction::Created, id, project_id).with_payload(payload));
    }

    fn emit_updated(&self, entity_type: EntityType, id: i64, project_id: i64, payload: serde_json::Value) {
        self.emit(CrudEvent::new(entity_type, CrudAction::Updated, id, project_id).with_payload(payload));
    }

    fn emit_deleted(&self, entity_type: EntityType, id: i64, project_id: i64) {
        self.emit(CrudEvent::new(entity_type, CrudAction::Deleted, id, project_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crud_event_snake_case_and_null_payload() {
        let event = CrudEvent::new(EntityType::Dependency, CrudAction::Deleted, 7, 2);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["entity_type"], "dependency");
        assert_eq!(json["action"], "deleted");
        assert!(json.get("payload").is_none());
    }

    #[test]
    fn test_crud_event_payload_survives_serde() {
        let event = CrudEvent::new(EntityType::Task, CrudAction::Updated, 4, 1)
            .with_payload(serde_json::json!({"completed": true}));
        let json = serde_json::to_string(&event).unwrap();
        let back: CrudEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entity_id, 4);
        assert_eq!(back.payload["completed"], true);
    }
}
