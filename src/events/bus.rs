//! Event bus for broadcasting CRUD events

use super::{CrudEvent, EventEmitter};
use tokio::sync::broadcast;
use tracing::debug;

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Distributes CrudEvents via `tokio::sync::broadcast`.
///
/// Emitting never blocks; with no subscribers the event is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CrudEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrudEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventEmitter for EventBus {
    fn emit(&self, event: CrudEvent) {
        let entity_type = event.entity_type;
        let action = event.action;
        if let Ok(n) = self.sender.send(event) {
            debug!(?entity_type, ?action, subscribers = n, "CrudEvent emitted");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CrudAction, EntityType};

    #[test]
    fn test_emit_without_subscriber_no_panic() {
        let bus = EventBus::default();
        bus.emit_deleted(EntityType::Task, 1, 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_every_subscriber_receives() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit_created(EntityType::Task, 9, 3, serde_json::json!({"title": "Write docs"}));

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.try_recv().unwrap();
            assert_eq!(event.entity_type, EntityType::Task);
            assert_eq!(event.action, CrudAction::Created);
            assert_eq!(event.entity_id, 9);
            assert_eq!(event.project_id, 3);
        }
    }
}
