//! CRUD events
//!
//! Every committed mutation is published on the [`EventBus`]; the
//! collaboration hub consumes it to refresh the shared documents.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{CrudAction, CrudEvent, EntityType, EventEmitter};
