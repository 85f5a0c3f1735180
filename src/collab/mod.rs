//! Real-time collaboration
//!
//! Each project has a shared document replicated to WebSocket clients. The
//! document is derived from the store: clients write through REST, the hub
//! folds committed changes into the document and fans them out.

pub mod document;
pub mod hub;
pub mod registry;

pub use document::{DocumentSnapshot, DocumentUpdate, ProjectDocument};
pub use hub::DocumentHub;
pub use registry::{ClientMessage, ConnectionRegistry, ServerMessage};
