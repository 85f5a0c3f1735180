//! Graph state reconciler
//!
//! In-memory task/dependency graph edited through gestures, kept consistent
//! with an authoritative backend through a [`Persistence`] implementation.

pub mod checksum;
pub mod clipboard;
pub mod draft;
pub mod error;
pub mod http;
pub mod layout;
pub mod models;
pub mod persistence;
pub mod reconciler;
pub mod traversal;
pub mod validation;

#[cfg(test)]
pub(crate) mod mock;

pub use checksum::{reconcile, CanonicalGraph, DivergenceReport};
pub use error::{CanvasError, CanvasResult};
pub use http::HttpPersistence;
pub use layout::LayoutConfig;
pub use models::{CanvasEdge, CanvasGraph, CanvasId, CanvasNode, EdgeId, NodeId, PersistStatus, Position};
pub use persistence::{Persistence, StorePersistence};
pub use reconciler::GraphReconciler;
pub use traversal::compute_ready_tasks;
pub use validation::{CyclePolicy, EdgeValidator};
