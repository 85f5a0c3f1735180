use super::models::{EdgeId, NodeId};
use thiserror::Error;

/// Errors raised by graph editing gestures
#[derive(Error, Debug)]
pub enum CanvasError {
    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("node {0} cannot depend on itself")]
    SelfLoop(NodeId),

    /// The node still carries a temporary id
    #[error("node {0} has not been confirmed by the server yet")]
    Unconfirmed(NodeId),

    #[error("edge {source_node} -> {target_node} already exists")]
    DuplicateEdge {
        source_node: NodeId,
        target_node: NodeId,
    },

    #[error("edge {source_node} -> {target_node} would create a cycle")]
    CycleRejected {
        source_node: NodeId,
        target_node: NodeId,
    },

    #[error("clipboard is empty")]
    EmptyClipboard,

    #[error("no draft to accept")]
    NoDraft,

    /// The backing store rejected the write; local state was rolled back
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl From<anyhow::Error> for CanvasError {
    fn from(err: anyhow::Error) -> Self {
        CanvasError::Persistence(err)
    }
}

pub type CanvasResult<T> = Result<T, CanvasError>;
