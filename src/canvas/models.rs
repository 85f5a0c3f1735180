//! In-memory node/edge state held by the reconciler

use crate::store::{
    CreateTaskRequest, DependencyNode, ProjectGraph, TaskNode, TaskRef, UpdateTaskRequest,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix of client-generated identifiers
pub const TEMP_PREFIX: &str = "tmp-";

/// Identifier of a canvas entity.
///
/// Server ids and temporary ids live in disjoint namespaces: a temporary id
/// is always a `tmp-…` string and never parses as an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanvasId {
    Server(i64),
    Temp(String),
}

pub type NodeId = CanvasId;
pub type EdgeId = CanvasId;

impl CanvasId {
    /// Fresh temporary id
    pub fn temp() -> Self {
        CanvasId::Temp(format!("{TEMP_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, CanvasId::Temp(_))
    }

    /// Authoritative id, if confirmed
    pub fn server_id(&self) -> Option<i64> {
        match self {
            CanvasId::Server(id) => Some(*id),
            CanvasId::Temp(_) => None,
        }
    }
}

impl fmt::Display for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CanvasId::Server(id) => write!(f, "{id}"),
            CanvasId::Temp(tmp) => f.write_str(tmp),
        }
    }
}

impl From<i64> for CanvasId {
    fn from(id: i64) -> Self {
        CanvasId::Server(id)
    }
}

impl From<&CanvasId> for TaskRef {
    fn from(id: &CanvasId) -> Self {
        match id {
            CanvasId::Server(id) => TaskRef::Id(*id),
            CanvasId::Temp(tmp) => TaskRef::Temp(tmp.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Persistence lifecycle of one entity.
///
/// `Pending -> Confirmed` on a successful create, `Pending -> RolledBack`
/// on failure (the entity is then removed). Edits move a confirmed entity
/// through `UpdatePending -> Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStatus {
    Pending,
    Confirmed,
    UpdatePending,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasNode {
    pub id: NodeId,
    pub title: String,
    pub position: Position,
    pub completed: bool,
    pub color: Option<String>,
    pub locked: bool,
    pub status: PersistStatus,
    /// Part of an unaccepted planner proposal
    #[serde(default)]
    pub draft: bool,
}

impl CanvasNode {
    /// A not-yet-persisted node
    pub fn pending(title: impl Into<String>, position: Position) -> Self {
        Self {
            id: CanvasId::temp(),
            title: title.into(),
            position,
            completed: false,
            color: None,
            locked: false,
            status: PersistStatus::Pending,
            draft: false,
        }
    }

    /// Persisted and not part of a draft
    pub fn is_saved(&self) -> bool {
        !self.draft && !self.id.is_temp()
    }

    /// Apply the present fields of a partial update
    pub fn apply(&mut self, changes: &UpdateTaskRequest) {
        if let Some(ref title) = changes.title {
            self.title = title.clone();
        }
        if let Some(x) = changes.x {
            self.position.x = x;
        }
        if let Some(y) = changes.y {
            self.position.y = y;
        }
        if let Some(completed) = changes.completed {
            self.completed = completed;
        }
        if let Some(ref color) = changes.color {
            self.color = color.clone();
        }
        if let Some(locked) = changes.locked {
            self.locked = locked;
        }
    }
}

impl From<&CanvasNode> for CreateTaskRequest {
    fn from(node: &CanvasNode) -> Self {
        Self {
            title: node.title.clone(),
            x: node.position.x,
            y: node.position.y,
            completed: node.completed,
            color: node.color.clone(),
            locked: node.locked,
        }
    }
}

impl From<&TaskNode> for CanvasNode {
    fn from(task: &TaskNode) -> Self {
        Self {
            id: CanvasId::Server(task.id),
            title: task.title.clone(),
            position: Position::new(task.x, task.y),
            completed: task.completed,
            color: task.color.clone(),
            locked: task.locked,
            status: PersistStatus::Confirmed,
            draft: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub status: PersistStatus,
    #[serde(default)]
    pub draft: bool,
}

impl CanvasEdge {
    pub fn pending(source: NodeId, target: NodeId) -> Self {
        Self {
            id: CanvasId::temp(),
            source,
            target,
            status: PersistStatus::Pending,
            draft: false,
        }
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    pub fn is_saved(&self) -> bool {
        !self.draft && !self.id.is_temp() && !self.source.is_temp() && !self.target.is_temp()
    }
}

impl From<&DependencyNode> for CanvasEdge {
    fn from(dep: &DependencyNode) -> Self {
        Self {
            id: CanvasId::Server(dep.id),
            source: CanvasId::Server(dep.from_task),
            target: CanvasId::Server(dep.to_task),
            status: PersistStatus::Confirmed,
            draft: false,
        }
    }
}

/// Ordered node and edge collections.
///
/// Order is insertion order; id remaps replace entries in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasGraph {
    pub nodes: Vec<CanvasNode>,
    pub edges: Vec<CanvasEdge>,
}

impl CanvasGraph {
    pub fn new(nodes: Vec<CanvasNode>, edges: Vec<CanvasEdge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &NodeId) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut CanvasNode> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&CanvasEdge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    pub fn edge_mut(&mut self, id: &EdgeId) -> Option<&mut CanvasEdge> {
        self.edges.iter_mut().find(|e| &e.id == id)
    }

    pub fn has_edge_between(&self, source: &NodeId, target: &NodeId) -> bool {
        self.edges
            .iter()
            .any(|e| &e.source == source && &e.target == target)
    }

    /// Remove a node and every edge touching it
    pub fn remove_node(&mut self, id: &NodeId) -> Option<(CanvasNode, Vec<CanvasEdge>)> {
        let index = self.nodes.iter().position(|n| &n.id == id)?;
        let node = self.nodes.remove(index);
        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.edges).into_iter().partition(|e| e.touches(id));
        self.edges = kept;
        Some((node, removed))
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> Option<CanvasEdge> {
        let index = self.edges.iter().position(|e| &e.id == id)?;
        Some(self.edges.remove(index))
    }

    /// Rename a node in place, following the rename through edge endpoints
    pub fn remap_node(&mut self, from: &NodeId, to: NodeId) {
        if let Some(node) = self.node_mut(from) {
            node.id = to.clone();
        }
        for edge in self.edges.iter_mut() {
            if &edge.source == from {
                edge.source = to.clone();
            }
            if &edge.target == from {
                edge.target = to.clone();
            }
        }
    }

    /// Source/target pairs of every edge
    pub fn edge_pairs(&self) -> Vec<(NodeId, NodeId)> {
        self.edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect()
    }
}

impl From<&ProjectGraph> for CanvasGraph {
    fn from(graph: &ProjectGraph) -> Self {
        Self {
            nodes: graph.tasks.iter().map(CanvasNode::from).collect(),
            edges: graph.dependencies.iter().map(CanvasEdge::from).collect(),
        }
    }
}
