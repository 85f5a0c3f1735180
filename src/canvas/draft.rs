//! Draft overlay for planner proposals
//!
//! New tasks and dependencies from a proposal are inserted into the graph
//! flagged as `draft`. Updates and deletions of existing entities are only
//! recorded. Nothing is persisted until the overlay is accepted, at which
//! point it becomes one bulk change.

use super::models::{
    CanvasEdge, CanvasGraph, CanvasId, CanvasNode, EdgeId, NodeId, PersistStatus, Position,
};
use crate::planner::PlanProposal;
use crate::store::{
    BulkChangeRequest, BulkDependencyCreate, BulkDependencyUpdate, BulkTaskCreate,
    BulkTaskUpdate, TaskRef, UpdateTaskRequest,
};
use std::collections::{HashMap, HashSet};
use tracing::warn;

const DRAFT_COLUMN_GAP: f64 = 260.0;
const DRAFT_ROW_STEP: f64 = 90.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftOverlay {
    pub summary: String,
    /// Draft-flagged nodes inserted into the graph
    pub new_nodes: Vec<NodeId>,
    /// Draft-flagged edges inserted into the graph
    pub new_edges: Vec<EdgeId>,
    pub task_updates: Vec<(i64, UpdateTaskRequest)>,
    pub task_deletions: Vec<i64>,
    /// `(dependency id, new source, new target)`
    pub dependency_updates: Vec<(i64, NodeId, NodeId)>,
    pub dependency_deletions: Vec<i64>,
}

fn saved_task(graph: &CanvasGraph, id: i64) -> bool {
    graph
        .node(&CanvasId::Server(id))
        .is_some_and(CanvasNode::is_saved)
}

fn saved_dependency(graph: &CanvasGraph, id: i64) -> bool {
    graph
        .edge(&CanvasId::Server(id))
        .is_some_and(CanvasEdge::is_saved)
}

fn resolve(
    graph: &CanvasGraph,
    keys: &HashMap<String, NodeId>,
    deleted: &HashSet<i64>,
    task: &TaskRef,
) -> Option<NodeId> {
    match task {
        TaskRef::Id(id) if saved_task(graph, *id) && !deleted.contains(id) => {
            Some(CanvasId::Server(*id))
        }
        TaskRef::Id(_) => None,
        TaskRef::Temp(key) => keys.get(key).cloned(),
    }
}

/// Free column to the right of the current graph
fn draft_origin(graph: &CanvasGraph) -> Position {
    let right = graph
        .nodes
        .iter()
        .map(|n| n.position.x)
        .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.max(x))));
    let top = graph
        .nodes
        .iter()
        .map(|n| n.position.y)
        .fold(None, |acc: Option<f64>, y| Some(acc.map_or(y, |a| a.min(y))));
    match (right, top) {
        (Some(x), Some(y)) => Position::new(x + DRAFT_COLUMN_GAP, y),
        _ => Position::default(),
    }
}

impl DraftOverlay {
    /// Stage a proposal on top of `graph`.
    ///
    /// References to unknown tasks or dependencies are dropped with a
    /// warning; the planner is not trusted to produce consistent ids.
    pub fn stage(graph: &mut CanvasGraph, proposal: &PlanProposal) -> Self {
        let mut overlay = DraftOverlay {
            summary: proposal.summary.clone(),
            ..Default::default()
        };

        let mut deleted = HashSet::new();
        for id in &proposal.task_deletions {
            if !saved_task(graph, *id) {
                warn!(task_id = id, "Proposal deletes unknown task, skipping");
            } else if deleted.insert(*id) {
                overlay.task_deletions.push(*id);
            }
        }

        let origin = draft_origin(graph);
        let mut placed = 0usize;
        let mut keys: HashMap<String, NodeId> = HashMap::new();

        for upsert in &proposal.task_upserts {
            match upsert.id {
                TaskRef::Id(id) if saved_task(graph, id) => {
                    if deleted.contains(&id) {
                        continue;
                    }
                    let changes = UpdateTaskRequest {
                        title: upsert.title.clone(),
                        x: upsert.x,
                        y: upsert.y,
                        completed: upsert.completed,
                        color: upsert.color.clone().map(Some),
                        locked: None,
                    };
                    if !changes.is_empty() {
                        overlay.task_updates.push((id, changes));
                    }
                }
                TaskRef::Id(id) => {
                    warn!(task_id = id, "Proposal updates unknown task, skipping");
                }
                TaskRef::Temp(ref key) => {
                    if keys.contains_key(key) {
                        warn!(key = %key, "Proposal repeats a new task key, skipping");
                        continue;
                    }
                    let position = match (upsert.x, upsert.y) {
                        (Some(x), Some(y)) => Position::new(x, y),
                        _ => {
                            let p = Position::new(
                                origin.x,
                                origin.y + placed as f64 * DRAFT_ROW_STEP,
                            );
                            placed += 1;
                            p
                        }
                    };
                    let title = upsert
                        .title
                        .clone()
                        .unwrap_or_else(|| "Untitled task".to_string());
                    let mut node = CanvasNode::pending(title, position);
                    node.completed = upsert.completed.unwrap_or(false);
                    node.color = upsert.color.clone();
                    node.draft = true;
                    keys.insert(key.clone(), node.id.clone());
                    overlay.new_nodes.push(node.id.clone());
                    graph.nodes.push(node);
                }
            }
        }

        let mut removed_edges = HashSet::new();
        for id in &proposal.dependency_deletions {
            if saved_dependency(graph, *id) && removed_edges.insert(*id) {
                overlay.dependency_deletions.push(*id);
            } else {
                warn!(dependency_id = id, "Proposal deletes unknown dependency, skipping");
            }
        }

        for dep in &proposal.dependency_upserts {
            let (Some(source), Some(target)) = (
                resolve(graph, &keys, &deleted, &dep.from_task),
                resolve(graph, &keys, &deleted, &dep.to_task),
            ) else {
                warn!(from = ?dep.from_task, to = ?dep.to_task, "Proposal dependency has unresolved endpoint, skipping");
                continue;
            };
            if source == target {
                warn!(task = %source, "Proposal adds a self dependency, skipping");
                continue;
            }
            match dep.id {
                Some(id) if saved_dependency(graph, id) && !removed_edges.contains(&id) => {
                    overlay.dependency_updates.push((id, source, target));
                }
                Some(id) => {
                    warn!(dependency_id = id, "Proposal updates unknown dependency, skipping");
                }
                None => {
                    if graph.has_edge_between(&source, &target) {
                        continue;
                    }
                    let mut edge = CanvasEdge::pending(source, target);
                    edge.draft = true;
                    overlay.new_edges.push(edge.id.clone());
                    graph.edges.push(edge);
                }
            }
        }

        overlay
    }

    pub fn is_empty(&self) -> bool {
        self.new_nodes.is_empty()
            && self.new_edges.is_empty()
            && self.task_updates.is_empty()
            && self.task_deletions.is_empty()
            && self.dependency_updates.is_empty()
            && self.dependency_deletions.is_empty()
    }

    /// Remove every draft-flagged entry from `graph`
    pub fn discard(&self, graph: &mut CanvasGraph) {
        graph.nodes.retain(|n| !n.draft);
        graph.edges.retain(|e| !e.draft);
    }

    /// Bulk change equivalent of the overlay. Entries whose target no longer
    /// exists in `graph` are left out.
    pub fn to_bulk_request(&self, graph: &CanvasGraph) -> BulkChangeRequest {
        BulkChangeRequest {
            created_tasks: self
                .new_nodes
                .iter()
                .filter_map(|id| graph.node(id))
                .map(|node| BulkTaskCreate {
                    temp_id: node.id.to_string(),
                    task: node.into(),
                })
                .collect(),
            updated_tasks: self
                .task_updates
                .iter()
                .filter(|(id, _)| saved_task(graph, *id))
                .map(|(id, changes)| BulkTaskUpdate {
                    id: *id,
                    changes: changes.clone(),
                })
                .collect(),
            deleted_task_ids: self
                .task_deletions
                .iter()
                .copied()
                .filter(|id| saved_task(graph, *id))
                .collect(),
            created_dependencies: self
                .new_edges
                .iter()
                .filter_map(|id| graph.edge(id))
                .map(|edge| BulkDependencyCreate {
                    temp_id: edge.id.to_string(),
                    from_task: (&edge.source).into(),
                    to_task: (&edge.target).into(),
                })
                .collect(),
            updated_dependencies: self
                .dependency_updates
                .iter()
                .filter(|(id, _, _)| saved_dependency(graph, *id))
                .map(|(id, source, target)| BulkDependencyUpdate {
                    id: *id,
                    from_task: Some(source.into()),
                    to_task: Some(target.into()),
                })
                .collect(),
            deleted_dependency_ids: self
                .dependency_deletions
                .iter()
                .copied()
                .filter(|id| saved_dependency(graph, *id))
                .collect(),
        }
    }

    /// Fold the overlay into `graph` ahead of persistence
    pub fn commit_locally(&self, graph: &mut CanvasGraph) {
        for id in &self.new_nodes {
            if let Some(node) = graph.node_mut(id) {
                node.draft = false;
            }
        }
        for id in &self.new_edges {
            if let Some(edge) = graph.edge_mut(id) {
                edge.draft = false;
            }
        }
        for (id, changes) in &self.task_updates {
            if let Some(node) = graph.node_mut(&CanvasId::Server(*id)) {
                node.apply(changes);
                node.status = PersistStatus::UpdatePending;
            }
        }
        for (id, source, target) in &self.dependency_updates {
            if let Some(edge) = graph.edge_mut(&CanvasId::Server(*id)) {
                edge.source = source.clone();
                edge.target = target.clone();
                edge.status = PersistStatus::UpdatePending;
            }
        }
        for id in &self.dependency_deletions {
            graph.remove_edge(&CanvasId::Server(*id));
        }
        for id in &self.task_deletions {
            graph.remove_node(&CanvasId::Server(*id));
        }
    }
}
