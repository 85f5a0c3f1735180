//! Graph state reconciler
//!
//! Owns the in-memory node/edge state, applies editing gestures
//! optimistically and drives them through a [`Persistence`] backend.
//!
//! Failure policy is uniform: when a write fails, the entities it touched are
//! restored to their pre-gesture state and the error is returned. Gestures
//! that touch several entities persist as one bulk change, except
//! `set_completed` and `auto_arrange` which issue one call per node.

use super::checksum::{self, CanonicalGraph, DivergenceReport};
use super::clipboard::Clipboard;
use super::draft::DraftOverlay;
use super::error::{CanvasError, CanvasResult};
use super::layout::{avoid_fixed, layered_layout, LayoutConfig};
use super::models::{
    CanvasEdge, CanvasGraph, CanvasId, CanvasNode, EdgeId, NodeId, PersistStatus, Position,
};
use super::persistence::Persistence;
use super::traversal;
use super::validation::EdgeValidator;
use crate::planner::PlanProposal;
use crate::store::{
    BulkChangeRequest, BulkChangeResponse, BulkDependencyCreate, BulkTaskCreate,
    CreateTaskRequest, TaskNode, UpdateTaskRequest,
};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// A node inserted optimistically, waiting for its create acknowledgement
#[derive(Debug, Clone)]
pub struct PendingNode {
    pub id: NodeId,
    pub request: CreateTaskRequest,
}

pub struct GraphReconciler<P: Persistence> {
    persistence: P,
    graph: CanvasGraph,
    selection: HashSet<NodeId>,
    clipboard: Clipboard,
    draft: Option<DraftOverlay>,
    validator: EdgeValidator,
    layout: LayoutConfig,
}

impl<P: Persistence> GraphReconciler<P> {
    pub fn new(persistence: P, graph: CanvasGraph) -> Self {
        Self {
            persistence,
            graph,
            selection: HashSet::new(),
            clipboard: Clipboard::default(),
            draft: None,
            validator: EdgeValidator::default(),
            layout: LayoutConfig::default(),
        }
    }

    /// Start from the backend's current snapshot
    pub async fn load(persistence: P) -> CanvasResult<Self> {
        let snapshot = persistence.load_graph().await?;
        info!(
            project_id = snapshot.project_id,
            tasks = snapshot.tasks.len(),
            dependencies = snapshot.dependencies.len(),
            "Loaded project graph"
        );
        let graph = CanvasGraph::from(&snapshot);
        Ok(Self::new(persistence, graph))
    }

    pub fn with_validator(mut self, validator: EdgeValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_layout(mut self, layout: LayoutConfig) -> Self {
        self.layout = layout;
        self
    }

    pub fn graph(&self) -> &CanvasGraph {
        &self.graph
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn draft(&self) -> Option<&DraftOverlay> {
        self.draft.as_ref()
    }

    pub fn selection(&self) -> &HashSet<NodeId> {
        &self.selection
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    /// Authoritative id of an existing node
    fn confirmed_id(&self, id: &NodeId) -> CanvasResult<i64> {
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| CanvasError::NodeNotFound(id.clone()))?;
        match node.id.server_id() {
            Some(server) if !node.draft => Ok(server),
            _ => Err(CanvasError::Unconfirmed(id.clone())),
        }
    }

    // ========================================================================
    // Node creation
    // ========================================================================

    /// Insert a node under a temporary id. The caller sends `request` and
    /// hands the outcome to [`complete_add_node`](Self::complete_add_node).
    pub fn begin_add_node(&mut self, title: impl Into<String>, position: Position) -> PendingNode {
        let node = CanvasNode::pending(title, position);
        let pending = PendingNode {
            id: node.id.clone(),
            request: CreateTaskRequest::from(&node),
        };
        debug!(node = %pending.id, "Optimistic node inserted");
        self.graph.nodes.push(node);
        pending
    }

    /// Apply a create acknowledgement. Only the entry keyed by `temp_id` is
    /// touched, so acks may arrive in any order.
    pub fn complete_add_node(
        &mut self,
        temp_id: &NodeId,
        result: anyhow::Result<TaskNode>,
    ) -> CanvasResult<NodeId> {
        match result {
            Ok(task) => {
                if !self.graph.contains_node(temp_id) {
                    warn!(node = %temp_id, task_id = task.id, "Ack for a node that is gone");
                    return Err(CanvasError::NodeNotFound(temp_id.clone()));
                }
                let confirmed = CanvasId::Server(task.id);
                self.graph.remap_node(temp_id, confirmed.clone());
                if let Some(node) = self.graph.node_mut(&confirmed) {
                    node.status = PersistStatus::Confirmed;
                }
                if self.selection.remove(temp_id) {
                    self.selection.insert(confirmed.clone());
                }
                debug!(node = %temp_id, task_id = task.id, "Node confirmed");
                Ok(confirmed)
            }
            Err(err) => {
                warn!(node = %temp_id, error = %err, "Create failed, rolling back node");
                if let Some((mut node, _)) = self.graph.remove_node(temp_id) {
                    node.status = PersistStatus::RolledBack;
                    debug!(node = %node.id, status = ?node.status, "Optimistic node removed");
                }
                self.selection.remove(temp_id);
                Err(CanvasError::Persistence(err))
            }
        }
    }

    pub async fn add_node(
        &mut self,
        title: impl Into<String>,
        position: Position,
    ) -> CanvasResult<NodeId> {
        let pending = self.begin_add_node(title, position);
        let result = self.persistence.create_task(&pending.request).await;
        self.complete_add_node(&pending.id, result)
    }

    // ========================================================================
    // Edges
    // ========================================================================

    pub async fn connect(&mut self, source: &NodeId, target: &NodeId) -> CanvasResult<EdgeId> {
        if source == target {
            return Err(CanvasError::SelfLoop(source.clone()));
        }
        let from_task = self.confirmed_id(source)?;
        let to_task = self.confirmed_id(target)?;
        let duplicate = self
            .graph
            .edges
            .iter()
            .any(|e| !e.draft && &e.source == source && &e.target == target);
        if duplicate {
            return Err(CanvasError::DuplicateEdge {
                source_node: source.clone(),
                target_node: target.clone(),
            });
        }
        let committed: Vec<CanvasEdge> = self
            .graph
            .edges
            .iter()
            .filter(|e| !e.draft)
            .cloned()
            .collect();
        self.validator.check(&committed, source, target)?;

        let edge = CanvasEdge::pending(source.clone(), target.clone());
        let temp_id = edge.id.clone();
        self.graph.edges.push(edge);

        match self.persistence.create_dependency(from_task, to_task).await {
            Ok(dep) => {
                let confirmed = CanvasId::Server(dep.id);
                if let Some(edge) = self.graph.edge_mut(&temp_id) {
                    edge.id = confirmed.clone();
                    edge.status = PersistStatus::Confirmed;
                }
                Ok(confirmed)
            }
            Err(err) => {
                warn!(source = %source, target = %target, error = %err, "Connect failed, rolling back edge");
                self.graph.remove_edge(&temp_id);
                Err(CanvasError::Persistence(err))
            }
        }
    }

    pub async fn disconnect(&mut self, edge_id: &EdgeId) -> CanvasResult<()> {
        let edge = self
            .graph
            .edge(edge_id)
            .ok_or_else(|| CanvasError::EdgeNotFound(edge_id.clone()))?;
        let Some(dependency_id) = edge.id.server_id().filter(|_| !edge.draft) else {
            return Err(CanvasError::Unconfirmed(edge_id.clone()));
        };

        let snapshot = self.graph.clone();
        self.graph.remove_edge(edge_id);
        if let Err(err) = self.persistence.delete_dependency(dependency_id).await {
            warn!(edge = %edge_id, error = %err, "Disconnect failed, restoring edge");
            self.graph = snapshot;
            return Err(CanvasError::Persistence(err));
        }
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Delete a node and every edge touching it
    pub async fn delete_node(&mut self, id: &NodeId) -> CanvasResult<()> {
        let task_id = self.confirmed_id(id)?;
        let snapshot = self.graph.clone();
        self.graph.remove_node(id);

        if let Err(err) = self.persistence.delete_task(task_id).await {
            warn!(node = %id, error = %err, "Delete failed, restoring node");
            self.graph = snapshot;
            return Err(CanvasError::Persistence(err));
        }
        self.selection.remove(id);
        Ok(())
    }

    /// Delete `id` and everything reachable from it along forward edges.
    /// Returns the removed node ids in discovery order.
    pub async fn delete_subtree(&mut self, id: &NodeId) -> CanvasResult<Vec<NodeId>> {
        self.confirmed_id(id)?;
        let committed: Vec<CanvasEdge> = self
            .graph
            .edges
            .iter()
            .filter(|e| !e.draft)
            .cloned()
            .collect();
        let reachable = traversal::reachable_from(&committed, id);
        self.delete_nodes(&reachable).await?;
        Ok(reachable)
    }

    /// Remove several nodes as one bulk change
    async fn delete_nodes(&mut self, ids: &[NodeId]) -> CanvasResult<()> {
        let mut task_ids = Vec::with_capacity(ids.len());
        for id in ids {
            task_ids.push(self.confirmed_id(id)?);
        }
        let members: HashSet<NodeId> = ids.iter().cloned().collect();
        let dependency_ids: Vec<i64> = traversal::incident_edges(&self.graph.edges, &members)
            .iter()
            .filter_map(CanvasId::server_id)
            .collect();
        let request = BulkChangeRequest {
            deleted_task_ids: task_ids,
            deleted_dependency_ids: dependency_ids,
            ..Default::default()
        };

        let snapshot = self.graph.clone();
        for id in ids {
            self.graph.remove_node(id);
        }
        if let Err(err) = self.persistence.bulk_change(&request).await {
            warn!(nodes = ids.len(), error = %err, "Batch delete failed, restoring nodes");
            self.graph = snapshot;
            return Err(CanvasError::Persistence(err));
        }
        for id in ids {
            self.selection.remove(id);
        }
        Ok(())
    }

    // ========================================================================
    // Field updates
    // ========================================================================

    /// Apply `changes` locally, persist, restore the node on failure
    async fn persist_update(&mut self, id: &NodeId, changes: UpdateTaskRequest) -> CanvasResult<()> {
        let task_id = self.confirmed_id(id)?;
        let node = self
            .graph
            .node_mut(id)
            .ok_or_else(|| CanvasError::NodeNotFound(id.clone()))?;
        let before = node.clone();
        node.apply(&changes);
        node.status = PersistStatus::UpdatePending;

        let result = self.persistence.update_task(task_id, &changes).await;
        let Some(node) = self.graph.node_mut(id) else {
            return Ok(());
        };
        match result {
            Ok(_) => {
                node.status = PersistStatus::Confirmed;
                Ok(())
            }
            Err(err) => {
                warn!(node = %id, error = %err, "Update failed, restoring node");
                *node = before;
                Err(CanvasError::Persistence(err))
            }
        }
    }

    /// Flip the completion flag; returns the new value
    pub async fn toggle_completed(&mut self, id: &NodeId) -> CanvasResult<bool> {
        let current = self
            .graph
            .node(id)
            .ok_or_else(|| CanvasError::NodeNotFound(id.clone()))?
            .completed;
        self.persist_update(
            id,
            UpdateTaskRequest {
                completed: Some(!current),
                ..Default::default()
            },
        )
        .await?;
        Ok(!current)
    }

    /// Set the completion flag on several nodes, one write per node in the
    /// given order. Stops at the first failure; earlier writes stand.
    pub async fn set_completed(&mut self, ids: &[NodeId], value: bool) -> CanvasResult<()> {
        for id in ids {
            self.confirmed_id(id)?;
        }
        for id in ids {
            self.persist_update(
                id,
                UpdateTaskRequest {
                    completed: Some(value),
                    ..Default::default()
                },
            )
            .await?;
        }
        Ok(())
    }

    /// Recolor a node. Returns false, without any write, when the color is
    /// already set.
    pub async fn update_color(&mut self, id: &NodeId, color: Option<String>) -> CanvasResult<bool> {
        let node = self
            .graph
            .node(id)
            .ok_or_else(|| CanvasError::NodeNotFound(id.clone()))?;
        if node.color == color {
            return Ok(false);
        }
        self.persist_update(
            id,
            UpdateTaskRequest {
                color: Some(color),
                ..Default::default()
            },
        )
        .await?;
        Ok(true)
    }

    pub async fn rename_node(&mut self, id: &NodeId, title: impl Into<String>) -> CanvasResult<()> {
        self.persist_update(
            id,
            UpdateTaskRequest {
                title: Some(title.into()),
                ..Default::default()
            },
        )
        .await
    }

    /// Drag gesture
    pub async fn move_node(&mut self, id: &NodeId, position: Position) -> CanvasResult<()> {
        self.persist_update(
            id,
            UpdateTaskRequest {
                x: Some(position.x),
                y: Some(position.y),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_locked(&mut self, id: &NodeId, locked: bool) -> CanvasResult<()> {
        self.persist_update(
            id,
            UpdateTaskRequest {
                locked: Some(locked),
                ..Default::default()
            },
        )
        .await
    }

    // ========================================================================
    // Layout
    // ========================================================================

    /// Layered left-to-right layout of the non-draft graph.
    ///
    /// Locked and unconfirmed nodes keep their place. Every other node whose
    /// position changes is persisted with its own update call; failed nodes
    /// are restored and the first error is returned after all calls ran.
    pub async fn auto_arrange(&mut self) -> CanvasResult<Vec<NodeId>> {
        // Locked and unconfirmed nodes keep their place and block it
        let (free, fixed): (Vec<&CanvasNode>, Vec<&CanvasNode>) = self
            .graph
            .nodes
            .iter()
            .filter(|n| !n.draft)
            .partition(|n| !n.locked && !n.id.is_temp());
        let ids: Vec<NodeId> = free.iter().map(|n| n.id.clone()).collect();
        let occupied: Vec<Position> = fixed.iter().map(|n| n.position).collect();
        let edges: Vec<(NodeId, NodeId)> = self
            .graph
            .edges
            .iter()
            .filter(|e| !e.draft)
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        let mut positions = layered_layout(&ids, &edges, &self.layout);
        avoid_fixed(&mut positions, &occupied, &self.layout);

        let mut moved = Vec::new();
        let mut first_error = None;
        for id in ids {
            let (Some(target), Some(node)) = (positions.get(&id), self.graph.node(&id)) else {
                continue;
            };
            if node.position == *target {
                continue;
            }
            let changes = UpdateTaskRequest {
                x: Some(target.x),
                y: Some(target.y),
                ..Default::default()
            };
            match self.persist_update(&id, changes).await {
                Ok(()) => moved.push(id),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        debug!(moved = moved.len(), "Auto-arrange finished");
        match first_error {
            Some(err) => Err(err),
            None => Ok(moved),
        }
    }

    // ========================================================================
    // Selection & clipboard
    // ========================================================================

    pub fn select(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        self.selection = ids
            .into_iter()
            .filter(|id| self.graph.contains_node(id))
            .collect();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    /// Capture the selection; returns the number of captured nodes
    pub fn copy_selection(&mut self) -> usize {
        self.clipboard = Clipboard::capture(&self.graph.nodes, &self.graph.edges, &self.selection);
        self.clipboard.nodes.len()
    }

    /// Copy, then delete the captured nodes as one bulk change
    pub async fn cut_selection(&mut self) -> CanvasResult<usize> {
        let ids: Vec<NodeId> = self
            .graph
            .nodes
            .iter()
            .filter(|n| self.selection.contains(&n.id) && !n.draft)
            .map(|n| n.id.clone())
            .collect();
        for id in &ids {
            self.confirmed_id(id)?;
        }
        let previous = std::mem::take(&mut self.clipboard);
        let count = self.copy_selection();
        if count == 0 {
            return Ok(0);
        }
        if let Err(err) = self.delete_nodes(&ids).await {
            self.clipboard = previous;
            return Err(err);
        }
        Ok(count)
    }

    /// Paste the clipboard centred on `cursor`, persisted as one bulk change.
    /// The pasted nodes become the selection.
    pub async fn paste_selection(&mut self, cursor: Position) -> CanvasResult<Vec<NodeId>> {
        if self.clipboard.is_empty() {
            return Err(CanvasError::EmptyClipboard);
        }
        let plan = self.clipboard.instantiate(cursor);
        let request = BulkChangeRequest {
            created_tasks: plan
                .nodes
                .iter()
                .map(|n| BulkTaskCreate {
                    temp_id: n.id.to_string(),
                    task: n.into(),
                })
                .collect(),
            created_dependencies: plan
                .edges
                .iter()
                .map(|e| BulkDependencyCreate {
                    temp_id: e.id.to_string(),
                    from_task: (&e.source).into(),
                    to_task: (&e.target).into(),
                })
                .collect(),
            ..Default::default()
        };
        let temp_ids: Vec<NodeId> = plan.nodes.iter().map(|n| n.id.clone()).collect();

        let snapshot = self.graph.clone();
        self.graph.nodes.extend(plan.nodes);
        self.graph.edges.extend(plan.edges);

        let response = match self.persistence.bulk_change(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(nodes = temp_ids.len(), error = %err, "Paste failed, removing pasted nodes");
                self.graph = snapshot;
                return Err(CanvasError::Persistence(err));
            }
        };
        self.apply_id_maps(&response);

        let pasted: Vec<NodeId> = temp_ids
            .iter()
            .map(|tmp| {
                response
                    .task_ids
                    .get(&tmp.to_string())
                    .map_or_else(|| tmp.clone(), |id| CanvasId::Server(*id))
            })
            .collect();
        self.selection = pasted.iter().cloned().collect();
        Ok(pasted)
    }

    /// Replace temporary ids with the authoritative ids of a bulk change
    fn apply_id_maps(&mut self, response: &BulkChangeResponse) {
        for (temp, id) in &response.task_ids {
            let temp_id = CanvasId::Temp(temp.clone());
            let confirmed = CanvasId::Server(*id);
            self.graph.remap_node(&temp_id, confirmed.clone());
            if let Some(node) = self.graph.node_mut(&confirmed) {
                node.status = PersistStatus::Confirmed;
            }
        }
        for (temp, id) in &response.dependency_ids {
            if let Some(edge) = self.graph.edge_mut(&CanvasId::Temp(temp.clone())) {
                edge.id = CanvasId::Server(*id);
                edge.status = PersistStatus::Confirmed;
            }
        }
    }

    // ========================================================================
    // Draft overlay
    // ========================================================================

    /// Stage a planner proposal, replacing any current draft. Returns false
    /// when the proposal carries no change.
    pub fn propose(&mut self, proposal: &PlanProposal) -> bool {
        self.reject_draft();
        if !proposal.requires_changes {
            return false;
        }
        let overlay = DraftOverlay::stage(&mut self.graph, proposal);
        if overlay.is_empty() {
            return false;
        }
        self.draft = Some(overlay);
        true
    }

    /// Persist the draft as one bulk change. On failure the graph and the
    /// draft are both restored.
    pub async fn accept_draft(&mut self) -> CanvasResult<BulkChangeResponse> {
        let draft = self.draft.take().ok_or(CanvasError::NoDraft)?;
        let request = draft.to_bulk_request(&self.graph);

        let snapshot = self.graph.clone();
        draft.commit_locally(&mut self.graph);

        match self.persistence.bulk_change(&request).await {
            Ok(response) => {
                self.apply_id_maps(&response);
                for update in &request.updated_tasks {
                    if let Some(node) = self.graph.node_mut(&CanvasId::Server(update.id)) {
                        node.status = PersistStatus::Confirmed;
                    }
                }
                for update in &request.updated_dependencies {
                    if let Some(edge) = self.graph.edge_mut(&CanvasId::Server(update.id)) {
                        edge.status = PersistStatus::Confirmed;
                    }
                }
                info!(summary = %draft.summary, "Draft accepted");
                Ok(response)
            }
            Err(err) => {
                warn!(error = %err, "Draft accept failed, restoring draft");
                self.graph = snapshot;
                self.draft = Some(draft);
                Err(CanvasError::Persistence(err))
            }
        }
    }

    pub fn reject_draft(&mut self) {
        if let Some(draft) = self.draft.take() {
            draft.discard(&mut self.graph);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Ready tasks of the committed (non-draft) graph
    pub fn ready_tasks(&self) -> BTreeSet<NodeId> {
        let nodes: Vec<CanvasNode> = self
            .graph
            .nodes
            .iter()
            .filter(|n| !n.draft)
            .cloned()
            .collect();
        let edges: Vec<CanvasEdge> = self
            .graph
            .edges
            .iter()
            .filter(|e| !e.draft)
            .cloned()
            .collect();
        traversal::compute_ready_tasks(&nodes, &edges)
    }

    pub fn checksum(&self) -> String {
        CanonicalGraph::from(&self.graph).checksum()
    }

    /// Compare local state with an authoritative snapshot
    pub fn reconcile_with(&self, remote: &crate::store::ProjectGraph) -> DivergenceReport {
        let report = checksum::reconcile(
            &CanonicalGraph::from(&self.graph),
            &CanonicalGraph::from(remote),
        );
        if !report.is_consistent() {
            warn!(
                only_local = report.tasks.only_local.len(),
                only_remote = report.tasks.only_remote.len(),
                differing = report.tasks.differing.len(),
                "Local graph diverges from remote"
            );
        }
        report
    }

    /// Fetch the backend snapshot and compare
    pub async fn reconcile_remote(&self) -> CanvasResult<DivergenceReport> {
        let remote = self.persistence.load_graph().await?;
        Ok(self.reconcile_with(&remote))
    }
}
