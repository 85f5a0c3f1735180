//! Forward reachability and readiness over the canvas edge list.
//!
//! The edge relation is not guaranteed acyclic, so every walk carries a
//! visited set.

use super::models::{CanvasEdge, CanvasNode, EdgeId, NodeId};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Successor lists keyed by source node, in edge order
pub fn successors(edges: &[CanvasEdge]) -> HashMap<&NodeId, Vec<&NodeId>> {
    let mut map: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for edge in edges {
        map.entry(&edge.source).or_default().push(&edge.target);
    }
    map
}

/// Every node reachable from `start` by following edges source -> target,
/// `start` included, in depth-first discovery order.
pub fn reachable_from(edges: &[CanvasEdge], start: &NodeId) -> Vec<NodeId> {
    let succ = successors(edges);
    let mut visited: HashSet<&NodeId> = HashSet::new();
    let mut order = Vec::new();
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        order.push(current.clone());
        if let Some(next) = succ.get(current) {
            // Reverse so the first edge is explored first
            for target in next.iter().rev() {
                if !visited.contains(*target) {
                    stack.push(*target);
                }
            }
        }
    }
    order
}

/// True if `to` is reachable from `from`
pub fn reaches(edges: &[CanvasEdge], from: &NodeId, to: &NodeId) -> bool {
    reachable_from(edges, from).iter().any(|n| n == to)
}

/// Ids of edges with at least one endpoint in `nodes`
pub fn incident_edges(edges: &[CanvasEdge], nodes: &HashSet<NodeId>) -> Vec<EdgeId> {
    edges
        .iter()
        .filter(|e| nodes.contains(&e.source) || nodes.contains(&e.target))
        .map(|e| e.id.clone())
        .collect()
}

/// Nodes that are actionable now.
///
/// A node is ready when it is not completed and every incoming edge starts
/// at a completed node. Only direct predecessors are considered. Edges whose
/// source is not in `nodes` are ignored.
pub fn compute_ready_tasks(nodes: &[CanvasNode], edges: &[CanvasEdge]) -> BTreeSet<NodeId> {
    let completed: HashMap<&NodeId, bool> = nodes.iter().map(|n| (&n.id, n.completed)).collect();

    let mut blocked: HashSet<&NodeId> = HashSet::new();
    for edge in edges {
        if let Some(false) = completed.get(&edge.source) {
            blocked.insert(&edge.target);
        }
    }

    nodes
        .iter()
        .filter(|n| !n.completed && !blocked.contains(&n.id))
        .map(|n| n.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::models::{CanvasId, PersistStatus, Position};

    fn node(id: i64, completed: bool) -> CanvasNode {
        CanvasNode {
            id: CanvasId::Server(id),
            completed,
            status: PersistStatus::Confirmed,
            ..CanvasNode::pending(format!("T{id}"), Position::default())
        }
    }

    fn edge(source: i64, target: i64) -> CanvasEdge {
        CanvasEdge::pending(source.into(), target.into())
    }

    fn ids(values: &[i64]) -> Vec<NodeId> {
        values.iter().map(|v| CanvasId::Server(*v)).collect()
    }

    #[test]
    fn test_reachable_from_follows_forward_edges_only() {
        // 1 -> 2 -> 3, 4 -> 2
        let edges = vec![edge(1, 2), edge(2, 3), edge(4, 2)];
        let mut reached = reachable_from(&edges, &CanvasId::Server(2));
        reached.sort();
        assert_eq!(reached, ids(&[2, 3]));
    }

    #[test]
    fn test_reachable_from_leaf_is_just_itself() {
        let edges = vec![edge(1, 2)];
        assert_eq!(reachable_from(&edges, &CanvasId::Server(2)), ids(&[2]));
    }

    #[test]
    fn test_reachable_from_terminates_on_cycle() {
        let edges = vec![edge(1, 2), edge(2, 3), edge(3, 1), edge(3, 4)];
        let mut reached = reachable_from(&edges, &CanvasId::Server(1));
        reached.sort();
        assert_eq!(reached, ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_reachable_from_diamond_visits_once() {
        let edges = vec![edge(1, 2), edge(1, 3), edge(2, 4), edge(3, 4)];
        let reached = reachable_from(&edges, &CanvasId::Server(1));
        assert_eq!(reached.len(), 4);
        assert_eq!(reached[0], CanvasId::Server(1));
        assert_eq!(reached[1], CanvasId::Server(2));
    }

    #[test]
    fn test_ready_without_incoming_edges() {
        let nodes = vec![node(1, false), node(2, true)];
        let ready = compute_ready_tasks(&nodes, &[]);
        assert_eq!(ready.into_iter().collect::<Vec<_>>(), ids(&[1]));
    }

    #[test]
    fn test_ready_requires_all_predecessors_completed() {
        // 1(done) -> 3, 2(open) -> 3, 1(done) -> 4
        let nodes = vec![node(1, true), node(2, false), node(3, false), node(4, false)];
        let edges = vec![edge(1, 3), edge(2, 3), edge(1, 4)];
        let ready = compute_ready_tasks(&nodes, &edges);
        assert_eq!(ready.into_iter().collect::<Vec<_>>(), ids(&[2, 4]));
    }

    #[test]
    fn test_ready_is_one_hop_only() {
        // 1(open) -> 2(done) -> 3: 3 is ready even though 1 is open
        let nodes = vec![node(1, false), node(2, true), node(3, false)];
        let edges = vec![edge(1, 2), edge(2, 3)];
        let ready = compute_ready_tasks(&nodes, &edges);
        assert!(ready.contains(&CanvasId::Server(3)));
        assert!(ready.contains(&CanvasId::Server(1)));
        assert!(!ready.contains(&CanvasId::Server(2)));
    }

    #[test]
    fn test_incident_edges() {
        let edges = vec![edge(1, 2), edge(2, 3), edge(4, 5)];
        let set: HashSet<NodeId> = ids(&[2]).into_iter().collect();
        assert_eq!(incident_edges(&edges, &set).len(), 2);
    }
}
