//! Copy/paste buffer
//!
//! Only internal edges (both endpoints selected) are captured. Paste
//! recreates the nodes under fresh temporary ids, keeps their pairwise
//! offsets and centres the bounding box on the cursor.

use super::models::{CanvasEdge, CanvasId, CanvasNode, NodeId, PersistStatus, Position};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardNode {
    pub source: NodeId,
    pub title: String,
    pub position: Position,
    pub completed: bool,
    pub color: Option<String>,
    pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Clipboard {
    pub nodes: Vec<ClipboardNode>,
    pub edges: Vec<(NodeId, NodeId)>,
}

/// Nodes and edges ready to be inserted by a paste
#[derive(Debug, Clone)]
pub struct PastePlan {
    pub nodes: Vec<CanvasNode>,
    pub edges: Vec<CanvasEdge>,
}

impl Clipboard {
    /// Capture the selected, non-draft nodes and the edges between them
    pub fn capture(nodes: &[CanvasNode], edges: &[CanvasEdge], selection: &HashSet<NodeId>) -> Self {
        let captured: Vec<ClipboardNode> = nodes
            .iter()
            .filter(|n| selection.contains(&n.id) && !n.draft)
            .map(|n| ClipboardNode {
                source: n.id.clone(),
                title: n.title.clone(),
                position: n.position,
                completed: n.completed,
                color: n.color.clone(),
                locked: n.locked,
            })
            .collect();
        let members: HashSet<&NodeId> = captured.iter().map(|n| &n.source).collect();
        let internal = edges
            .iter()
            .filter(|e| !e.draft && members.contains(&e.source) && members.contains(&e.target))
            .map(|e| (e.source.clone(), e.target.clone()))
            .collect();
        Self {
            nodes: captured,
            edges: internal,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Centre of the bounding box of the captured positions
    pub fn centroid(&self) -> Option<Position> {
        let first = self.nodes.first()?.position;
        let (mut min, mut max) = (first, first);
        for node in &self.nodes[1..] {
            min.x = min.x.min(node.position.x);
            min.y = min.y.min(node.position.y);
            max.x = max.x.max(node.position.x);
            max.y = max.y.max(node.position.y);
        }
        Some(Position::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0))
    }

    /// Duplicate the buffer with the bounding-box centroid at `cursor`
    pub fn instantiate(&self, cursor: Position) -> PastePlan {
        let Some(centre) = self.centroid() else {
            return PastePlan {
                nodes: Vec::new(),
                edges: Vec::new(),
            };
        };
        let (dx, dy) = (cursor.x - centre.x, cursor.y - centre.y);

        let mut substitution: HashMap<&NodeId, NodeId> = HashMap::with_capacity(self.nodes.len());
        let nodes = self
            .nodes
            .iter()
            .map(|n| {
                let id = CanvasId::temp();
                substitution.insert(&n.source, id.clone());
                CanvasNode {
                    id,
                    title: n.title.clone(),
                    position: Position::new(n.position.x + dx, n.position.y + dy),
                    completed: n.completed,
                    color: n.color.clone(),
                    locked: n.locked,
                    status: PersistStatus::Pending,
                    draft: false,
                }
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .filter_map(|(s, t)| {
                Some(CanvasEdge::pending(
                    substitution.get(s)?.clone(),
                    substitution.get(t)?.clone(),
                ))
            })
            .collect();
        PastePlan { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, x: f64, y: f64) -> CanvasNode {
        CanvasNode {
            id: CanvasId::Server(id),
            status: PersistStatus::Confirmed,
            ..CanvasNode::pending(format!("T{id}"), Position::new(x, y))
        }
    }

    fn edge(source: i64, target: i64) -> CanvasEdge {
        CanvasEdge::pending(source.into(), target.into())
    }

    fn select(ids: &[i64]) -> HashSet<NodeId> {
        ids.iter().map(|i| CanvasId::Server(*i)).collect()
    }

    #[test]
    fn test_capture_keeps_internal_edges_only() {
        let nodes = vec![node(1, 0.0, 0.0), node(2, 100.0, 0.0), node(3, 200.0, 0.0)];
        let edges = vec![edge(1, 2), edge(2, 3)];
        let clip = Clipboard::capture(&nodes, &edges, &select(&[1, 2]));
        assert_eq!(clip.nodes.len(), 2);
        assert_eq!(clip.edges, vec![(CanvasId::Server(1), CanvasId::Server(2))]);
    }

    #[test]
    fn test_capture_skips_draft_nodes() {
        let mut draft = node(2, 0.0, 0.0);
        draft.draft = true;
        let nodes = vec![node(1, 0.0, 0.0), draft];
        let clip = Clipboard::capture(&nodes, &[edge(1, 2)], &select(&[1, 2]));
        assert_eq!(clip.nodes.len(), 1);
        assert!(clip.edges.is_empty());
    }

    #[test]
    fn test_instantiate_centres_on_cursor_and_keeps_offsets() {
        let nodes = vec![node(1, 0.0, 0.0), node(2, 100.0, 40.0), node(3, 50.0, 200.0)];
        let clip = Clipboard::capture(&nodes, &[edge(1, 2), edge(2, 3)], &select(&[1, 2, 3]));
        let plan = clip.instantiate(Position::new(500.0, 500.0));

        assert_eq!(plan.nodes.len(), 3);
        assert!(plan.nodes.iter().all(|n| n.id.is_temp()));

        let xs: Vec<f64> = plan.nodes.iter().map(|n| n.position.x).collect();
        let ys: Vec<f64> = plan.nodes.iter().map(|n| n.position.y).collect();
        let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(((min_x + max_x) / 2.0, (min_y + max_y) / 2.0), (500.0, 500.0));

        // Pairwise offsets preserved
        assert_eq!(xs[1] - xs[0], 100.0);
        assert_eq!(ys[2] - ys[1], 160.0);

        // Edges remapped onto the new ids
        assert_eq!(plan.edges.len(), 2);
        assert_eq!(plan.edges[0].source, plan.nodes[0].id);
        assert_eq!(plan.edges[0].target, plan.nodes[1].id);
        assert_eq!(plan.edges[1].target, plan.nodes[2].id);
    }

    #[test]
    fn test_empty_clipboard_instantiates_nothing() {
        let plan = Clipboard::default().instantiate(Position::new(1.0, 1.0));
        assert!(plan.nodes.is_empty());
        assert!(plan.edges.is_empty());
    }
}
