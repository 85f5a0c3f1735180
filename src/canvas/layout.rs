//! Layered left-to-right layout
//!
//! 1. Edges with a missing endpoint (and self edges) are dropped.
//! 2. Cycles are broken by removing DFS back edges.
//! 3. Rank = longest path from any source.
//! 4. Nodes within a rank are ordered by alternating barycentre sweeps.
//! 5. Rank maps to x, order within the rank maps to y, centred per column.

use super::models::{NodeId, Position};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, Control, DfsEvent};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const SWEEPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_width: f64,
    pub node_height: f64,
    /// Horizontal gap between ranks
    pub rank_separation: f64,
    /// Vertical gap between nodes of one rank
    pub node_separation: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 180.0,
            node_height: 60.0,
            rank_separation: 80.0,
            node_separation: 30.0,
        }
    }
}

/// Compute a position for every node in `nodes`
pub fn layered_layout(
    nodes: &[NodeId],
    edges: &[(NodeId, NodeId)],
    config: &LayoutConfig,
) -> HashMap<NodeId, Position> {
    if nodes.is_empty() {
        return HashMap::new();
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut index: HashMap<&NodeId, NodeIndex> = HashMap::new();
    for (i, id) in nodes.iter().enumerate() {
        index.entry(id).or_insert_with(|| graph.add_node(i));
    }
    for (source, target) in edges {
        if let (Some(&s), Some(&t)) = (index.get(source), index.get(target)) {
            if s != t && graph.find_edge(s, t).is_none() {
                graph.add_edge(s, t, ());
            }
        }
    }

    let dag = break_cycles(&graph);
    let ranks = longest_path_ranks(&dag);
    let layers = order_layers(&dag, &ranks);

    let column_step = config.node_width + config.rank_separation;
    let row_step = config.node_height + config.node_separation;
    let tallest = layers.iter().map(Vec::len).max().unwrap_or(0) as f64;

    let mut positions = HashMap::with_capacity(nodes.len());
    for (rank, layer) in layers.iter().enumerate() {
        let offset = (tallest - layer.len() as f64) * row_step / 2.0;
        for (order, idx) in layer.iter().enumerate() {
            let id = &nodes[dag[*idx]];
            positions.insert(
                id.clone(),
                Position::new(rank as f64 * column_step, offset + order as f64 * row_step),
            );
        }
    }
    positions
}

/// Push laid-out nodes down a row at a time until none overlaps a fixed
/// node or an earlier-placed one. Columns are settled left to right, top
/// to bottom.
pub fn avoid_fixed(
    positions: &mut HashMap<NodeId, Position>,
    fixed: &[Position],
    config: &LayoutConfig,
) {
    if fixed.is_empty() {
        return;
    }
    let row_step = config.node_height + config.node_separation;
    let mut order: Vec<(NodeId, Position)> = positions
        .iter()
        .map(|(id, p)| (id.clone(), *p))
        .collect();
    order.sort_by(|a, b| a.1.x.total_cmp(&b.1.x).then(a.1.y.total_cmp(&b.1.y)));

    let mut occupied: Vec<Position> = fixed.to_vec();
    for (id, mut position) in order {
        while occupied.iter().any(|o| overlaps(o, &position, config)) {
            position.y += row_step;
        }
        occupied.push(position);
        positions.insert(id, position);
    }
}

/// Whether two node rectangles share any area
pub fn overlaps(a: &Position, b: &Position, config: &LayoutConfig) -> bool {
    a.x < b.x + config.node_width
        && b.x < a.x + config.node_width
        && a.y < b.y + config.node_height
        && b.y < a.y + config.node_height
}

/// Copy of `graph` without its DFS back edges
fn break_cycles(graph: &DiGraph<usize, ()>) -> DiGraph<usize, ()> {
    let mut back_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
    depth_first_search(graph, graph.node_indices(), |event| {
        if let DfsEvent::BackEdge(u, v) = event {
            back_edges.insert((u, v));
        }
        Control::<()>::Continue
    });

    let mut dag = graph.clone();
    dag.retain_edges(|g, e| match g.edge_endpoints(e) {
        Some(endpoints) => !back_edges.contains(&endpoints),
        None => true,
    });
    dag
}

fn longest_path_ranks(dag: &DiGraph<usize, ()>) -> Vec<usize> {
    let mut rank = vec![0usize; dag.node_count()];
    let order = match toposort(dag, None) {
        Ok(order) => order,
        // Unreachable after cycle breaking; fall back to a single column
        Err(_) => return rank,
    };
    for node in order {
        let next = rank[node.index()] + 1;
        for succ in dag.neighbors_directed(node, Direction::Outgoing) {
            if rank[succ.index()] < next {
                rank[succ.index()] = next;
            }
        }
    }
    rank
}

fn order_layers(dag: &DiGraph<usize, ()>, ranks: &[usize]) -> Vec<Vec<NodeIndex>> {
    let depth = ranks.iter().copied().max().map_or(0, |r| r + 1);
    let mut layers: Vec<Vec<NodeIndex>> = vec![Vec::new(); depth];
    for idx in dag.node_indices() {
        layers[ranks[idx.index()]].push(idx);
    }

    let mut slot = vec![0usize; dag.node_count()];
    let refresh = |layers: &Vec<Vec<NodeIndex>>, slot: &mut Vec<usize>| {
        for layer in layers {
            for (i, idx) in layer.iter().enumerate() {
                slot[idx.index()] = i;
            }
        }
    };
    refresh(&layers, &mut slot);

    for sweep in 0..SWEEPS {
        let (direction, ranks_in_order): (Direction, Vec<usize>) = if sweep % 2 == 0 {
            (Direction::Incoming, (1..depth).collect())
        } else {
            (Direction::Outgoing, (0..depth.saturating_sub(1)).rev().collect())
        };
        for r in ranks_in_order {
            let mut keyed: Vec<(f64, NodeIndex)> = layers[r]
                .iter()
                .map(|idx| {
                    let neighbours: Vec<usize> = dag
                        .neighbors_directed(*idx, direction)
                        .map(|n| slot[n.index()])
                        .collect();
                    let key = if neighbours.is_empty() {
                        slot[idx.index()] as f64
                    } else {
                        neighbours.iter().sum::<usize>() as f64 / neighbours.len() as f64
                    };
                    (key, *idx)
                })
                .collect();
            keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
            layers[r] = keyed.into_iter().map(|(_, idx)| idx).collect();
            refresh(&layers, &mut slot);
        }
    }
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::models::CanvasId;

    fn ids(values: &[i64]) -> Vec<NodeId> {
        values.iter().map(|v| CanvasId::Server(*v)).collect()
    }

    fn pairs(values: &[(i64, i64)]) -> Vec<(NodeId, NodeId)> {
        values
            .iter()
            .map(|(s, t)| (CanvasId::Server(*s), CanvasId::Server(*t)))
            .collect()
    }

    fn at(positions: &HashMap<NodeId, Position>, id: i64) -> Position {
        positions[&CanvasId::Server(id)]
    }

    #[test]
    fn test_chain_is_left_to_right() {
        let layout = layered_layout(&ids(&[1, 2, 3]), &pairs(&[(1, 2), (2, 3)]), &LayoutConfig::default());
        assert!(at(&layout, 1).x < at(&layout, 2).x);
        assert!(at(&layout, 2).x < at(&layout, 3).x);
    }

    #[test]
    fn test_rank_is_longest_path() {
        // 1 -> 2 -> 3 and 1 -> 3: node 3 sits in rank 2, not rank 1
        let config = LayoutConfig::default();
        let layout = layered_layout(&ids(&[1, 2, 3]), &pairs(&[(1, 2), (2, 3), (1, 3)]), &config);
        let step = config.node_width + config.rank_separation;
        assert_eq!(at(&layout, 3).x, 2.0 * step);
    }

    #[test]
    fn test_positions_do_not_overlap() {
        let nodes = ids(&[1, 2, 3, 4, 5, 6]);
        let edges = pairs(&[(1, 3), (2, 3), (3, 4), (3, 5), (1, 6)]);
        let layout = layered_layout(&nodes, &edges, &LayoutConfig::default());
        assert_eq!(layout.len(), nodes.len());

        let mut seen = HashSet::new();
        for p in layout.values() {
            assert!(seen.insert((p.x.to_bits(), p.y.to_bits())));
        }
    }

    #[test]
    fn test_missing_endpoints_are_ignored() {
        let layout = layered_layout(&ids(&[1, 2]), &pairs(&[(1, 99), (98, 2), (1, 2)]), &LayoutConfig::default());
        assert_eq!(layout.len(), 2);
        assert!(at(&layout, 1).x < at(&layout, 2).x);
    }

    #[test]
    fn test_cycle_is_broken() {
        let layout = layered_layout(&ids(&[1, 2, 3]), &pairs(&[(1, 2), (2, 3), (3, 1)]), &LayoutConfig::default());
        assert_eq!(layout.len(), 3);
        // DFS from 1 removes 3 -> 1, leaving the chain 1, 2, 3
        assert!(at(&layout, 1).x < at(&layout, 2).x);
        assert!(at(&layout, 2).x < at(&layout, 3).x);
    }

    #[test]
    fn test_barycentre_reduces_crossings() {
        // 1 -> 4, 2 -> 3: second rank should be reordered to [4, 3]
        let layout = layered_layout(&ids(&[1, 2, 3, 4]), &pairs(&[(1, 4), (2, 3)]), &LayoutConfig::default());
        assert!(at(&layout, 1).y < at(&layout, 2).y);
        assert!(at(&layout, 4).y < at(&layout, 3).y);
    }

    #[test]
    fn test_fixed_rectangles_push_column_down() {
        let config = LayoutConfig::default();
        let mut layout = layered_layout(&ids(&[2, 3]), &pairs(&[(2, 3)]), &config);
        let fixed = [Position::new(260.0, 30.0)];
        avoid_fixed(&mut layout, &fixed, &config);

        assert_eq!(at(&layout, 2), Position::new(0.0, 0.0));
        let moved = at(&layout, 3);
        assert_eq!(moved.x, 260.0);
        assert!(!overlaps(&moved, &fixed[0], &config));
        assert!(moved.y >= 30.0 + config.node_height);
    }

    #[test]
    fn test_shifted_nodes_do_not_land_on_each_other() {
        let config = LayoutConfig::default();
        let mut layout = layered_layout(&ids(&[1, 2, 3]), &[], &config);
        avoid_fixed(&mut layout, &[Position::new(0.0, 0.0)], &config);

        let placed: Vec<Position> = layout.values().copied().collect();
        for (i, a) in placed.iter().enumerate() {
            assert!(!overlaps(a, &Position::new(0.0, 0.0), &config));
            for b in &placed[i + 1..] {
                assert!(!overlaps(a, b, &config));
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(layered_layout(&[], &[], &LayoutConfig::default()).is_empty());
    }
}
