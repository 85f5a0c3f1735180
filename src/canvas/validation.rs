//! Edge validation hook
//!
//! Acyclicity is a convention by default. With `CyclePolicy::Reject` the
//! reconciler refuses edges that would close a cycle, and the store runs
//! [`find_cycle`] before committing dependency writes.

use super::error::CanvasError;
use super::models::{CanvasEdge, NodeId};
use super::traversal;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePolicy {
    #[default]
    Allow,
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeValidator {
    pub policy: CyclePolicy,
}

impl EdgeValidator {
    pub fn new(policy: CyclePolicy) -> Self {
        Self { policy }
    }

    pub fn from_reject_cycles(reject: bool) -> Self {
        Self::new(if reject {
            CyclePolicy::Reject
        } else {
            CyclePolicy::Allow
        })
    }

    /// Check a proposed `source -> target` edge against the current edges
    pub fn check(
        &self,
        edges: &[CanvasEdge],
        source: &NodeId,
        target: &NodeId,
    ) -> Result<(), CanvasError> {
        if source == target {
            return Err(CanvasError::SelfLoop(source.clone()));
        }
        if self.policy == CyclePolicy::Reject && traversal::reaches(edges, target, source) {
            return Err(CanvasError::CycleRejected {
                source_node: source.clone(),
                target_node: target.clone(),
            });
        }
        Ok(())
    }
}

/// Nodes of one directed cycle in `edges`, if any (sorted).
///
/// Uses strongly connected components: any component with more than one
/// member, or a node with a self edge, is cyclic.
pub fn find_cycle<N>(edges: &[(N, N)]) -> Option<Vec<N>>
where
    N: Copy + Ord + Hash + Debug,
{
    let graph: DiGraphMap<N, ()> = DiGraphMap::from_edges(edges.iter().copied());
    petgraph::algo::tarjan_scc(&graph)
        .into_iter()
        .find(|scc| scc.len() > 1 || scc.iter().any(|n| graph.contains_edge(*n, *n)))
        .map(|mut scc| {
            scc.sort();
            scc
        })
}
