//! Canonical hashing and divergence reports
//!
//! Both sides are reduced to a canonical form (saved entities only, integer
//! ids, sorted by id) before hashing, so insertion order never matters and
//! drafts or unsaved nodes never show up as divergence.

use super::models::CanvasGraph;
use crate::store::ProjectGraph;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTask {
    pub id: i64,
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub completed: bool,
    pub color: Option<String>,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalDependency {
    pub id: i64,
    pub from_task: i64,
    pub to_task: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalGraph {
    pub tasks: Vec<CanonicalTask>,
    pub dependencies: Vec<CanonicalDependency>,
}

impl CanonicalGraph {
    fn sorted(mut self) -> Self {
        self.tasks.sort_by_key(|t| t.id);
        self.dependencies.sort_by_key(|d| d.id);
        self
    }

    /// Hex SHA-256 of the canonical JSON encoding
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for task in &self.tasks {
            hasher.update(b"task:");
            hasher.update(canonical_bytes(task));
            hasher.update(b"\n");
        }
        for dep in &self.dependencies {
            hasher.update(b"dependency:");
            hasher.update(canonical_bytes(dep));
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

fn canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    // Plain structs of scalars always serialize
    serde_json::to_vec(value).unwrap_or_default()
}

impl From<&CanvasGraph> for CanonicalGraph {
    fn from(graph: &CanvasGraph) -> Self {
        let tasks = graph
            .nodes
            .iter()
            .filter(|n| n.is_saved())
            .filter_map(|n| {
                Some(CanonicalTask {
                    id: n.id.server_id()?,
                    title: n.title.clone(),
                    x: n.position.x,
                    y: n.position.y,
                    completed: n.completed,
                    color: n.color.clone(),
                    locked: n.locked,
                })
            })
            .collect();
        let dependencies = graph
            .edges
            .iter()
            .filter(|e| e.is_saved())
            .filter_map(|e| {
                Some(CanonicalDependency {
                    id: e.id.server_id()?,
                    from_task: e.source.server_id()?,
                    to_task: e.target.server_id()?,
                })
            })
            .collect();
        CanonicalGraph {
            tasks,
            dependencies,
        }
        .sorted()
    }
}

impl From<&ProjectGraph> for CanonicalGraph {
    fn from(graph: &ProjectGraph) -> Self {
        CanonicalGraph {
            tasks: graph
                .tasks
                .iter()
                .map(|t| CanonicalTask {
                    id: t.id,
                    title: t.title.clone(),
                    x: t.x,
                    y: t.y,
                    completed: t.completed,
                    color: t.color.clone(),
                    locked: t.locked,
                })
                .collect(),
            dependencies: graph
                .dependencies
                .iter()
                .map(|d| CanonicalDependency {
                    id: d.id,
                    from_task: d.from_task,
                    to_task: d.to_task,
                })
                .collect(),
        }
        .sorted()
    }
}

/// Fields that differ for one entity present on both sides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub id: i64,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDiff {
    pub only_local: Vec<i64>,
    pub only_remote: Vec<i64>,
    pub differing: Vec<FieldDiff>,
}

impl EntityDiff {
    pub fn is_empty(&self) -> bool {
        self.only_local.is_empty() && self.only_remote.is_empty() && self.differing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceReport {
    pub local_checksum: String,
    pub remote_checksum: String,
    pub tasks: EntityDiff,
    pub dependencies: EntityDiff,
}

impl DivergenceReport {
    pub fn is_consistent(&self) -> bool {
        self.local_checksum == self.remote_checksum
    }
}

fn task_fields(a: &CanonicalTask, b: &CanonicalTask) -> Vec<String> {
    let mut fields = Vec::new();
    if a.title != b.title {
        fields.push("title");
    }
    if a.x != b.x {
        fields.push("x");
    }
    if a.y != b.y {
        fields.push("y");
    }
    if a.completed != b.completed {
        fields.push("completed");
    }
    if a.color != b.color {
        fields.push("color");
    }
    if a.locked != b.locked {
        fields.push("locked");
    }
    fields.into_iter().map(String::from).collect()
}

fn dependency_fields(a: &CanonicalDependency, b: &CanonicalDependency) -> Vec<String> {
    let mut fields = Vec::new();
    if a.from_task != b.from_task {
        fields.push("from_task".to_string());
    }
    if a.to_task != b.to_task {
        fields.push("to_task".to_string());
    }
    fields
}

fn diff_by_id<T>(
    local: &[T],
    remote: &[T],
    id: impl Fn(&T) -> i64,
    fields: impl Fn(&T, &T) -> Vec<String>,
) -> EntityDiff {
    let local: BTreeMap<i64, &T> = local.iter().map(|t| (id(t), t)).collect();
    let remote: BTreeMap<i64, &T> = remote.iter().map(|t| (id(t), t)).collect();

    let mut diff = EntityDiff::default();
    for (key, l) in &local {
        match remote.get(key) {
            None => diff.only_local.push(*key),
            Some(r) => {
                let changed = fields(l, r);
                if !changed.is_empty() {
                    diff.differing.push(FieldDiff {
                        id: *key,
                        fields: changed,
                    });
                }
            }
        }
    }
    diff.only_remote = remote
        .keys()
        .filter(|k| !local.contains_key(*k))
        .copied()
        .collect();
    diff
}

/// Compare two canonical graphs. The per-entity diff is only computed when
/// the checksums disagree.
pub fn reconcile(local: &CanonicalGraph, remote: &CanonicalGraph) -> DivergenceReport {
    let local_checksum = local.checksum();
    let remote_checksum = remote.checksum();
    if local_checksum == remote_checksum {
        return DivergenceReport {
            local_checksum,
            remote_checksum,
            tasks: EntityDiff::default(),
            dependencies: EntityDiff::default(),
        };
    }

    DivergenceReport {
        local_checksum,
        remote_checksum,
        tasks: diff_by_id(&local.tasks, &remote.tasks, |t| t.id, task_fields),
        dependencies: diff_by_id(
            &local.dependencies,
            &remote.dependencies,
            |d| d.id,
            dependency_fields,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::models::{CanvasEdge, CanvasId, CanvasNode, PersistStatus, Position};

    fn node(id: i64, title: &str) -> CanvasNode {
        CanvasNode {
            id: CanvasId::Server(id),
            status: PersistStatus::Confirmed,
            ..CanvasNode::pending(title, Position::new(id as f64 * 10.0, 0.0))
        }
    }

    fn edge(id: i64, source: i64, target: i64) -> CanvasEdge {
        CanvasEdge {
            id: CanvasId::Server(id),
            status: PersistStatus::Confirmed,
            ..CanvasEdge::pending(source.into(), target.into())
        }
    }

    fn sample() -> CanvasGraph {
        CanvasGraph::new(
            vec![node(1, "A"), node(2, "B"), node(3, "C")],
            vec![edge(10, 1, 2), edge(11, 2, 3)],
        )
    }

    fn hash(graph: &CanvasGraph) -> String {
        CanonicalGraph::from(graph).checksum()
    }

    #[test]
    fn test_hash_ignores_insertion_order() {
        let a = sample();
        let mut b = sample();
        b.nodes.reverse();
        b.edges.reverse();
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_hash_changes_with_each_persisted_field() {
        let base = hash(&sample());

        let mutations: Vec<fn(&mut CanvasGraph)> = vec![
            |g| g.nodes[0].title = "A2".to_string(),
            |g| g.nodes[0].position.x += 1.0,
            |g| g.nodes[0].position.y += 1.0,
            |g| g.nodes[0].completed = true,
            |g| g.nodes[0].color = Some("blue".to_string()),
            |g| g.edges[0].target = CanvasId::Server(3),
        ];
        for mutate in mutations {
            let mut g = sample();
            mutate(&mut g);
            assert_ne!(hash(&g), base);
        }
    }

    #[test]
    fn test_hash_ignores_drafts_and_unsaved_nodes() {
        let base = hash(&sample());

        let mut g = sample();
        g.nodes.push(CanvasNode::pending("unsaved", Position::default()));
        let mut draft = node(99, "draft");
        draft.draft = true;
        g.nodes.push(draft);
        let mut draft_edge = edge(50, 1, 3);
        draft_edge.draft = true;
        g.edges.push(draft_edge);
        g.edges.push(CanvasEdge::pending(1.into(), 3.into()));

        assert_eq!(hash(&g), base);
    }

    #[test]
    fn test_canvas_and_store_views_agree() {
        use crate::store::{DependencyNode, TaskNode};
        let now = chrono::Utc::now();
        let project = ProjectGraph {
            project_id: 1,
            tasks: (1..=3)
                .map(|id| TaskNode {
                    id,
                    project_id: 1,
                    title: ["A", "B", "C"][(id - 1) as usize].to_string(),
                    x: id as f64 * 10.0,
                    y: 0.0,
                    completed: false,
                    color: None,
                    locked: false,
                    created_at: now,
                    updated_at: now,
                })
                .collect(),
            dependencies: vec![
                DependencyNode { id: 11, project_id: 1, from_task: 2, to_task: 3 },
                DependencyNode { id: 10, project_id: 1, from_task: 1, to_task: 2 },
            ],
        };
        assert_eq!(CanonicalGraph::from(&project).checksum(), hash(&sample()));
    }

    #[test]
    fn test_reconcile_reports_divergence() {
        let local = sample();
        let mut remote = sample();
        remote.nodes.retain(|n| n.id != CanvasId::Server(3));
        remote.edges.retain(|e| e.id != CanvasId::Server(11));
        remote.nodes.push(node(4, "D"));
        remote.nodes[0].title = "A (remote)".to_string();
        remote.nodes[0].completed = true;

        let report = reconcile(&(&local).into(), &(&remote).into());
        assert!(!report.is_consistent());
        assert_eq!(report.tasks.only_local, vec![3]);
        assert_eq!(report.tasks.only_remote, vec![4]);
        assert_eq!(
            report.tasks.differing,
            vec![FieldDiff {
                id: 1,
                fields: vec!["title".to_string(), "completed".to_string()],
            }]
        );
        assert_eq!(report.dependencies.only_local, vec![11]);
        assert!(report.dependencies.only_remote.is_empty());
    }

    #[test]
    fn test_reconcile_consistent() {
        let report = reconcile(&(&sample()).into(), &(&sample()).into());
        assert!(report.is_consistent());
        assert!(report.tasks.is_empty());
        assert!(report.dependencies.is_empty());
    }
}
