//! Per-project shared document
//!
//! A last-writer-wins replica of one project's tasks and dependencies, keyed
//! by entity id. Changes are grouped with [`ProjectDocument::transact`]; one
//! transaction produces at most one [`DocumentUpdate`].

use crate::store::{DependencyNode, ProjectGraph, TaskNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upserted_tasks: Vec<TaskNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_tasks: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upserted_dependencies: Vec<DependencyNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed_dependencies: Vec<i64>,
}

impl DocumentUpdate {
    pub fn is_empty(&self) -> bool {
        self.upserted_tasks.is_empty()
            && self.removed_tasks.is_empty()
            && self.upserted_dependencies.is_empty()
            && self.removed_dependencies.is_empty()
    }
}

/// Full state sent to a socket when it joins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub project_id: i64,
    pub version: u64,
    pub tasks: Vec<TaskNode>,
    pub dependencies: Vec<DependencyNode>,
}

/// Staged changes of one transaction
pub struct Transaction<'a> {
    doc: &'a mut ProjectDocument,
    update: DocumentUpdate,
}

impl Transaction<'_> {
    /// Insert or replace; identical entries are not recorded
    pub fn put_task(&mut self, task: TaskNode) {
        if self.doc.tasks.get(&task.id) == Some(&task) {
            return;
        }
        self.update.removed_tasks.retain(|id| *id != task.id);
        self.doc.tasks.insert(task.id, task.clone());
        self.update.upserted_tasks.retain(|t| t.id != task.id);
        self.update.upserted_tasks.push(task);
    }

    /// Remove a task and the dependencies that touch it
    pub fn remove_task(&mut self, id: i64) {
        let incident: Vec<i64> = self
            .doc
            .dependencies
            .values()
            .filter(|d| d.from_task == id || d.to_task == id)
            .map(|d| d.id)
            .collect();
        for dep in incident {
            self.remove_dependency(dep);
        }
        if self.doc.tasks.remove(&id).is_some() {
            self.update.upserted_tasks.retain(|t| t.id != id);
            self.update.removed_tasks.push(id);
        }
    }

    pub fn put_dependency(&mut self, dep: DependencyNode) {
        if self.doc.dependencies.get(&dep.id) == Some(&dep) {
            return;
        }
        self.update.removed_dependencies.retain(|id| *id != dep.id);
        self.doc.dependencies.insert(dep.id, dep.clone());
        self.update.upserted_dependencies.retain(|d| d.id != dep.id);
        self.update.upserted_dependencies.push(dep);
    }

    pub fn remove_dependency(&mut self, id: i64) {
        if self.doc.dependencies.remove(&id).is_some() {
            self.update.upserted_dependencies.retain(|d| d.id != id);
            self.update.removed_dependencies.push(id);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDocument {
    pub project_id: i64,
    version: u64,
    tasks: BTreeMap<i64, TaskNode>,
    dependencies: BTreeMap<i64, DependencyNode>,
}

impl ProjectDocument {
    pub fn new(project_id: i64) -> Self {
        Self {
            project_id,
            ..Default::default()
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn task(&self, id: i64) -> Option<&TaskNode> {
        self.tasks.get(&id)
    }

    pub fn dependency(&self, id: i64) -> Option<&DependencyNode> {
        self.dependencies.get(&id)
    }

    /// Apply `f` as one change set. Returns the update to broadcast, or
    /// `None` when nothing changed.
    pub fn transact<F>(&mut self, f: F) -> Option<DocumentUpdate>
    where
        F: FnOnce(&mut Transaction<'_>),
    {
        let mut tx = Transaction {
            doc: self,
            update: DocumentUpdate::default(),
        };
        f(&mut tx);
        let mut update = tx.update;
        if update.is_empty() {
            return None;
        }
        self.version += 1;
        update.version = self.version;
        Some(update)
    }

    /// Bring the document in line with an authoritative graph
    pub fn sync_from(&mut self, graph: &ProjectGraph) -> Option<DocumentUpdate> {
        let stale_deps: Vec<i64> = self
            .dependencies
            .keys()
            .filter(|id| !graph.dependencies.iter().any(|d| d.id == **id))
            .copied()
            .collect();
        let stale_tasks: Vec<i64> = self
            .tasks
            .keys()
            .filter(|id| !graph.tasks.iter().any(|t| t.id == **id))
            .copied()
            .collect();
        self.transact(|tx| {
            for id in stale_deps {
                tx.remove_dependency(id);
            }
            for id in stale_tasks {
                tx.remove_task(id);
            }
            for task in &graph.tasks {
                tx.put_task(task.clone());
            }
            for dep in &graph.dependencies {
                tx.put_dependency(dep.clone());
            }
        })
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            project_id: self.project_id,
            version: self.version,
            tasks: self.tasks.values().cloned().collect(),
            dependencies: self.dependencies.values().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task(id: i64, title: &str) -> TaskNode {
        let now = Utc::now();
        TaskNode {
            id,
            project_id: 1,
            title: title.to_string(),
            x: 0.0,
            y: 0.0,
            completed: false,
            color: None,
            locked: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn dep(id: i64, from_task: i64, to_task: i64) -> DependencyNode {
        DependencyNode {
            id,
            project_id: 1,
            from_task,
            to_task,
        }
    }

    #[test]
    fn test_transact_groups_changes_into_one_update() {
        let mut doc = ProjectDocument::new(1);
        let update = doc
            .transact(|tx| {
                tx.put_task(task(1, "A"));
                tx.put_task(task(2, "B"));
                tx.put_dependency(dep(10, 1, 2));
            })
            .unwrap();

        assert_eq!(update.version, 1);
        assert_eq!(update.upserted_tasks.len(), 2);
        assert_eq!(update.upserted_dependencies.len(), 1);
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_noop_transaction_keeps_version() {
        let mut doc = ProjectDocument::new(1);
        doc.transact(|tx| tx.put_task(task(1, "A")));
        let a = doc.task(1).cloned().unwrap();
        assert!(doc.transact(|tx| tx.put_task(a)).is_none());
        assert!(doc.transact(|tx| tx.remove_task(99)).is_none());
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_remove_task_drops_incident_dependencies() {
        let mut doc = ProjectDocument::new(1);
        doc.transact(|tx| {
            tx.put_task(task(1, "A"));
            tx.put_task(task(2, "B"));
            tx.put_dependency(dep(10, 1, 2));
        });

        let update = doc.transact(|tx| tx.remove_task(1)).unwrap();
        assert_eq!(update.removed_tasks, vec![1]);
        assert_eq!(update.removed_dependencies, vec![10]);
        assert!(doc.dependency(10).is_none());
    }

    #[test]
    fn test_sync_from_produces_minimal_diff() {
        let mut doc = ProjectDocument::new(1);
        let a = task(1, "A");
        doc.transact(|tx| {
            tx.put_task(a.clone());
            tx.put_task(task(2, "B"));
            tx.put_dependency(dep(10, 1, 2));
        });

        let graph = ProjectGraph {
            project_id: 1,
            tasks: vec![a, task(3, "C")],
            dependencies: vec![dep(11, 1, 3)],
        };
        let update = doc.sync_from(&graph).unwrap();

        assert_eq!(update.removed_tasks, vec![2]);
        assert_eq!(update.removed_dependencies, vec![10]);
        assert_eq!(update.upserted_tasks.len(), 1);
        assert_eq!(update.upserted_tasks[0].id, 3);
        assert_eq!(doc.snapshot().tasks.len(), 2);
        assert!(doc.sync_from(&graph).is_none());
    }
}
