//! In-memory mock implementation of Persistence for testing.
//!
//! Records every call and can be told to fail a named operation.

use super::persistence::Persistence;
use crate::store::{
    BulkChangeRequest, BulkChangeResponse, CreateTaskRequest, DependencyNode, ProjectGraph,
    TaskNode, TaskRef, UpdateTaskRequest,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

pub struct MockPersistence {
    pub project_id: i64,
    pub tasks: RwLock<BTreeMap<i64, TaskNode>>,
    pub dependencies: RwLock<BTreeMap<i64, DependencyNode>>,
    pub calls: RwLock<Vec<String>>,
    failing: RwLock<HashSet<String>>,
    next_id: AtomicI64,
}

impl Default for MockPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPersistence {
    pub fn new() -> Self {
        Self {
            project_id: 1,
            tasks: RwLock::new(BTreeMap::new()),
            dependencies: RwLock::new(BTreeMap::new()),
            calls: RwLock::new(Vec::new()),
            failing: RwLock::new(HashSet::new()),
            next_id: AtomicI64::new(100),
        }
    }

    /// Seed a task with a fixed id
    pub fn with_task(mut self, id: i64, title: &str) -> Self {
        let now = Utc::now();
        self.tasks.get_mut().insert(
            id,
            TaskNode {
                id,
                project_id: self.project_id,
                title: title.to_string(),
                x: 0.0,
                y: 0.0,
                completed: false,
                color: None,
                locked: false,
                created_at: now,
                updated_at: now,
            },
        );
        self
    }

    /// Seed a dependency with a fixed id
    pub fn with_dependency(mut self, id: i64, from_task: i64, to_task: i64) -> Self {
        self.dependencies.get_mut().insert(
            id,
            DependencyNode {
                id,
                project_id: self.project_id,
                from_task,
                to_task,
            },
        );
        self
    }

    /// Make every subsequent call of `operation` fail
    pub async fn fail_on(&self, operation: &str) {
        self.failing.write().await.insert(operation.to_string());
    }

    pub async fn recover(&self, operation: &str) {
        self.failing.write().await.remove(operation);
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    async fn record(&self, operation: &str) -> Result<()> {
        self.calls.write().await.push(operation.to_string());
        if self.failing.read().await.contains(operation) {
            bail!("injected {operation} failure");
        }
        Ok(())
    }

    fn allocate(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn new_task(&self, id: i64, req: &CreateTaskRequest) -> TaskNode {
        let now = Utc::now();
        TaskNode {
            id,
            project_id: self.project_id,
            title: req.title.clone(),
            x: req.x,
            y: req.y,
            completed: req.completed,
            color: req.color.clone(),
            locked: req.locked,
            created_at: now,
            updated_at: now,
        }
    }
}

fn insert_dependency(
    deps: &mut BTreeMap<i64, DependencyNode>,
    tasks: &BTreeMap<i64, TaskNode>,
    dep: DependencyNode,
) -> Result<()> {
    if !tasks.contains_key(&dep.from_task) || !tasks.contains_key(&dep.to_task) {
        bail!("dependency endpoint missing");
    }
    if deps
        .values()
        .any(|d| d.from_task == dep.from_task && d.to_task == dep.to_task)
    {
        bail!("UNIQUE constraint failed: dependencies");
    }
    deps.insert(dep.id, dep);
    Ok(())
}

#[async_trait]
impl Persistence for MockPersistence {
    async fn load_graph(&self) -> Result<ProjectGraph> {
        self.record("load_graph").await?;
        Ok(ProjectGraph {
            project_id: self.project_id,
            tasks: self.tasks.read().await.values().cloned().collect(),
            dependencies: self.dependencies.read().await.values().cloned().collect(),
        })
    }

    async fn create_task(&self, req: &CreateTaskRequest) -> Result<TaskNode> {
        self.record("create_task").await?;
        let task = self.new_task(self.allocate(), req);
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, task_id: i64, req: &UpdateTaskRequest) -> Result<TaskNode> {
        self.record("update_task").await?;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or_else(|| anyhow!("task {task_id} not found"))?;
        req.apply_to(task);
        Ok(task.clone())
    }

    async fn delete_task(&self, task_id: i64) -> Result<()> {
        self.record("delete_task").await?;
        self.dependencies
            .write()
            .await
            .retain(|_, d| d.from_task != task_id && d.to_task != task_id);
        self.tasks
            .write()
            .await
            .remove(&task_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("task {task_id} not found"))
    }

    async fn create_dependency(&self, from_task: i64, to_task: i64) -> Result<DependencyNode> {
        self.record("create_dependency").await?;
        let dep = DependencyNode {
            id: self.allocate(),
            project_id: self.project_id,
            from_task,
            to_task,
        };
        let tasks = self.tasks.read().await;
        insert_dependency(&mut *self.dependencies.write().await, &tasks, dep.clone())?;
        Ok(dep)
    }

    async fn delete_dependency(&self, dependency_id: i64) -> Result<()> {
        self.record("delete_dependency").await?;
        self.dependencies
            .write()
            .await
            .remove(&dependency_id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("dependency {dependency_id} not found"))
    }

    async fn bulk_change(&self, req: &BulkChangeRequest) -> Result<BulkChangeResponse> {
        self.record("bulk_change").await?;
        let mut tasks_guard = self.tasks.write().await;
        let mut deps_guard = self.dependencies.write().await;

        // Work on copies; commit only if every step succeeds
        let mut tasks = tasks_guard.clone();
        let mut deps = deps_guard.clone();
        let mut task_ids: HashMap<String, i64> = HashMap::new();
        let mut dependency_ids: HashMap<String, i64> = HashMap::new();

        for created in &req.created_tasks {
            let task = self.new_task(self.allocate(), &created.task);
            task_ids.insert(created.temp_id.clone(), task.id);
            tasks.insert(task.id, task);
        }
        for updated in &req.updated_tasks {
            let task = tasks
                .get_mut(&updated.id)
                .ok_or_else(|| anyhow!("task {} not found", updated.id))?;
            updated.changes.apply_to(task);
        }
        for id in &req.deleted_task_ids {
            deps.retain(|_, d| d.from_task != *id && d.to_task != *id);
            tasks
                .remove(id)
                .ok_or_else(|| anyhow!("task {id} not found"))?;
        }
        let resolve = |r: &TaskRef| -> Result<i64> {
            match r {
                TaskRef::Id(id) => Ok(*id),
                TaskRef::Temp(t) => task_ids
                    .get(t)
                    .copied()
                    .ok_or_else(|| anyhow!("unknown temporary id {t}")),
            }
        };
        for created in &req.created_dependencies {
            let dep = DependencyNode {
                id: self.allocate(),
                project_id: self.project_id,
                from_task: resolve(&created.from_task)?,
                to_task: resolve(&created.to_task)?,
            };
            dependency_ids.insert(created.temp_id.clone(), dep.id);
            insert_dependency(&mut deps, &tasks, dep)?;
        }
        for updated in &req.updated_dependencies {
            let from = updated.from_task.as_ref().map(&resolve).transpose()?;
            let to = updated.to_task.as_ref().map(&resolve).transpose()?;
            let dep = deps
                .get_mut(&updated.id)
                .ok_or_else(|| anyhow!("dependency {} not found", updated.id))?;
            if let Some(from) = from {
                dep.from_task = from;
            }
            if let Some(to) = to {
                dep.to_task = to;
            }
        }
        for id in &req.deleted_dependency_ids {
            deps.remove(id);
        }

        *tasks_guard = tasks;
        *deps_guard = deps;
        Ok(BulkChangeResponse {
            task_ids,
            dependency_ids,
        })
    }
}
