//! Persistence backends for the reconciler
//!
//! The reconciler only sees [`Persistence`]. `StorePersistence` writes
//! straight into a [`TaskStore`]; `HttpPersistence` (see `http.rs`) talks to
//! a remote server over the REST surface.

use crate::store::{
    BulkChangeRequest, BulkChangeResponse, CreateTaskRequest, DependencyNode, ProjectGraph,
    TaskNode, TaskStore, UpdateTaskRequest,
};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Project-scoped write path for graph edits
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn load_graph(&self) -> Result<ProjectGraph>;

    async fn create_task(&self, req: &CreateTaskRequest) -> Result<TaskNode>;

    async fn update_task(&self, task_id: i64, req: &UpdateTaskRequest) -> Result<TaskNode>;

    async fn delete_task(&self, task_id: i64) -> Result<()>;

    async fn create_dependency(&self, from_task: i64, to_task: i64) -> Result<DependencyNode>;

    async fn delete_dependency(&self, dependency_id: i64) -> Result<()>;

    /// All-or-nothing multi-entity write
    async fn bulk_change(&self, req: &BulkChangeRequest) -> Result<BulkChangeResponse>;
}

/// In-process backend over a [`TaskStore`]
#[derive(Clone)]
pub struct StorePersistence {
    store: Arc<dyn TaskStore>,
    project_id: i64,
}

impl StorePersistence {
    pub fn new(store: Arc<dyn TaskStore>, project_id: i64) -> Self {
        Self { store, project_id }
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }
}

#[async_trait]
impl Persistence for StorePersistence {
    async fn load_graph(&self) -> Result<ProjectGraph> {
        Ok(self.store.get_project_graph(self.project_id).await?)
    }

    async fn create_task(&self, req: &CreateTaskRequest) -> Result<TaskNode> {
        Ok(self.store.create_task(self.project_id, req).await?)
    }

    async fn update_task(&self, task_id: i64, req: &UpdateTaskRequest) -> Result<TaskNode> {
        Ok(self.store.update_task(self.project_id, task_id, req).await?)
    }

    async fn delete_task(&self, task_id: i64) -> Result<()> {
        Ok(self.store.delete_task(self.project_id, task_id).await?)
    }

    async fn create_dependency(&self, from_task: i64, to_task: i64) -> Result<DependencyNode> {
        Ok(self
            .store
            .create_dependency(self.project_id, from_task, to_task)
            .await?)
    }

    async fn delete_dependency(&self, dependency_id: i64) -> Result<()> {
        Ok(self
            .store
            .delete_dependency(self.project_id, dependency_id)
            .await?)
    }

    async fn bulk_change(&self, req: &BulkChangeRequest) -> Result<BulkChangeResponse> {
        Ok(self.store.bulk_change(self.project_id, req).await?)
    }
}
