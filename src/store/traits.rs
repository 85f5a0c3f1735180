//! TaskStore trait definition
//!
//! Abstract interface over the relational store. `SqliteStore` is the
//! production implementation; the trait keeps handlers, the collaboration
//! hub and the canvas persistence adapter independent of the backend.

use super::error::StoreResult;
use super::models::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait TaskStore: Send + Sync {
    // ========================================================================
    // Health
    // ========================================================================

    /// Cheap round-trip to the database
    async fn health_check(&self) -> StoreResult<bool>;

    // ========================================================================
    // Users & sessions
    // ========================================================================

    /// Insert a user; fails with `Constraint` if the email is taken
    async fn create_user(&self, email: &str, name: &str, password_hash: &str)
        -> StoreResult<UserNode>;

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserNode>>;

    async fn get_user(&self, id: i64) -> StoreResult<Option<UserNode>>;

    async fn create_session(
        &self,
        token_hash: &str,
        user_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Look up a non-expired session by token hash
    async fn validate_session(&self, token_hash: &str) -> StoreResult<Option<SessionNode>>;

    async fn delete_session(&self, token_hash: &str) -> StoreResult<()>;

    // ========================================================================
    // Projects
    // ========================================================================

    async fn create_project(&self, owner_id: i64, name: &str) -> StoreResult<ProjectNode>;

    async fn get_project(&self, id: i64) -> StoreResult<Option<ProjectNode>>;

    async fn list_projects(&self, owner_id: i64) -> StoreResult<Vec<ProjectNode>>;

    /// Delete a project; tasks and dependencies cascade
    async fn delete_project(&self, id: i64) -> StoreResult<()>;

    // ========================================================================
    // Tasks
    // ========================================================================

    async fn list_tasks(&self, project_id: i64) -> StoreResult<Vec<TaskNode>>;

    async fn create_task(&self, project_id: i64, req: &CreateTaskRequest) -> StoreResult<TaskNode>;

    async fn update_task(
        &self,
        project_id: i64,
        task_id: i64,
        req: &UpdateTaskRequest,
    ) -> StoreResult<TaskNode>;

    /// Delete a task after removing every dependency that touches it
    async fn delete_task(&self, project_id: i64, task_id: i64) -> StoreResult<()>;

    // ========================================================================
    // Dependencies
    // ========================================================================

    async fn list_dependencies(&self, project_id: i64) -> StoreResult<Vec<DependencyNode>>;

    /// Both endpoints must be tasks of `project_id`
    async fn create_dependency(
        &self,
        project_id: i64,
        from_task: i64,
        to_task: i64,
    ) -> StoreResult<DependencyNode>;

    async fn delete_dependency(&self, project_id: i64, dependency_id: i64) -> StoreResult<()>;

    // ========================================================================
    // Bulk
    // ========================================================================

    /// Apply a multi-entity change atomically. Any failure leaves the store
    /// exactly as it was before the call.
    async fn bulk_change(
        &self,
        project_id: i64,
        req: &BulkChangeRequest,
    ) -> StoreResult<BulkChangeResponse>;

    /// Tasks and dependencies of one project
    async fn get_project_graph(&self, project_id: i64) -> StoreResult<ProjectGraph> {
        Ok(ProjectGraph {
            project_id,
            tasks: self.list_tasks(project_id).await?,
            dependencies: self.list_dependencies(project_id).await?,
        })
    }
}
