//! Rows of the relational store and the request DTOs that mutate them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

// ============================================================================
// Stored entities
// ============================================================================

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNode {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// Bcrypt hash, never serialized back to clients
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A project owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectNode {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A task, rendered as a node on the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub x: f64,
    pub y: f64,
    pub completed: bool,
    /// Categorical tag rendered as the node background
    pub color: Option<String>,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A precedence constraint `from_task -> to_task`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub id: i64,
    pub project_id: i64,
    pub from_task: i64,
    pub to_task: i64,
}

/// A login session. Only the SHA-256 of the cookie token is stored.
#[derive(Debug, Clone)]
pub struct SessionNode {
    pub token_hash: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Requests
// ============================================================================

/// Request to create a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

/// Request to create a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

/// Partial task update. Absent fields are left untouched.
///
/// `color` distinguishes "absent" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub color: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

impl UpdateTaskRequest {
    /// True when the request would not change anything
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.x.is_none()
            && self.y.is_none()
            && self.completed.is_none()
            && self.color.is_none()
            && self.locked.is_none()
    }

    /// Apply the present fields to a task in place
    pub fn apply_to(&self, task: &mut TaskNode) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(x) = self.x {
            task.x = x;
        }
        if let Some(y) = self.y {
            task.y = y;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(ref color) = self.color {
            task.color = color.clone();
        }
        if let Some(locked) = self.locked {
            task.locked = locked;
        }
    }
}

/// Request to create a dependency between two persisted tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDependencyRequest {
    pub from_task: i64,
    pub to_task: i64,
}

// ============================================================================
// Bulk change
// ============================================================================

/// Reference to a task inside a bulk change: either an authoritative id or
/// the temporary id of a task created earlier in the same change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Id(i64),
    Temp(String),
}

impl From<i64> for TaskRef {
    fn from(id: i64) -> Self {
        TaskRef::Id(id)
    }
}

/// A task to insert, keyed by the caller's temporary id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTaskCreate {
    pub temp_id: String,
    pub task: CreateTaskRequest,
}

/// An update to an existing task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTaskUpdate {
    pub id: i64,
    #[serde(default)]
    pub changes: UpdateTaskRequest,
}

/// A dependency to insert, keyed by the caller's temporary id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDependencyCreate {
    pub temp_id: String,
    pub from_task: TaskRef,
    pub to_task: TaskRef,
}

/// Re-pointing an existing dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDependencyUpdate {
    pub id: i64,
    #[serde(default)]
    pub from_task: Option<TaskRef>,
    #[serde(default)]
    pub to_task: Option<TaskRef>,
}

/// A multi-entity change applied in one transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkChangeRequest {
    pub created_tasks: Vec<BulkTaskCreate>,
    pub updated_tasks: Vec<BulkTaskUpdate>,
    pub deleted_task_ids: Vec<i64>,
    pub created_dependencies: Vec<BulkDependencyCreate>,
    pub updated_dependencies: Vec<BulkDependencyUpdate>,
    pub deleted_dependency_ids: Vec<i64>,
}

impl BulkChangeRequest {
    pub fn is_empty(&self) -> bool {
        self.created_tasks.is_empty()
            && self.updated_tasks.is_empty()
            && self.deleted_task_ids.is_empty()
            && self.created_dependencies.is_empty()
            && self.updated_dependencies.is_empty()
            && self.deleted_dependency_ids.is_empty()
    }
}

/// Temporary id → authoritative id maps produced by a bulk change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkChangeResponse {
    pub task_ids: HashMap<String, i64>,
    pub dependency_ids: HashMap<String, i64>,
}

/// Whole-project snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectGraph {
    pub project_id: i64,
    pub tasks: Vec<TaskNode>,
    pub dependencies: Vec<DependencyNode>,
}

/// Deserialize a present field (including `null`) as `Some(..)`
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
