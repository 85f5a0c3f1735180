//! Task, dependency and bulk-change handlers
//!
//! Every handler checks project ownership first. Each committed write is
//! published on the event bus.

use crate::api::handlers::{owned_project, AppError, AppState};
use crate::auth::AuthUser;
use crate::events::{EntityType, EventEmitter};
use crate::store::{
    BulkChangeRequest, BulkChangeResponse, CreateDependencyRequest, CreateTaskRequest,
    DependencyNode, TaskNode, UpdateTaskRequest,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

fn payload<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_default()
}

// ============================================================================
// Tasks
// ============================================================================

/// GET /api/projects/{id}/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<TaskNode>>, AppError> {
    owned_project(&state, &user, project_id).await?;
    Ok(Json(state.store.list_tasks(project_id).await?))
}

/// POST /api/projects/{id}/tasks
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskNode>), AppError> {
    owned_project(&state, &user, project_id).await?;
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("Task title is required".to_string()));
    }
    let task = state.store.create_task(project_id, &req).await?;
    state
        .event_bus
        .emit_created(EntityType::Task, task.id, project_id, payload(&task));
    Ok((StatusCode::CREATED, Json(task)))
}

/// PATCH /api/projects/{id}/tasks/{task_id}
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, task_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskNode>, AppError> {
    owned_project(&state, &user, project_id).await?;
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }
    if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::BadRequest("Task title cannot be empty".to_string()));
    }
    let task = state.store.update_task(project_id, task_id, &req).await?;
    state
        .event_bus
        .emit_updated(EntityType::Task, task.id, project_id, payload(&task));
    Ok(Json(task))
}

/// DELETE /api/projects/{id}/tasks/{task_id}
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, task_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    owned_project(&state, &user, project_id).await?;
    state.store.delete_task(project_id, task_id).await?;
    state
        .event_bus
        .emit_deleted(EntityType::Task, task_id, project_id);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Dependencies
// ============================================================================

/// GET /api/projects/{id}/dependencies
pub async fn list_dependencies(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<DependencyNode>>, AppError> {
    owned_project(&state, &user, project_id).await?;
    Ok(Json(state.store.list_dependencies(project_id).await?))
}

/// POST /api/projects/{id}/dependencies
pub async fn create_dependency(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<CreateDependencyRequest>,
) -> Result<(StatusCode, Json<DependencyNode>), AppError> {
    owned_project(&state, &user, project_id).await?;
    let dep = state
        .store
        .create_dependency(project_id, req.from_task, req.to_task)
        .await?;
    state
        .event_bus
        .emit_created(EntityType::Dependency, dep.id, project_id, payload(&dep));
    Ok((StatusCode::CREATED, Json(dep)))
}

/// DELETE /api/projects/{id}/dependencies/{dep_id}
pub async fn delete_dependency(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, dependency_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    owned_project(&state, &user, project_id).await?;
    state
        .store
        .delete_dependency(project_id, dependency_id)
        .await?;
    state
        .event_bus
        .emit_deleted(EntityType::Dependency, dependency_id, project_id);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Bulk
// ============================================================================

/// POST /api/projects/{id}/bulk: all-or-nothing
pub async fn bulk_change(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<BulkChangeRequest>,
) -> Result<Json<BulkChangeResponse>, AppError> {
    owned_project(&state, &user, project_id).await?;
    if req.is_empty() {
        return Ok(Json(BulkChangeResponse::default()));
    }
    let response = state.store.bulk_change(project_id, &req).await?;
    debug!(
        project_id,
        created_tasks = response.task_ids.len(),
        created_dependencies = response.dependency_ids.len(),
        "Bulk change committed"
    );
    state
        .event_bus
        .emit_updated(EntityType::Graph, project_id, project_id, payload(&response));
    Ok(Json(response))
}
