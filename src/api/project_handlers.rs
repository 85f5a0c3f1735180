//! Project handlers: CRUD, graph snapshot and collaboration grants

use crate::api::handlers::{owned_project, AppError, AppState};
use crate::auth::collab_token::encode_collab_token;
use crate::auth::AuthUser;
use crate::canvas::CanonicalGraph;
use crate::events::{EntityType, EventEmitter};
use crate::store::{CreateProjectRequest, ProjectGraph, ProjectNode};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

/// GET /api/projects
pub async fn list_projects(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ProjectNode>>, AppError> {
    Ok(Json(state.store.list_projects(user.user_id).await?))
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectNode>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Project name is required".to_string()));
    }
    let project = state.store.create_project(user.user_id, name).await?;
    state.event_bus.emit_created(
        EntityType::Project,
        project.id,
        project.id,
        serde_json::to_value(&project).unwrap_or_default(),
    );
    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<ProjectNode>, AppError> {
    Ok(Json(owned_project(&state, &user, project_id).await?))
}

/// DELETE /api/projects/{id}: cascades to tasks and dependencies, then
/// closes the project's collaboration sockets
pub async fn delete_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    owned_project(&state, &user, project_id).await?;
    state.store.delete_project(project_id).await?;
    info!(project_id, user_id = user.user_id, "Project deleted");
    state
        .event_bus
        .emit_deleted(EntityType::Project, project_id, project_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Snapshot plus the checksum clients compare against their local view
#[derive(Debug, Serialize)]
pub struct GraphResponse {
    #[serde(flatten)]
    pub graph: ProjectGraph,
    pub checksum: String,
}

/// GET /api/projects/{id}/graph
pub async fn get_graph(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<GraphResponse>, AppError> {
    owned_project(&state, &user, project_id).await?;
    let graph = state.store.get_project_graph(project_id).await?;
    let checksum = CanonicalGraph::from(&graph).checksum();
    Ok(Json(GraphResponse { graph, checksum }))
}

#[derive(Debug, Serialize)]
pub struct CollabTokenResponse {
    pub token: String,
    pub project_id: i64,
    pub expires_in: u64,
}

/// POST /api/projects/{id}/collab-token
pub async fn issue_collab_token(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
) -> Result<Json<CollabTokenResponse>, AppError> {
    owned_project(&state, &user, project_id).await?;
    let expires_in = state.auth.collab_token_expiry_secs;
    let token = encode_collab_token(
        user.user_id,
        project_id,
        &state.auth.collab_secret,
        expires_in,
    )?;
    Ok(Json(CollabTokenResponse {
        token,
        project_id,
        expires_in,
    }))
}
