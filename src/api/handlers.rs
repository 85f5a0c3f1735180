//! Shared server state, error type, health check and ownership checks

use crate::auth::AuthUser;
use crate::collab::DocumentHub;
use crate::events::EventBus;
use crate::planner::PlanGenerator;
use crate::store::{ProjectNode, StoreError, TaskStore};
use crate::AuthConfig;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Shared server state
pub struct ServerState {
    pub store: Arc<dyn TaskStore>,
    pub event_bus: Arc<EventBus>,
    pub hub: Arc<DocumentHub>,
    /// None when no planning endpoint is configured
    pub planner: Option<Arc<dyn PlanGenerator>>,
    pub auth: AuthConfig,
    /// Public URL for reverse-proxy setups, used as the CORS origin
    pub public_url: Option<String>,
}

pub type AppState = Arc<ServerState>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                error!(error = %format!("{e:#}"), "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound(err.to_string()),
            StoreError::Constraint(_) => AppError::Conflict(err.to_string()),
            StoreError::Validation(_) => AppError::BadRequest(err.to_string()),
            StoreError::Database(_) | StoreError::Worker(_) => AppError::Internal(err.into()),
        }
    }
}

/// Project `project_id` if it exists and belongs to `user`.
///
/// Runs before any other access to the project's rows.
pub async fn owned_project(
    state: &ServerState,
    user: &AuthUser,
    project_id: i64,
) -> Result<ProjectNode, AppError> {
    let project = state
        .store
        .get_project(project_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project {project_id} not found")))?;
    if project.owner_id != user.user_id {
        return Err(AppError::Forbidden("Not the owner of this project".to_string()));
    }
    Ok(project)
}

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// 200 when the store answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_ok = state.store.health_check().await.unwrap_or(false);
    let (http_status, status) = if db_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if db_ok { "connected" } else { "disconnected" }.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status() {
        let status = |e: StoreError| AppError::from(e).into_response().status();
        assert_eq!(status(StoreError::NotFound("task 3".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(StoreError::Constraint("UNIQUE".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(StoreError::Validation("unknown temporary id".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(StoreError::Worker("panicked".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
