//! Plan generation handler

use crate::api::handlers::{owned_project, AppError, AppState};
use crate::auth::AuthUser;
use crate::planner::{GenerateRequest, GenerateResponse};
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, warn};

/// POST /api/projects/{id}/generate
///
/// Planner failures come back as 200 with `error` set; only ownership and
/// input problems are HTTP errors.
pub async fn generate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(project_id): Path<i64>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    owned_project(&state, &user, project_id).await?;
    if req.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("Prompt is required".to_string()));
    }

    let Some(planner) = state.planner.as_ref() else {
        return Ok(Json(GenerateResponse {
            proposal: None,
            error: Some(crate::planner::PlannerError::Disabled.to_string()),
        }));
    };

    let graph = state.store.get_project_graph(project_id).await?;
    match planner.generate(&graph, &req.history, &req.prompt).await {
        Ok(proposal) => {
            info!(
                project_id,
                requires_changes = proposal.requires_changes,
                "Plan generated"
            );
            Ok(Json(GenerateResponse {
                proposal: Some(proposal),
                error: None,
            }))
        }
        Err(e) => {
            warn!(project_id, error = %e, "Plan generation failed");
            Ok(Json(GenerateResponse {
                proposal: None,
                error: Some(e.to_string()),
            }))
        }
    }
}
