//! API route definitions

use super::handlers::{self, AppState};
use super::{auth_handlers, planner_handlers, project_handlers, task_handlers, ws_handlers};
use crate::auth::require_auth;
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Exact-origin CORS with credentials when a public URL is configured,
/// permissive otherwise
fn cors_layer(public_url: Option<&str>) -> CorsLayer {
    let origin = public_url.and_then(|url| match HeaderValue::from_str(url.trim_end_matches('/')) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(url, error = %e, "Ignoring invalid public URL for CORS");
            None
        }
    });
    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.public_url.as_deref());

    let protected = Router::new()
        .route("/auth/me", get(auth_handlers::me))
        // ====================================================================
        // Projects
        // ====================================================================
        .route(
            "/api/projects",
            get(project_handlers::list_projects).post(project_handlers::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(project_handlers::get_project).delete(project_handlers::delete_project),
        )
        .route("/api/projects/{id}/graph", get(project_handlers::get_graph))
        .route(
            "/api/projects/{id}/collab-token",
            post(project_handlers::issue_collab_token),
        )
        // ====================================================================
        // Tasks & dependencies
        // ====================================================================
        .route(
            "/api/projects/{id}/tasks",
            get(task_handlers::list_tasks).post(task_handlers::create_task),
        )
        .route(
            "/api/projects/{id}/tasks/{task_id}",
            patch(task_handlers::update_task).delete(task_handlers::delete_task),
        )
        .route(
            "/api/projects/{id}/dependencies",
            get(task_handlers::list_dependencies).post(task_handlers::create_dependency),
        )
        .route(
            "/api/projects/{id}/dependencies/{dep_id}",
            axum::routing::delete(task_handlers::delete_dependency),
        )
        .route("/api/projects/{id}/bulk", post(task_handlers::bulk_change))
        // ====================================================================
        // Planner
        // ====================================================================
        .route(
            "/api/projects/{id}/generate",
            post(planner_handlers::generate),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/register", post(auth_handlers::register))
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/logout", post(auth_handlers::logout))
        // Authorized inside the handler, before the upgrade
        .route("/ws/projects/{id}", get(ws_handlers::ws_project))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
