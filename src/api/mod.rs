//! HTTP API: REST endpoints, session auth and collaboration sockets

pub mod auth_handlers;
pub mod handlers;
pub mod planner_handlers;
pub mod project_handlers;
pub mod routes;
pub mod task_handlers;
pub mod ws_handlers;

pub use handlers::{AppError, AppState, ServerState};
pub use routes::create_router;
