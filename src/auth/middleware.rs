//! Session middleware for axum routes.
//!
//! Resolves the session cookie to a user and injects an [`AuthUser`] into
//! the request extensions.

use super::session::{hash_token, token_from_headers};
use super::AuthUser;
use crate::api::handlers::{AppError, AppState};
use crate::store::{TaskStore, UserNode};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

/// User behind the session cookie in `headers`, if the session is live
pub async fn session_user(
    store: &dyn TaskStore,
    headers: &HeaderMap,
) -> Result<Option<UserNode>, AppError> {
    let Some(token) = token_from_headers(headers) else {
        return Ok(None);
    };
    let Some(session) = store.validate_session(&hash_token(&token)).await? else {
        return Ok(None);
    };
    Ok(store.get_user(session.user_id).await?)
}

/// Rejects with 401 unless the request carries a live session cookie
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = session_user(state.store.as_ref(), req.headers())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Missing or expired session".to_string()))?;

    req.extensions_mut().insert(AuthUser::from(&user));
    Ok(next.run(req).await)
}
