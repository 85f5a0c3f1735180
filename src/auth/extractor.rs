//! AuthUser extractor for axum handlers.
//!
//! Reads the identity that `require_auth` put into the request extensions.

use crate::api::handlers::{AppError, AppState};
use crate::store::UserNode;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub name: String,
}

impl From<&UserNode> for AuthUser {
    fn from(user: &UserNode) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}
