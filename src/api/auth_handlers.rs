//! Authentication route handlers
//!
//! Endpoints:
//! - `POST /auth/register`: create an account and start a session
//! - `POST /auth/login`   : verify the password and start a session
//! - `POST /auth/logout`  : revoke the session and clear the cookie
//! - `GET  /auth/me`      : the authenticated user (protected)

use crate::api::handlers::{AppError, AppState};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{
    build_clear_cookie, build_session_cookie, generate_token, hash_token, token_from_headers,
};
use crate::auth::AuthUser;
use crate::store::{StoreError, UserNode};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::info;

/// Request body for POST /auth/login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for POST /auth/register
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("Name is required".to_string()));
    }

    // Contains @ and a dot after it
    let email = req.email.trim();
    if !email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
    {
        return Err(AppError::BadRequest("Invalid email format".to_string()));
    }

    if req.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

/// Create a session for `user` and answer with its cookie
async fn start_session(state: &AppState, user: &UserNode) -> Result<impl IntoResponse, AppError> {
    let token = generate_token();
    let expires_at = Utc::now() + Duration::seconds(state.auth.session_expiry_secs as i64);
    state
        .store
        .create_session(&hash_token(&token), user.id, expires_at)
        .await?;

    let cookie = build_session_cookie(
        &token,
        state.auth.session_expiry_secs,
        state.auth.secure_cookies,
    );
    Ok(([(header::SET_COOKIE, cookie)], Json(AuthUser::from(user))))
}

/// POST /auth/register: only when `allow_registration` is set
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !state.auth.allow_registration {
        return Err(AppError::Forbidden("Registration is disabled".to_string()));
    }
    validate_registration(&req)?;

    let password_hash = hash_password(&req.password, state.auth.bcrypt_cost)?;
    let email = req.email.trim().to_lowercase();
    let user = match state
        .store
        .create_user(&email, req.name.trim(), &password_hash)
        .await
    {
        Ok(user) => user,
        Err(StoreError::Constraint(_)) => {
            return Err(AppError::Conflict(
                "An account with this email already exists".to_string(),
            ))
        }
        Err(e) => return Err(e.into()),
    };
    info!(user_id = user.id, "User registered");

    let response = start_session(&state, &user).await?;
    Ok((StatusCode::CREATED, response))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let invalid = || AppError::Unauthorized("Invalid email or password".to_string());

    let email = req.email.trim().to_lowercase();
    let user = state
        .store
        .get_user_by_email(&email)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    start_session(&state, &user).await
}

/// POST /auth/logout: idempotent
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = token_from_headers(&headers) {
        state.store.delete_session(&hash_token(&token)).await?;
    }
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, build_clear_cookie(state.auth.secure_cookies))],
    ))
}

/// GET /auth/me
pub async fn me(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}
