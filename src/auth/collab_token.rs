//! Collaboration grants
//!
//! A grant is an HS256 JWT scoped to one project. It lets a socket join the
//! project's shared document when the session cookie is not sent on the
//! upgrade request.

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollabClaims {
    /// User the grant was issued to
    pub sub: i64,
    pub project_id: i64,
    pub iat: i64,
    pub exp: i64,
}

pub fn encode_collab_token(
    user_id: i64,
    project_id: i64,
    secret: &str,
    expiry_secs: u64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = CollabClaims {
        sub: user_id,
        project_id,
        iat: now,
        exp: now + expiry_secs as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to encode collaboration grant")
}

/// Validate signature and expiry
pub fn decode_collab_token(token: &str, secret: &str) -> Result<CollabClaims> {
    let data = decode::<CollabClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("Failed to decode collaboration grant")?;
    Ok(data.claims)
}
