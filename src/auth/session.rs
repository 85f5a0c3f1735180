//! Session token generation, hashing, and cookie helpers.
//!
//! The session token is an opaque 256-bit random value encoded as hex. Only
//! its SHA-256 digest is stored, so a database dump holds no usable token.
//!
//! Cookie format: `treetrack_session=<hex>; HttpOnly; SameSite=Lax; Path=/; [Secure]`

use axum::http::{header, HeaderMap, HeaderValue};
use sha2::{Digest, Sha256};

pub const SESSION_COOKIE: &str = "treetrack_session";

/// Random 256-bit token, hex encoded
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// SHA-256 hex digest of a raw token
pub fn hash_token(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

fn cookie_value(cookie: String) -> HeaderValue {
    // Tokens are hex, so the only way this fails is a bug in the format string
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// `Set-Cookie` value carrying the session token
pub fn build_session_cookie(raw_token: &str, max_age_secs: u64, is_secure: bool) -> HeaderValue {
    let secure_flag = if is_secure { "; Secure" } else { "" };
    cookie_value(format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{}",
        SESSION_COOKIE, raw_token, max_age_secs, secure_flag
    ))
}

/// `Set-Cookie` value that removes the session cookie
pub fn build_clear_cookie(is_secure: bool) -> HeaderValue {
    let secure_flag = if is_secure { "; Secure" } else { "" };
    cookie_value(format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0{}",
        SESSION_COOKIE, secure_flag
    ))
}

/// Find `treetrack_session=<value>` in a `Cookie` header value
pub fn extract_session_token(cookie_header: &str) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE);
    cookie_header
        .split(';')
        .filter_map(|part| part.trim().strip_prefix(&prefix))
        .map(str::trim)
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Session token from the request headers, if any
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(extract_session_token)
}
