//! Authentication
//!
//! - `session`: opaque session tokens carried in an HttpOnly cookie, stored
//!   hashed
//! - `password`: bcrypt hashing for the email/password login
//! - `collab_token`: project-scoped HS256 grants for the collaboration socket
//! - `middleware` / `extractor`: axum plumbing that turns a session cookie
//!   into an [`AuthUser`]

pub mod collab_token;
pub mod extractor;
pub mod middleware;
pub mod password;
pub mod session;

pub use extractor::AuthUser;
pub use middleware::require_auth;
