//! Relational store for users, sessions, projects, tasks and dependencies

pub mod error;
pub mod models;
pub mod sqlite;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use sqlite::SqliteStore;
pub use traits::TaskStore;
