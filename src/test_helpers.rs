//! Test helper factories and state builders
#![allow(dead_code)]

use crate::api::AppState;
use crate::store::{
    CreateTaskRequest, DependencyNode, ProjectNode, SqliteStore, TaskNode, TaskStore, UserNode,
};
use crate::{AuthConfig, CanvasConfig, Config, PlannerYamlConfig};
use std::sync::Arc;

pub const TEST_COLLAB_SECRET: &str = "test-collab-secret-at-least-32-chars";

/// Config with no planner, fast bcrypt and a fixed collaboration secret
pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_path: ":memory:".into(),
        public_url: None,
        auth: AuthConfig {
            collab_secret: TEST_COLLAB_SECRET.to_string(),
            bcrypt_cost: 4,
            ..AuthConfig::default()
        },
        planner: PlannerYamlConfig::default(),
        canvas: CanvasConfig::default(),
    }
}

pub fn memory_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().expect("in-memory store"))
}

/// Full server state over an empty in-memory store
pub fn test_state() -> AppState {
    crate::build_state(&test_config(), memory_store()).expect("test state")
}

pub async fn seed_user(store: &dyn TaskStore, email: &str) -> UserNode {
    store
        .create_user(email, "Test User", "not-a-real-hash")
        .await
        .expect("seed user")
}

pub async fn seed_project(store: &dyn TaskStore, owner_id: i64, name: &str) -> ProjectNode {
    store
        .create_project(owner_id, name)
        .await
        .expect("seed project")
}

pub async fn seed_task(store: &dyn TaskStore, project_id: i64, title: &str) -> TaskNode {
    store
        .create_task(
            project_id,
            &CreateTaskRequest {
                title: title.to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("seed task")
}

pub async fn seed_dependency(
    store: &dyn TaskStore,
    project_id: i64,
    from_task: i64,
    to_task: i64,
) -> DependencyNode {
    store
        .create_dependency(project_id, from_task, to_task)
        .await
        .expect("seed dependency")
}
