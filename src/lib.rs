//! Treetrack
//!
//! Task dependency graphs edited on a canvas:
//! - Relational store (SQLite) for users, sessions, projects, tasks and dependencies
//! - Graph reconciler keeping an optimistic local graph consistent with the store
//! - Planner client turning prompts into draft graph changes
//! - Per-project shared documents pushed to collaborators over WebSockets

pub mod api;
pub mod auth;
pub mod canvas;
pub mod collab;
pub mod events;
pub mod planner;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use canvas::LayoutConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub auth: AuthConfig,
    pub planner: PlannerYamlConfig,
    pub canvas: CanvasConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
    pub database_path: String,
    /// Origin the UI is served from; enables credentialed CORS for it
    pub public_url: Option<String>,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            database_path: "treetrack.db".into(),
            public_url: None,
        }
    }
}

/// Session and collaboration-grant settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Session cookie lifetime (default: 7 days)
    pub session_expiry_secs: u64,
    /// HS256 secret for collaboration grants. Generated per process when empty,
    /// which invalidates outstanding grants on restart.
    pub collab_secret: String,
    pub collab_token_expiry_secs: u64,
    pub allow_registration: bool,
    /// Mark cookies `Secure` (set when served over HTTPS)
    pub secure_cookies: bool,
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiry_secs: 7 * 24 * 3600,
            collab_secret: String::new(),
            collab_token_expiry_secs: 3600,
            allow_registration: true,
            secure_cookies: false,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Planning service section. The planner is disabled without an endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerYamlConfig {
    /// Full URL of an OpenAI-compatible chat completions endpoint
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for PlannerYamlConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: "gpt-4o-mini".into(),
            timeout_secs: 60,
        }
    }
}

/// Graph editing section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Refuse dependencies that would close a cycle
    pub reject_cycles: bool,
    pub layout: LayoutConfig,
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_path: PathBuf,
    pub public_url: Option<String>,
    pub auth: AuthConfig,
    pub planner: PlannerYamlConfig,
    pub canvas: CanvasConfig,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables and `config.yaml` in CWD.
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path)?;

        let server_port = match env_nonempty("TREETRACK_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("TREETRACK_PORT is not a valid port: {port}"))?,
            None => yaml.server.port,
        };

        let mut auth = yaml.auth;
        if let Some(secret) = env_nonempty("TREETRACK_COLLAB_SECRET") {
            auth.collab_secret = secret;
        }

        let mut planner = yaml.planner;
        if let Some(endpoint) = env_nonempty("PLANNER_ENDPOINT") {
            planner.endpoint = Some(endpoint);
        }
        if let Some(key) = env_nonempty("PLANNER_API_KEY") {
            planner.api_key = Some(key);
        }
        if let Some(model) = env_nonempty("PLANNER_MODEL") {
            planner.model = model;
        }

        Ok(Self {
            server_port,
            database_path: env_nonempty("TREETRACK_DATABASE")
                .unwrap_or(yaml.server.database_path)
                .into(),
            public_url: env_nonempty("TREETRACK_PUBLIC_URL").or(yaml.server.public_url),
            auth,
            planner,
            canvas: yaml.canvas,
        })
    }

    /// Parse the YAML config file. A missing file yields defaults; a file
    /// that exists but does not parse is an error.
    fn load_yaml(yaml_path: Option<&Path>) -> Result<YamlConfig> {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config = serde_yaml::from_str(&contents)
                    .with_context(|| format!("Failed to parse {}", path.display()))?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                Ok(YamlConfig::default())
            }
        }
    }
}

// ============================================================================
// Server bootstrap
// ============================================================================

/// Wire the store, event bus, collaboration hub and planner together.
///
/// Spawns the hub's event consumer, so it must run inside a tokio runtime.
pub fn build_state(config: &Config, store: Arc<dyn store::TaskStore>) -> Result<api::AppState> {
    let event_bus = Arc::new(events::EventBus::default());
    let registry = Arc::new(collab::ConnectionRegistry::new());
    let hub = Arc::new(collab::DocumentHub::new(store.clone(), registry));
    hub.clone().spawn(event_bus.subscribe());

    let planner: Option<Arc<dyn planner::PlanGenerator>> = match &config.planner.endpoint {
        Some(endpoint) => {
            let generator = planner::HttpPlanGenerator::new(
                endpoint.clone(),
                config.planner.model.clone(),
                config.planner.api_key.clone(),
                Duration::from_secs(config.planner.timeout_secs),
            )
            .context("Failed to build planner client")?;
            tracing::info!(model = generator.model(), "Planner enabled");
            Some(Arc::new(generator))
        }
        None => {
            tracing::info!("No planner endpoint configured, plan generation disabled");
            None
        }
    };

    let mut auth = config.auth.clone();
    if auth.collab_secret.is_empty() {
        tracing::warn!("No collab_secret configured, generating one for this process");
        auth.collab_secret = auth::session::generate_token();
    }

    Ok(Arc::new(api::ServerState {
        store,
        event_bus,
        hub,
        planner,
        auth,
        public_url: config.public_url.clone(),
    }))
}

/// Open the database and serve the API until Ctrl-C
pub async fn start_server(config: Config) -> Result<()> {
    let store = store::SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?
        .with_cycle_rejection(config.canvas.reject_cycles);
    let state = build_state(&config, Arc::new(store))?;
    let app = api::create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Treetrack listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod config_tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_yaml_config_loading() {
        let yaml = r#"
server:
  port: 9090
  database_path: /tmp/tt.db
  public_url: https://tasks.example.com

auth:
  session_expiry_secs: 3600
  collab_secret: "collab-secret-min-32-characters!!"
  allow_registration: false
  secure_cookies: true

planner:
  endpoint: http://localhost:11434/v1/chat/completions
  model: llama3

canvas:
  reject_cycles: true
  layout:
    rank_separation: 120
"#;

        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.database_path, "/tmp/tt.db");
        assert_eq!(
            config.server.public_url.as_deref(),
            Some("https://tasks.example.com")
        );
        assert_eq!(config.auth.session_expiry_secs, 3600);
        assert!(!config.auth.allow_registration);
        assert!(config.auth.secure_cookies);
        // Unset fields keep their defaults
        assert_eq!(config.auth.collab_token_expiry_secs, 3600);
        assert_eq!(config.planner.model, "llama3");
        assert_eq!(config.planner.timeout_secs, 60);
        assert!(config.canvas.reject_cycles);
        assert_eq!(config.canvas.layout.rank_separation, 120.0);
        assert_eq!(
            config.canvas.layout.node_width,
            LayoutConfig::default().node_width
        );
    }

    #[test]
    fn test_yaml_defaults() {
        let config = YamlConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.database_path, "treetrack.db");
        assert!(config.server.public_url.is_none());
        assert_eq!(config.auth.session_expiry_secs, 604800);
        assert!(config.auth.allow_registration);
        assert!(config.auth.collab_secret.is_empty());
        assert!(config.planner.endpoint.is_none());
        assert!(!config.canvas.reject_cycles);
    }

    /// Single test for YAML loading and env overrides to avoid parallel
    /// env var races.
    #[test]
    fn test_yaml_and_env_lifecycle() {
        fn clear_env() {
            for var in &[
                "TREETRACK_PORT",
                "TREETRACK_DATABASE",
                "TREETRACK_PUBLIC_URL",
                "TREETRACK_COLLAB_SECRET",
                "PLANNER_ENDPOINT",
                "PLANNER_API_KEY",
                "PLANNER_MODEL",
            ] {
                std::env::remove_var(var);
            }
        }

        // --- Phase 1: YAML values loaded correctly ---
        let yaml = r#"
server:
  port: 9999
  database_path: /data/yaml.db
planner:
  model: yaml-model
"#;
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&file_path).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        clear_env();

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 9999);
        assert_eq!(config.database_path, PathBuf::from("/data/yaml.db"));
        assert_eq!(config.planner.model, "yaml-model");
        assert!(config.planner.endpoint.is_none());

        // --- Phase 2: Env vars override YAML ---
        std::env::set_var("TREETRACK_PORT", "7777");
        std::env::set_var("PLANNER_ENDPOINT", "http://planner:8000/v1/chat/completions");
        std::env::set_var("TREETRACK_COLLAB_SECRET", "env-secret");

        let config = Config::from_yaml_and_env(Some(&file_path)).unwrap();
        assert_eq!(config.server_port, 7777);
        assert_eq!(
            config.planner.endpoint.as_deref(),
            Some("http://planner:8000/v1/chat/completions")
        );
        assert_eq!(config.auth.collab_secret, "env-secret");
        // YAML value still used where no env override
        assert_eq!(config.planner.model, "yaml-model");

        // --- Phase 3: invalid port override is an error ---
        std::env::set_var("TREETRACK_PORT", "not-a-port");
        assert!(Config::from_yaml_and_env(Some(&file_path)).is_err());

        clear_env();

        // --- Phase 4: No YAML file → defaults ---
        let missing = dir.path().join("missing.yaml");
        let config = Config::from_yaml_and_env(Some(&missing)).unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.database_path, PathBuf::from("treetrack.db"));

        // --- Phase 5: malformed YAML is reported ---
        std::fs::write(&file_path, "server: [unclosed").unwrap();
        assert!(Config::from_yaml_and_env(Some(&file_path)).is_err());
    }

    #[tokio::test]
    async fn test_build_state_generates_collab_secret() {
        let mut config = crate::test_helpers::test_config();
        config.auth.collab_secret.clear();

        let state = build_state(&config, crate::test_helpers::memory_store()).unwrap();
        assert_eq!(state.auth.collab_secret.len(), 64);
        assert!(state.planner.is_none());
        // The hub holds one subscription
        assert_eq!(state.event_bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_build_state_enables_planner() {
        let mut config = crate::test_helpers::test_config();
        config.planner.endpoint = Some("http://127.0.0.1:9/v1/chat/completions".into());

        let state = build_state(&config, crate::test_helpers::memory_store()).unwrap();
        assert!(state.planner.is_some());
        assert_eq!(state.auth.collab_secret, crate::test_helpers::TEST_COLLAB_SECRET);
    }
}
