//! Treetrack server and maintenance CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treetrack::canvas::{
    CanvasGraph, EdgeValidator, GraphReconciler, HttpPersistence, Persistence, StorePersistence,
};
use treetrack::store::{ProjectGraph, SqliteStore};
use treetrack::Config;

#[derive(Parser)]
#[command(name = "treetrack")]
#[command(about = "Task dependency graph server")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Compare a saved graph snapshot with the authoritative copy
    Check {
        #[arg(long)]
        project: i64,

        /// JSON file holding the local project graph
        #[arg(long)]
        snapshot: PathBuf,

        /// Remote server to compare against instead of the local database
        #[arg(long)]
        server: Option<String>,

        /// Session token for --server
        #[arg(long, env = "TREETRACK_SESSION")]
        session: Option<String>,
    },

    /// Re-run the layered layout on a project and save the positions
    Arrange {
        #[arg(long)]
        project: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,treetrack=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            treetrack::start_server(config).await
        }
        Commands::Check {
            project,
            snapshot,
            server,
            session,
        } => {
            let consistent = match server {
                Some(url) => {
                    let mut remote = HttpPersistence::new(url, project)?;
                    if let Some(token) = session {
                        remote = remote.with_session(token);
                    }
                    run_check(remote, &snapshot).await?
                }
                None => run_check(open_store(&config, project)?, &snapshot).await?,
            };
            if !consistent {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Arrange { project } => run_arrange(&config, project).await,
    }
}

fn open_store(config: &Config, project_id: i64) -> Result<StorePersistence> {
    let store = SqliteStore::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?
        .with_cycle_rejection(config.canvas.reject_cycles);
    Ok(StorePersistence::new(Arc::new(store), project_id))
}

/// Print the divergence report; true when both sides agree
async fn run_check<P: Persistence>(persistence: P, snapshot: &Path) -> Result<bool> {
    let contents = std::fs::read_to_string(snapshot)
        .with_context(|| format!("Failed to read {}", snapshot.display()))?;
    let local: ProjectGraph = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a project graph", snapshot.display()))?;

    let reconciler = GraphReconciler::new(persistence, CanvasGraph::from(&local));
    let report = reconciler.reconcile_remote().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.is_consistent())
}

async fn run_arrange(config: &Config, project_id: i64) -> Result<()> {
    let persistence = open_store(config, project_id)?;
    let mut reconciler = GraphReconciler::load(persistence)
        .await?
        .with_validator(EdgeValidator::from_reject_cycles(config.canvas.reject_cycles))
        .with_layout(config.canvas.layout);
    let moved = reconciler.auto_arrange().await?;
    tracing::info!(project_id, moved = moved.len(), "Layout saved");
    Ok(())
}
