//! tally-engine - Multi-source consensus microservice
//!
//! **Module Identity:**
//! - Name: tally-engine
//! - Port: 5730
//!
//! Reconciles numeric casualty reports from independent news sources and
//! classifies articles through a two-provider ensemble with arbitration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_common::config::{resolve_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig};
use tally_common::events::EventBus;
use tally_engine::classifier::ClassifierEnsemble;
use tally_engine::db::{FactStore, MemoryFactStore, SqliteFactStore};
use tally_engine::reconciliation::Reconciler;
use tally_engine::AppState;

const MODULE_NAME: &str = "tally-engine";
const DEFAULT_BIND: &str = "127.0.0.1:5730";

/// Command-line arguments for tally-engine
#[derive(Parser, Debug)]
#[command(name = "tally-engine")]
#[command(about = "Multi-source consensus and arbitration engine")]
#[command(version)]
struct Args {
    /// Folder holding the fact store database
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve {
        /// Listen address, overrides TOML `bind`
        #[arg(long, env = "TALLY_BIND")]
        bind: Option<String>,

        /// Keep facts in memory instead of SQLite
        #[arg(long)]
        memory: bool,
    },

    /// Classify one article and print the decision as JSON
    Classify {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        content: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), MODULE_NAME);
    let config = TomlConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the TOML level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }

    match args.command.unwrap_or(Command::Serve {
        bind: None,
        memory: false,
    }) {
        Command::Serve { bind, memory } => serve(args.root_folder, config, bind, memory).await,
        Command::Classify { title, content } => classify_once(&config, &title, &content).await,
    }
}

async fn serve(
    root_folder: Option<PathBuf>,
    config: TomlConfig,
    bind: Option<String>,
    memory: bool,
) -> Result<()> {
    info!("Starting tally-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn FactStore> = if memory {
        info!("Fact store: in-memory (facts are lost on exit)");
        Arc::new(MemoryFactStore::new())
    } else {
        let root_folder = RootFolderResolver::new(MODULE_NAME).resolve(root_folder.as_deref(), &config);
        let initializer = RootFolderInitializer::new(root_folder);
        initializer
            .ensure_directory_exists()
            .context("Failed to initialize root folder")?;

        let db_path = initializer.database_path();
        info!("Database: {}", db_path.display());

        let pool = tally_engine::db::init_database_pool(&db_path)
            .await
            .context("Failed to open database")?;
        Arc::new(SqliteFactStore::new(pool))
    };

    let event_bus = EventBus::new(100);

    let reconciler =
        Reconciler::new(store, &config.reconciliation).with_event_bus(event_bus.clone());
    let ensemble = ClassifierEnsemble::from_config(&config.providers, &config.ensemble)
        .with_event_bus(event_bus.clone());

    let state = AppState::new(reconciler, ensemble, event_bus);
    let app = tally_engine::build_router(state);

    let bind = bind
        .or(config.bind.clone())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn classify_once(config: &TomlConfig, title: &str, content: &str) -> Result<()> {
    let ensemble = ClassifierEnsemble::from_config(&config.providers, &config.ensemble);
    let result = ensemble.classify(title, content).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
