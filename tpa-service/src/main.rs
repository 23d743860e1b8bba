//! tpa-service - Transfer Path Analysis job service
//!
//! Accepts measurement file uploads, runs analysis jobs in the background and
//! serves their results over HTTP, with job events over SSE.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tpa_common::config::{load_toml_config, locate_config_file, TomlConfig};
use tpa_common::events::EventBus;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tpa_service::config::{CliOverrides, ServiceSettings};
use tpa_service::AppState;

/// Command-line arguments for tpa-service
#[derive(Parser, Debug)]
#[command(name = "tpa-service")]
#[command(about = "Transfer Path Analysis job service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and uploads
    #[arg(short, long, env = "TPA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// HTTP port to listen on
    #[arg(short, long, env = "TPA_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "TPA_HOST")]
    host: Option<String>,

    /// Path to TOML config file
    #[arg(short, long, env = "TPA_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = match locate_config_file(args.config.as_deref()) {
        Some(path) => load_toml_config(&path)?,
        None => TomlConfig::default(),
    };

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!("Starting tpa-service v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOverrides {
        host: args.host,
        port: args.port,
        root_folder: args.root_folder,
    };
    let settings = ServiceSettings::resolve(&cli, &toml_config)?;
    std::fs::create_dir_all(&settings.root_folder)?;
    std::fs::create_dir_all(&settings.upload_folder)?;

    let db_pool = tpa_service::db::init_database_pool(&settings.database_path).await?;
    info!("Database: {}", settings.database_path.display());

    let event_bus = EventBus::new(100);
    let bind_address = settings.bind_address();
    let state = AppState::new(db_pool.clone(), event_bus, settings);
    let app = tpa_service::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    info!("tpa-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
