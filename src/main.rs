use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use rest_starter::{build_app, config, database::StorageBackend, logging};

#[derive(Debug, Parser)]
#[command(name = "rest-starter", version, about = "Minimal REST API starter")]
struct Args {
    /// Port to listen on (overrides PORT / API_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Environment file to load before reading configuration
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Env files must be loaded before the config singleton is first touched
    load_env_file(args.env_file.as_deref())?;

    let config = config::config();
    // Dropping the guard flushes the error log
    let _log_guard = logging::init(&config.logging)?;
    tracing::info!("Starting {} in {:?} mode", env!("CARGO_PKG_NAME"), config.environment);

    let storage = StorageBackend::connect(&config.database)
        .await
        .context("failed to initialise storage")?;
    tracing::info!("Using {} storage", storage.kind());

    tokio::fs::create_dir_all(&config.uploads.directory)
        .await
        .with_context(|| format!("failed to create {}", config.uploads.directory.display()))?;

    let app = build_app(config, storage)?;

    let port = args.port.unwrap_or(config.server.port);
    let bind_addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// `--env-file`, else `ENV_PATH`, else `.env` when present.
fn load_env_file(explicit: Option<&std::path::Path>) -> anyhow::Result<()> {
    if let Some(path) = explicit {
        dotenvy::from_path(path).with_context(|| format!("failed to load {}", path.display()))?;
        return Ok(());
    }
    if let Ok(path) = std::env::var("ENV_PATH") {
        dotenvy::from_path(&path).with_context(|| format!("failed to load {}", path))?;
        return Ok(());
    }
    allow_missing(dotenvy::dotenv())
}

/// A missing default `.env` is fine; a malformed one is not.
fn allow_missing<T>(result: dotenvy::Result<T>) -> anyhow::Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e).context("failed to load .env"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
