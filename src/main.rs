mod auth;
mod clips;
mod config;
mod error;
mod logging;
mod models;
mod routes;
mod storage;
mod upload;
mod user_models;

use anyhow::Context;
use clap::Parser;
use crate::config::{AppConfig, StoreKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use storage::{JsonFileBackend, MemoryBackend, StateStore};
use upload::UploadStore;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Video clip sharing backend", long_about = None)]
struct Args {
    #[arg(short, long, help = "Extra configuration file layered over config/default")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    logging::init_logging(&config.logging);

    let store = match config.storage.backend {
        StoreKind::File => {
            let backend = JsonFileBackend::new(&config.storage.data_file);
            tracing::info!(path = %backend.path().display(), "Using JSON file store");
            StateStore::open(backend)
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store, data is lost on restart");
            StateStore::open(MemoryBackend::new())
        }
    };
    let store = Arc::new(store.context("Failed to initialize storage")?);

    let uploads = UploadStore::new(&config.storage.upload_dir);
    uploads.ensure_dir().await?;

    let state = Arc::new(routes::AppState::new(store, uploads, &config));
    let app = routes::create_router(state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(
        %addr,
        upload_dir = %config.storage.upload_dir.display(),
        "Clip service running at {}",
        config.public_base_url()
    );

    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;

    Ok(())
}
