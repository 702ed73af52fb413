mod config;

use std::sync::Arc;

use config::Config;
use fileserver::FileServerApi;
use sharing::{SessionRegistry, ShareService, UploadGate};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("PeerLink stopped: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> fileserver::Result<()> {
    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        upload_dir = %config.upload_dir.display(),
        "Starting PeerLink"
    );

    let registry = Arc::new(SessionRegistry::new());
    let service = ShareService::new(registry, config.upload_dir.clone());

    FileServerApi::new(service, UploadGate::new())
        .with_max_concurrent_requests(config.max_concurrent_requests)
        .with_session_sweep(config.session_ttl, config.sweep_interval)
        .serve(&config.host, config.port)
        .await
}
