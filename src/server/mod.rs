//! HTTP server
//!
//! REST API under `/api` for uploading datasets, submitting training
//! sessions, polling them, and serving predictions, explanations and model
//! downloads from finished sessions.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use handlers::{ModelSummary, SessionResponse, TrainRequest};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{ArtifactBackend, Settings};

/// Start the server with the given settings
pub async fn run_server(settings: Settings) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        upload_dir = %settings.upload_dir.display(),
        model_dir = %settings.model_dir.display(),
        started_at = %start_time.to_rfc3339(),
        "Initializing server directories"
    );

    std::fs::create_dir_all(&settings.upload_dir)?;
    if settings.artifact_backend == ArtifactBackend::Fs {
        std::fs::create_dir_all(&settings.model_dir)?;
    }

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let state = Arc::new(AppState::new(settings.clone())?);
    let app = create_router(state);

    info!(
        address = %addr,
        max_workers = settings.max_workers,
        artifact_backend = ?settings.artifact_backend,
        max_upload_size_mb = settings.max_upload_size / 1024 / 1024,
        "AutoML server starting"
    );
    info!(url = %format!("http://{}/api/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
