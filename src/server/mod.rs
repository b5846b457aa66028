//! HTTP front door for the clip pipeline.
//!
//! `POST /process-video` runs one clip, `/output/*` serves finished clips and
//! everything else falls through to the static front-end.

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::pipeline::ClipPipeline;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ClipPipeline>,
}

impl AppState {
    pub fn new(pipeline: ClipPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Filesystem locations served as static files
#[derive(Debug, Clone)]
pub struct StaticDirs {
    /// Finished clips
    pub output_dir: PathBuf,
    /// URL prefix for `output_dir`
    pub output_path: String,
    /// Front-end assets
    pub public_dir: PathBuf,
}

impl StaticDirs {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.pipeline.output_dir.clone(),
            output_path: config.server.public_output_path.trim_end_matches('/').to_string(),
            public_dir: config.server.public_dir.clone(),
        }
    }
}

/// Create the application router.
pub fn create_router(state: AppState, dirs: StaticDirs) -> Router {
    Router::new()
        .route("/process-video", post(handlers::process_video))
        .route("/health", get(handlers::health))
        .nest_service(&dirs.output_path, ServeDir::new(&dirs.output_dir))
        .fallback_service(ServeDir::new(&dirs.public_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C.
///
/// Shutdown flips the pipeline's cancel flag so in-flight runs stop their
/// subprocesses and clean up before the server exits.
pub async fn serve(config: Config) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let pipeline = ClipPipeline::from_config(&config).with_cancel(cancel_rx);
    let app = create_router(AppState::new(pipeline), StaticDirs::from_config(&config));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server is running on http://{}", addr);
    tracing::info!(
        "Serving clips from {} at {}",
        config.pipeline.output_dir.display(),
        config.server.public_output_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_tx))
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal, cancelling in-flight clips");
    let _ = cancel_tx.send(true);
}
