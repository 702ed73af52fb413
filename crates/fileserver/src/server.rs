//! HTTP front end: upload, download and health routes

use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sharing::constants::OCTET_STREAM;
use sharing::{ShareError, ShareService, UploadGate};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::state::ServerState;

/// Default size of the request worker pool
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Default age after which an unclaimed session is retired
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Default interval between expired-session sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// File server API for managing the HTTP server
#[derive(Clone)]
pub struct FileServerApi {
    state: ServerState,
    max_concurrent_requests: usize,
    session_ttl: Duration,
    sweep_interval: Duration,
}

/// Body of a successful upload
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub port: u16,
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct DownloadParams {
    token: Option<String>,
}

impl FileServerApi {
    /// Create a new file server API
    ///
    /// # Arguments
    /// * `service` - Session engine that stores, serves and relays files
    /// * `gate` - Upload rate limiter
    pub fn new(service: ShareService, gate: UploadGate) -> Self {
        Self {
            state: ServerState::new(service, gate),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            session_ttl: DEFAULT_SESSION_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Cap on requests handled at once
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max.max(1);
        self
    }

    /// Configure the expired-session sweep
    ///
    /// # Arguments
    /// * `session_ttl` - Age after which an idle session is retired
    /// * `interval` - How often the sweep runs
    pub fn with_session_sweep(mut self, session_ttl: Duration, interval: Duration) -> Self {
        self.session_ttl = session_ttl;
        self.sweep_interval = interval;
        self
    }

    /// Get the server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Create the axum router with all routes configured
    pub fn router(&self) -> Router {
        Router::new()
            .route("/upload", post(upload_file))
            .route("/download", get(download_file))
            .route("/health", get(health_check))
            .with_state(self.state.clone())
            .layer(DefaultBodyLimit::disable())
            .layer(GlobalConcurrencyLimitLayer::new(self.max_concurrent_requests))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the file server and run until Ctrl-C
    ///
    /// # Arguments
    /// * `host` - Host to bind to (e.g., "0.0.0.0")
    /// * `port` - Port to bind to (e.g., 8080)
    pub async fn serve(self, host: &str, port: u16) -> crate::Result<()> {
        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("API server listening on {}", addr);

        let ttl = chrono::Duration::from_std(self.session_ttl)?;
        let sweep_state = self.state.clone();
        let mut interval = tokio::time::interval(self.sweep_interval);
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                sweep_state.sweep(ttl);
            }
        });

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down server...");
        })
        .await?;

        Ok(())
    }
}

/// Health check endpoint
async fn health_check(State(state): State<ServerState>) -> impl IntoResponse {
    let session_count = state.session_count();
    (
        StatusCode::OK,
        format!("File server running. Active sessions: {}", session_count),
    )
}

/// Accept a single-file multipart upload and start serving it
async fn upload_file(
    State(state): State<ServerState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, AppError> {
    state.gate().check(peer.ip())?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            AppError::BadRequest("Bad Request: Content-Type must be multipart/form-data".to_string())
        })?;
    let boundary = sharing::parse_boundary(content_type)?;

    let max_size = state.service().policy().max_size;
    let data = read_body(body, max_size).await?;

    let file = sharing::extract(&data, &boundary)?;
    let shared = state.service().share(&file).await?;

    tracing::info!(
        port = shared.offer.port,
        %peer,
        "Upload accepted: {} ({} bytes)",
        file.filename,
        file.bytes.len()
    );

    // The server task outlives this request and updates the session itself.
    drop(shared.completion);

    Ok(Json(UploadResponse {
        port: shared.offer.port,
        token: shared.offer.token,
    }))
}

/// Relay a shared file to the holder of its token
async fn download_file(
    State(state): State<ServerState>,
    Query(params): Query<DownloadParams>,
) -> Result<Response, AppError> {
    let token = params
        .token
        .filter(|token| !token.is_empty())
        .ok_or(ShareError::InvalidToken)?;

    let download = state.service().download(&token).await?;

    let disposition = format!("attachment; filename=\"{}\"", download.filename());
    let content_length = download.len();
    let stream = ReaderStream::new(download.into_file());

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, OCTET_STREAM)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// Buffer the request body, failing as soon as it exceeds `limit` bytes
async fn read_body(body: Body, limit: u64) -> Result<Vec<u8>, AppError> {
    let mut stream = body.into_data_stream();
    let mut data = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::error!("Error reading upload body: {}", e);
            AppError::Internal(format!("Server error: {}", e))
        })?;
        if (data.len() + chunk.len()) as u64 > limit {
            return Err(ShareError::PayloadTooLarge { max: limit }.into());
        }
        data.extend_from_slice(&chunk);
    }

    Ok(data)
}
