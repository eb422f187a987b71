//! Health check HTTP server

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::state::HealthState;

pub const SERVICE_NAME: &str = "mirror-leech-bot";
pub const ROOT_MESSAGE: &str = "🤖 Mirror Leech Bot is running!";

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub active_tasks: usize,
}

/// Health server for container probes
#[derive(Clone)]
pub struct HealthServer {
    state: HealthState,
}

impl HealthServer {
    pub fn new(state: HealthState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &HealthState {
        &self.state
    }

    /// Create the axum router with all routes configured
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(root))
            .route("/health", get(health_check))
            .fallback(not_found)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until `shutdown` fires
    ///
    /// # Arguments
    /// * `host` - Host to bind to (e.g., "0.0.0.0")
    /// * `port` - Port to bind to (e.g., 8000)
    pub async fn serve(self, host: &str, port: u16, shutdown: CancellationToken) -> crate::Result<()> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Health server listening on {}", addr);
        self.serve_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve_with_listener(self, listener: TcpListener, shutdown: CancellationToken) -> crate::Result<()> {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        tracing::info!("Health server stopped");
        Ok(())
    }
}

async fn root() -> &'static str {
    ROOT_MESSAGE
}

async fn health_check(State(state): State<HealthState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        active_tasks: state.active_tasks(),
    })
}

async fn not_found(uri: Uri) -> Response {
    AppError::NotFound(format!("No route for {}", uri.path())).into_response()
}

/// Application error types
#[derive(Debug)]
enum AppError {
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        (status, message).into_response()
    }
}
