//! HTTP health endpoint
//!
//! Answers `GET /health` with a JSON status document and `GET /` with a
//! plain-text banner, for container health probes.

mod server;
mod state;

pub use server::{HealthServer, HealthStatus, ROOT_MESSAGE, SERVICE_NAME};
pub use state::HealthState;

/// Result type alias for health server operations
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
