//! Voice Journal Server
//!
//! HTTP (SSE) and WebSocket endpoints for streaming conversational turns.

pub mod http;
pub mod metrics;
pub mod rate_limit;
pub mod sse;
pub mod state;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use rate_limit::{RateLimitError, RateLimiter};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use voice_journal_config::ConfigError;
use voice_journal_core::{PersistenceError, ProviderError};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ServerError::Persistence(PersistenceError::SessionNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ServerError::Provider(_) => StatusCode::BAD_GATEWAY,
            ServerError::Config(_) | ServerError::Persistence(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        StatusCode::from(&err)
    }
}

/// Startup failures surface through the workspace-wide error type
impl From<ServerError> for voice_journal_core::Error {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Provider(e) => Self::Provider(e),
            ServerError::Persistence(e) => Self::Persistence(e),
            ServerError::Config(e) => Self::Config(e.to_string()),
            other => Self::other(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
