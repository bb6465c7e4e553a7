// Error types for the dashgate gateway
// Author: kelexine (https://github.com/kelexine)

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Auth backend error: {0}")]
    Backend(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Cache error: {0}")]
    Cache(#[from] crate::offline::CacheError),

    #[error("Install failed: {0}")]
    Install(String),

    #[error("No active worker")]
    NoController,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// HTTP status and error type reported for this error.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            GateError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            GateError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "authentication_error"),
            GateError::Config(_) | GateError::ConfigParsing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            GateError::Backend(_) => (StatusCode::BAD_GATEWAY, "backend_error"),
            GateError::Upstream(_) | GateError::Http(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            GateError::Install(_) | GateError::NoController => {
                (StatusCode::SERVICE_UNAVAILABLE, "worker_error")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

// Convert GateError to HTTP responses for Axum
impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();

        let body = json!({
            "type": "error",
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GateError>;
