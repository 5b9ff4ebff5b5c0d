//! Error types for the BFF.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error types for gateway, relay and media operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Breaker open or target unreachable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Overall outbound deadline exceeded.
    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    /// Non-2xx upstream response whose body could not be parsed.
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            Error::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "gateway_timeout"),
            Error::Upstream { .. } => (StatusCode::BAD_GATEWAY, "upstream_error"),
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::RangeNotSatisfiable(_) => {
                (StatusCode::RANGE_NOT_SATISFIABLE, "range_not_satisfiable")
            }
            Error::FileNotFound(_) => (StatusCode::NOT_FOUND, "file_not_found"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
