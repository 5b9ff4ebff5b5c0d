//! Request logging middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Middleware that logs every HTTP request with its outcome and latency.
///
/// Server-side failures are logged at WARN so gateway trips and upstream
/// errors stand out in the service logs.
pub async fn request_logger(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status();
    let latency_ms = start.elapsed().as_millis();

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            latency_ms = %latency_ms,
            "HTTP request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            latency_ms = %latency_ms,
            "HTTP request"
        );
    }

    response
}
