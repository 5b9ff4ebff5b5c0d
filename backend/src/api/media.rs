//! Range-aware media serving.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{Error, Result};
use crate::media::{MediaFile, RangeSpec};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/media/:name", get(serve_media))
}

/// GET /media/{name} - partial content for `Range` requests, full file
/// otherwise.
async fn serve_media(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let dir = PathBuf::from(&state.config.media.dir);
    let media = MediaFile::open(&dir, &name).await?;

    let range_header = headers.get(header::RANGE).map(|v| {
        v.to_str()
            .map_err(|_| Error::RangeNotSatisfiable("non-ASCII range header".to_string()))
    });

    match range_header {
        Some(value) => {
            let range =
                RangeSpec::from_header(value?, media.size, state.config.media.range_window)?;
            let body = media.read_range(&range).await?;

            tracing::debug!(
                name = %name,
                start = range.start,
                end = range.end,
                size = media.size,
                "serving partial content"
            );

            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, media.content_type)
                .header(header::CONTENT_RANGE, range.content_range(media.size))
                .header(header::ACCEPT_RANGES, "bytes")
                .body(Body::from(body))
                .map_err(|e| Error::Internal(format!("failed to build range response: {}", e)))
        }
        // No Range header: delegate to the plain file responder.
        None => {
            let request = Request::builder()
                .body(Body::empty())
                .map_err(|e| Error::Internal(e.to_string()))?;
            let response = ServeFile::new(&media.path)
                .oneshot(request)
                .await
                .map_err(|e| Error::Internal(format!("file responder failed: {}", e)))?;
            Ok(response.map(Body::new))
        }
    }
}
