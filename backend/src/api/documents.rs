//! Document download proxy.
//!
//! `GET /documents/{id}/download` fetches a document from the file handler
//! service through the gateway and forwards it to the client in whatever
//! shape the gateway materialized it.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{Error, Result};
use crate::gateway::{GatewayResponse, ServiceCall, SPOOLED_SECURITY_HEADERS};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/documents/:document_id/download", get(download_document))
}

/// GET /documents/{document_id}/download - proxy a file handler download.
async fn download_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<String>,
) -> Result<Response> {
    let base_url = state.config.services.url("file_service").ok_or_else(|| {
        Error::Internal("services.urls.file_service is not configured".to_string())
    })?;

    let call = ServiceCall::get("file_service", base_url, &format!("/files/{}", document_id));

    match state.gateway.dispatch(call).await? {
        GatewayResponse::JsonBody(value) => Ok(Json(value).into_response()),

        GatewayResponse::BinaryStream {
            bytes,
            content_type,
            filename,
        } => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            )
            .body(Body::from(bytes))
            .map_err(|e| Error::Internal(format!("failed to build download response: {}", e))),

        GatewayResponse::SpooledFile { file, content_type } => {
            let body = tokio::fs::read(file.path())
                .await
                .map_err(|e| Error::Internal(format!("failed to read spool file: {}", e)))?;
            // `file` drops here, deleting the spool.

            let mut builder = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type);
            for (name, value) in SPOOLED_SECURITY_HEADERS {
                builder = builder.header(*name, *value);
            }
            builder
                .body(Body::from(body))
                .map_err(|e| Error::Internal(format!("failed to build download response: {}", e)))
        }

        // Structured upstream errors keep their status and body.
        GatewayResponse::NotOk { status, body } => Ok((
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(body),
        )
            .into_response()),
    }
}
