//! Answer streaming endpoint.
//!
//! `POST /questions/{question_id}/stream` forwards the question to the model
//! service and relays its chunked answer back to the client. Failures before
//! the first byte map to ordinary HTTP errors; once streaming has begun,
//! failures arrive as a terminal in-band `ERROR` chunk inside a 200.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{Error, Result};
use crate::gateway::ServiceCall;
use crate::relay::{self, RelayOutcome};
use crate::state::AppState;

const DEFAULT_MODEL_CODE: &str = "standard";

/// Outbound chunks buffered before the relay has to wait for the client.
const RELAY_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Deserialize)]
pub struct StreamQuestionRequest {
    pub question: String,
    #[serde(default)]
    pub model_code: Option<String>,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/questions/:question_id/stream", post(stream_answer))
}

/// POST /questions/{question_id}/stream - relay a model answer stream.
async fn stream_answer(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<String>,
    Json(request): Json<StreamQuestionRequest>,
) -> Result<Response> {
    let base_url = state.config.services.url("model_service").ok_or_else(|| {
        Error::Internal("services.urls.model_service is not configured".to_string())
    })?;
    let model_code = request
        .model_code
        .unwrap_or_else(|| DEFAULT_MODEL_CODE.to_string());

    let call = ServiceCall::post("model_service", base_url, "/v1/answers/stream").json(
        serde_json::json!({
            "question_id": question_id,
            "question": request.question,
            "model_code": model_code,
        }),
    );

    let upstream = Box::pin(state.gateway.dispatch_stream(call).await?);

    let (tx, rx) = mpsc::channel::<Bytes>(RELAY_CHANNEL_CAPACITY);
    let store = state.answer_store.clone();
    let session_question_id = question_id.clone();
    tokio::spawn(async move {
        let outcome = relay::relay(upstream, tx, session_question_id, model_code, store).await;
        if let RelayOutcome::Failed(detail) = outcome {
            tracing::warn!(question_id = %question_id, detail = %detail, "relay session failed");
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .map_err(|e| Error::Internal(format!("failed to build streaming response: {}", e)))
}
