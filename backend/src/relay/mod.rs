//! Streaming token relay.
//!
//! Consumes the model service's chunked answer stream and re-emits it as the
//! client-facing chunk sequence, persisting the final answer exactly once.
//!
//! # Data Flow
//!
//! ```text
//! model service chunk stream (newline-delimited JSON)
//!     → line reassembly + relay loop (one session per client connection)
//!     → mpsc channel → axum response body
//! ```
//!
//! The receiving half of the channel backs the HTTP response body; when the
//! client disconnects the receiver is dropped, the relay sees the channel
//! close before its next upstream read and aborts with nothing persisted.
//!
//! The HTTP status is already committed once streaming begins, so nothing
//! in here escapes as an error: every failure travels in-band as a single
//! terminal `ERROR` chunk, strictly last.

mod store;

pub use store::{AnswerStore, ConversationServiceStore};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use docuchat_common::{AnswerRecord, CompletedAnswer, RelayEvent, StreamChunk};

/// Terminal result of one relay session, produced exactly once.
#[derive(Debug)]
pub enum RelayOutcome {
    /// Terminal `DONE` chunk emitted, answer persisted.
    Completed(AnswerRecord),
    /// Terminal `ERROR` chunk emitted; nothing persisted.
    Failed(String),
    /// Client disconnected before a terminal chunk; nothing emitted after,
    /// nothing persisted.
    Aborted,
}

const MALFORMED_CHUNK_DETAIL: &str = "model service sent an unreadable chunk";

/// Relay one upstream answer stream into `out`.
///
/// Transport chunks are reassembled into newline-delimited JSON lines; a
/// line may arrive split across chunks or share a chunk with its neighbors.
/// Per line: `IN_PROGRESS` is forwarded verbatim, `DONE` persists the
/// upstream-declared answer (never a client-side concatenation of tokens)
/// and emits one terminal chunk, `ERROR` and malformed lines emit one error
/// chunk. Outbound order matches upstream order; the loop checks for a gone
/// client before every upstream read, bounding how long a slow upstream can
/// hold a dead session.
pub async fn relay<S, E>(
    mut upstream: S,
    out: mpsc::Sender<Bytes>,
    question_id: String,
    model_code: String,
    store: Arc<dyn AnswerStore>,
) -> RelayOutcome
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let session = Session {
        out,
        question_id,
        model_code,
        store,
    };
    let mut pending: Vec<u8> = Vec::new();

    loop {
        if session.out.is_closed() {
            tracing::info!(question_id = %session.question_id, "client disconnected, relay aborted");
            return RelayOutcome::Aborted;
        }

        let bytes = match upstream.next().await {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                tracing::warn!(question_id = %session.question_id, error = %e, "model stream failed");
                return session
                    .emit_error(&format!("model stream failed: {}", e))
                    .await;
            }
            None => {
                // A final line may arrive without its trailing newline.
                let rest = std::mem::take(&mut pending);
                if !rest.iter().all(u8::is_ascii_whitespace) {
                    if let Some(outcome) = session.handle_line(&rest).await {
                        return outcome;
                    }
                }
                // Stream ended without a terminal chunk.
                return session.emit_error("model service closed the stream early").await;
            }
        };

        pending.extend_from_slice(&bytes);
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            // Keep-alive noise between chunks.
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            if let Some(outcome) = session.handle_line(&line).await {
                return outcome;
            }
        }
    }
}

struct Session {
    out: mpsc::Sender<Bytes>,
    question_id: String,
    model_code: String,
    store: Arc<dyn AnswerStore>,
}

impl Session {
    /// Process one reassembled line. `Some` means the session is over.
    async fn handle_line(&self, line: &[u8]) -> Option<RelayOutcome> {
        match serde_json::from_slice::<StreamChunk>(line) {
            Ok(StreamChunk::InProgress { .. }) => {
                let mut forwarded = line.to_vec();
                if forwarded.last() != Some(&b'\n') {
                    forwarded.push(b'\n');
                }
                if self.out.send(Bytes::from(forwarded)).await.is_err() {
                    return Some(RelayOutcome::Aborted);
                }
                None
            }
            Ok(StreamChunk::Done { data }) => {
                let record = match self
                    .store
                    .save_answer(&self.question_id, &data.answer)
                    .await
                {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::error!(
                            question_id = %self.question_id,
                            error = %e,
                            "failed to persist answer"
                        );
                        return Some(self.emit_error("failed to persist answer").await);
                    }
                };
                let event = RelayEvent::Done {
                    data: CompletedAnswer {
                        question_id: self.question_id.clone(),
                        answer: record.content.clone(),
                        metadata: data.metadata,
                    },
                };
                if self.send_event(&event).await.is_err() {
                    return Some(RelayOutcome::Aborted);
                }
                tracing::info!(
                    question_id = %self.question_id,
                    model_code = %self.model_code,
                    answer_len = record.content.len(),
                    "relay completed"
                );
                Some(RelayOutcome::Completed(record))
            }
            Ok(StreamChunk::Error { detail }) => {
                tracing::warn!(
                    question_id = %self.question_id,
                    model_code = %self.model_code,
                    detail = %detail,
                    "model service reported an error"
                );
                Some(self.emit_error(&detail).await)
            }
            Err(e) => {
                tracing::warn!(question_id = %self.question_id, error = %e, "malformed model chunk");
                Some(self.emit_error(MALFORMED_CHUNK_DETAIL).await)
            }
        }
    }

    async fn emit_error(&self, detail: &str) -> RelayOutcome {
        let event = RelayEvent::Error {
            detail: detail.to_string(),
        };
        if self.send_event(&event).await.is_err() {
            return RelayOutcome::Aborted;
        }
        RelayOutcome::Failed(detail.to_string())
    }

    async fn send_event(
        &self,
        event: &RelayEvent,
    ) -> std::result::Result<(), mpsc::error::SendError<Bytes>> {
        // Serializing RelayEvent cannot fail: string and map payloads only.
        let mut encoded = serde_json::to_vec(event).unwrap_or_default();
        encoded.push(b'\n');
        self.out.send(Bytes::from(encoded)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::RecordingStore;
    use futures_util::stream;
    use std::convert::Infallible;

    /// One transport chunk per line, newline-terminated like the model
    /// service emits them.
    fn upstream(
        lines: &[&str],
    ) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Unpin {
        let chunks: Vec<_> = lines
            .iter()
            .map(|l| Ok(Bytes::from(format!("{}\n", l))))
            .collect();
        stream::iter(chunks)
    }

    fn raw_upstream(
        chunks: &[&str],
    ) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Unpin {
        let chunks: Vec<_> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        stream::iter(chunks)
    }

    async fn collect(mut rx: mpsc::Receiver<Bytes>) -> Vec<Bytes> {
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    async fn run(
        upstream: impl Stream<Item = std::result::Result<Bytes, Infallible>> + Unpin,
        store: Arc<RecordingStore>,
    ) -> (RelayOutcome, Vec<Bytes>) {
        let (tx, rx) = mpsc::channel(16);
        let outcome = relay(
            upstream,
            tx,
            "q1".to_string(),
            "gpt-mini".to_string(),
            store,
        )
        .await;
        (outcome, collect(rx).await)
    }

    #[tokio::test]
    async fn forwards_tokens_then_persists_declared_answer() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(
            upstream(&[
                r#"{"status":"IN_PROGRESS","data":"a"}"#,
                r#"{"status":"IN_PROGRESS","data":"b"}"#,
                r#"{"status":"DONE","data":{"answer":"ab","metadata":{}}}"#,
            ]),
            store.clone(),
        )
        .await;

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], Bytes::from("{\"status\":\"IN_PROGRESS\",\"data\":\"a\"}\n"));
        assert_eq!(chunks[1], Bytes::from("{\"status\":\"IN_PROGRESS\",\"data\":\"b\"}\n"));

        let terminal: RelayEvent = serde_json::from_slice(&chunks[2]).unwrap();
        match terminal {
            RelayEvent::Done { data } => {
                assert_eq!(data.question_id, "q1");
                // The upstream-declared answer, not a token concatenation.
                assert_eq!(data.answer, "ab");
            }
            other => panic!("unexpected terminal event: {:?}", other),
        }

        assert_eq!(store.saved(), vec![("q1".to_string(), "ab".to_string())]);
        assert!(matches!(outcome, RelayOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn upstream_error_emits_one_error_chunk_and_skips_store() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(
            upstream(&[
                r#"{"status":"IN_PROGRESS","data":"a"}"#,
                r#"{"status":"ERROR","detail":"boom"}"#,
            ]),
            store.clone(),
        )
        .await;

        assert_eq!(chunks.len(), 2);
        let terminal: RelayEvent = serde_json::from_slice(&chunks[1]).unwrap();
        assert!(matches!(terminal, RelayEvent::Error { detail } if detail == "boom"));

        assert!(store.saved().is_empty());
        assert!(matches!(outcome, RelayOutcome::Failed(detail) if detail == "boom"));
    }

    #[tokio::test]
    async fn disconnected_client_yields_no_chunks() {
        let store = Arc::new(RecordingStore::new());
        let (tx, rx) = mpsc::channel(16);
        drop(rx);

        let outcome = relay(
            upstream(&[r#"{"status":"IN_PROGRESS","data":"a"}"#]),
            tx,
            "q1".to_string(),
            "gpt-mini".to_string(),
            store.clone(),
        )
        .await;

        assert!(matches!(outcome, RelayOutcome::Aborted));
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn malformed_chunk_emits_generic_error() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(upstream(&["not json at all"]), store.clone()).await;

        assert_eq!(chunks.len(), 1);
        let terminal: RelayEvent = serde_json::from_slice(&chunks[0]).unwrap();
        assert!(matches!(terminal, RelayEvent::Error { .. }));
        assert!(matches!(outcome, RelayOutcome::Failed(_)));
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn missing_discriminator_is_malformed() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(upstream(&[r#"{"data":"a"}"#]), store.clone()).await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(outcome, RelayOutcome::Failed(_)));
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn truncated_stream_emits_error_chunk() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(
            upstream(&[r#"{"status":"IN_PROGRESS","data":"a"}"#]),
            store.clone(),
        )
        .await;

        assert_eq!(chunks.len(), 2);
        let terminal: RelayEvent = serde_json::from_slice(&chunks[1]).unwrap();
        assert!(matches!(terminal, RelayEvent::Error { .. }));
        assert!(matches!(outcome, RelayOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn keep_alive_whitespace_is_skipped() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(
            raw_upstream(&["\n", "{\"status\":\"DONE\",\"data\":{\"answer\":\"hi\"}}\n"]),
            store.clone(),
        )
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(outcome, RelayOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn reassembles_lines_split_across_transport_chunks() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(
            raw_upstream(&[
                "{\"status\":\"IN_PRO",
                "GRESS\",\"data\":\"a\"}\n{\"status\":\"DONE\",",
                "\"data\":{\"answer\":\"a\"}}\n",
            ]),
            store.clone(),
        )
        .await;

        assert_eq!(chunks.len(), 2);
        let token: StreamChunk = serde_json::from_slice(&chunks[0]).unwrap();
        assert!(matches!(token, StreamChunk::InProgress { data } if data == "a"));
        assert!(matches!(outcome, RelayOutcome::Completed(_)));
        assert_eq!(store.saved(), vec![("q1".to_string(), "a".to_string())]);
    }

    #[tokio::test]
    async fn final_line_without_newline_still_completes() {
        let store = Arc::new(RecordingStore::new());
        let (outcome, chunks) = run(
            raw_upstream(&["{\"status\":\"DONE\",\"data\":{\"answer\":\"hi\"}}"]),
            store.clone(),
        )
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(matches!(outcome, RelayOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn persistence_failure_becomes_error_chunk() {
        let store = Arc::new(RecordingStore::failing());
        let (outcome, chunks) = run(
            upstream(&[r#"{"status":"DONE","data":{"answer":"hi"}}"#]),
            store.clone(),
        )
        .await;

        assert_eq!(chunks.len(), 1);
        let terminal: RelayEvent = serde_json::from_slice(&chunks[0]).unwrap();
        assert!(matches!(terminal, RelayEvent::Error { .. }));
        assert!(matches!(outcome, RelayOutcome::Failed(_)));
    }
}
