//! Chunk protocol for streamed model answers.
//!
//! This module defines the message format for the chunked HTTP body flowing
//! from the model service through the BFF to the browser.
//!
//! # Protocol Overview
//!
//! The protocol uses one JSON object per chunk. Each object has a `status`
//! field that determines its structure.
//!
//! ## Stream Flow
//!
//! 1. Model service emits any number of `IN_PROGRESS` chunks, one token each
//! 2. The stream ends with exactly one terminal chunk: `DONE` carrying the
//!    full answer, or `ERROR` carrying a failure detail
//! 3. Clients parse chunk-by-chunk; a `DONE` or `ERROR` status signals end
//!    of stream
//!
//! The BFF forwards `IN_PROGRESS` chunks verbatim and rewrites the terminal
//! chunk into a [`RelayEvent`] that also carries the question id.

use serde::{Deserialize, Serialize};

/// A single chunk of a model service answer stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamChunk {
    /// One generated token; any number of these may occur.
    InProgress { data: String },
    /// Terminal chunk: the full answer as the model service declares it.
    Done { data: FinalAnswer },
    /// Terminal chunk: generation failed upstream.
    Error { detail: String },
}

/// Payload of an upstream `DONE` chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// The complete answer text. Authoritative: not a concatenation of the
    /// previously streamed tokens.
    pub answer: String,
    /// Generation metadata (token counts, model info, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Terminal chunks emitted by the BFF toward the browser.
///
/// `IN_PROGRESS` chunks are never re-encoded, so they have no variant here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayEvent {
    Done { data: CompletedAnswer },
    Error { detail: String },
}

/// Payload of the client-facing terminal chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedAnswer {
    pub question_id: String,
    pub answer: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
