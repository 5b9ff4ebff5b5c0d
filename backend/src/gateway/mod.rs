//! Resilient request gateway for sibling-service calls.
//!
//! Every outbound call goes through [`ServiceGateway::dispatch`]: a per-target
//! circuit breaker gates the call, an overall deadline bounds it, and the
//! response is materialized according to its content type.
//!
//! # Data Flow
//!
//! ```text
//! ServiceCall
//!     → breaker gate (breaker.rs, short-circuits when open)
//!     → bounded HTTP call (client.rs)
//!     → GatewayResponse (json / binary / spooled / structured non-2xx)
//! ```
//!
//! Structured upstream errors are returned as [`GatewayResponse::NotOk`]
//! rather than raised, so callers can branch on upstream-declared failures.

mod breaker;
mod call;
mod client;

pub use breaker::{BreakerRegistry, BreakerStatus};
pub use call::ServiceCall;
pub use client::{ServiceGateway, SPOOLED_SECURITY_HEADERS};

use bytes::Bytes;
use tempfile::NamedTempFile;

/// A materialized sibling-service response.
#[derive(Debug)]
pub enum GatewayResponse {
    /// 2xx response with a JSON body.
    JsonBody(serde_json::Value),
    /// 2xx response with an archive or raw-binary body, served to clients as
    /// an attachment under its original filename.
    BinaryStream {
        bytes: Bytes,
        content_type: String,
        filename: String,
    },
    /// 2xx response of any other content type, spooled to disk. The temp
    /// file is deleted when this value is dropped.
    SpooledFile {
        file: NamedTempFile,
        content_type: String,
    },
    /// Non-2xx response whose body parsed as structured data. Returned, not
    /// raised: the caller decides whether the upstream error is recoverable.
    NotOk {
        status: u16,
        body: serde_json::Value,
    },
}
