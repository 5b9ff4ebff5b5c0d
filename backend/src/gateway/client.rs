//! Gateway client: breaker gate, bounded call, content dispatch.

use std::io::Write;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE};
use reqwest::Client;
use tempfile::NamedTempFile;

use super::breaker::{BreakerRegistry, BreakerStatus};
use super::call::ServiceCall;
use super::GatewayResponse;
use crate::config::GatewayConfig;
use crate::error::{Error, Result};

/// Content types returned to clients as attachments instead of being spooled.
const BINARY_CONTENT_TYPES: &[&str] = &[
    "application/octet-stream",
    "application/zip",
    "application/gzip",
    "application/x-tar",
    "application/pdf",
];

/// Headers attached when serving a spooled body of unknown provenance.
pub const SPOOLED_SECURITY_HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", "default-src 'none'"),
    ("x-content-type-options", "nosniff"),
];

/// Resilient HTTP client for calls between sibling services.
///
/// One instance per process; the breaker registry inside it is shared by
/// every outbound call.
pub struct ServiceGateway {
    http: Client,
    breakers: BreakerRegistry,
    timeout: Duration,
}

impl ServiceGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: Client::new(),
            breakers: BreakerRegistry::new(config.failure_threshold, config.recovery()),
            timeout: config.request_timeout(),
        }
    }

    /// Breaker status for a target, for health reporting and tests.
    pub fn breaker_status(&self, target: &str) -> BreakerStatus {
        self.breakers.status(target)
    }

    /// Issue one call and materialize the response by content type.
    ///
    /// Fails with `ServiceUnavailable` (breaker open or target unreachable),
    /// `GatewayTimeout` (deadline exceeded) or `Upstream` (non-2xx body that
    /// is not structured data). A non-2xx response with a parsable body is
    /// returned as [`GatewayResponse::NotOk`].
    pub async fn dispatch(&self, call: ServiceCall) -> Result<GatewayResponse> {
        let response = self.send(&call).await?;
        let status = response.status();

        if status.is_success() {
            self.breakers.record_success(&call.target);
            return self.materialize(&call, response).await;
        }

        // A half-open probe that reaches the target but gets an error answer
        // still counts as a failed probe.
        if self.breakers.status(&call.target) == BreakerStatus::HalfOpen {
            self.breakers.record_failure(&call.target);
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(parsed) => Ok(GatewayResponse::NotOk {
                status: status.as_u16(),
                body: parsed,
            }),
            Err(_) => Err(Error::Upstream {
                status: status.as_u16(),
                body,
            }),
        }
    }

    /// Issue one call and hand back the raw chunk stream.
    ///
    /// Shares the breaker gate and failure accounting with [`dispatch`];
    /// used by the answer relay to consume the model service's chunked body.
    /// The gateway deadline covers the whole stream, so a stalled upstream
    /// cannot hold a relay open forever. Mid-stream errors surface as items
    /// of the returned stream and are the consumer's to handle.
    ///
    /// [`dispatch`]: Self::dispatch
    pub async fn dispatch_stream(
        &self,
        call: ServiceCall,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>> {
        let response = self.send(&call).await?;
        let status = response.status();

        if !status.is_success() {
            if self.breakers.status(&call.target) == BreakerStatus::HalfOpen {
                self.breakers.record_failure(&call.target);
            }
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        self.breakers.record_success(&call.target);
        Ok(response.bytes_stream())
    }

    /// Breaker gate plus the bounded network call.
    async fn send(&self, call: &ServiceCall) -> Result<reqwest::Response> {
        self.breakers.check(&call.target)?;

        let mut request = self
            .http
            .request(call.method.clone(), call.url())
            .timeout(self.timeout)
            .headers(call.headers.clone());

        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(cookie) = call.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        if let Some(ref body) = call.json {
            request = request.json(body);
        }
        if let Some(ref fields) = call.form {
            request = request.form(fields);
        }

        tracing::debug!(target = %call.target, url = %call.url(), "outbound call");

        match request.send().await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.breakers.record_failure(&call.target);
                Err(classify_send_error(&call.target, e))
            }
        }
    }

    /// Branch on the response content type (2xx only).
    async fn materialize(
        &self,
        call: &ServiceCall,
        response: reqwest::Response,
    ) -> Result<GatewayResponse> {
        let content_type = content_type_essence(response.headers());

        if content_type == "application/json" {
            let value = response.json().await.map_err(|e| {
                Error::Internal(format!("invalid JSON from '{}': {}", call.target, e))
            })?;
            return Ok(GatewayResponse::JsonBody(value));
        }

        if BINARY_CONTENT_TYPES.contains(&content_type.as_str()) {
            let filename = attachment_filename(response.headers())
                .unwrap_or_else(|| call.filename_hint());
            let bytes = response.bytes().await.map_err(|e| {
                Error::Internal(format!("failed reading body from '{}': {}", call.target, e))
            })?;
            return Ok(GatewayResponse::BinaryStream {
                bytes,
                content_type,
                filename,
            });
        }

        // Anything else is spooled to disk rather than held in memory.
        let mut file = NamedTempFile::new()
            .map_err(|e| Error::Internal(format!("failed to create spool file: {}", e)))?;
        let mut response = response;
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            Error::Internal(format!("failed reading body from '{}': {}", call.target, e))
        })? {
            file.write_all(&chunk)
                .map_err(|e| Error::Internal(format!("failed writing spool file: {}", e)))?;
        }
        file.flush()
            .map_err(|e| Error::Internal(format!("failed writing spool file: {}", e)))?;

        Ok(GatewayResponse::SpooledFile { file, content_type })
    }
}

fn classify_send_error(target: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::GatewayTimeout(format!("'{}' did not answer in time: {}", target, e))
    } else {
        Error::ServiceUnavailable(format!("cannot reach '{}': {}", target, e))
    }
}

/// Lowercased content type without parameters; octet-stream when absent.
fn content_type_essence(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Filename from an upstream `Content-Disposition` header, if declared.
fn attachment_filename(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_DISPOSITION)?.to_str().ok()?;
    let filename = value
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))?;
    let filename = filename.trim_matches('"');
    if filename.is_empty() {
        None
    } else {
        Some(filename.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_content_type_essence() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/JSON; charset=utf-8"),
        );
        assert_eq!(content_type_essence(&headers), "application/json");

        assert_eq!(
            content_type_essence(&HeaderMap::new()),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_attachment_filename() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"report.zip\""),
        );
        assert_eq!(attachment_filename(&headers).unwrap(), "report.zip");

        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=raw.bin"),
        );
        assert_eq!(attachment_filename(&headers).unwrap(), "raw.bin");

        headers.insert(CONTENT_DISPOSITION, HeaderValue::from_static("inline"));
        assert_eq!(attachment_filename(&headers), None);
    }
}
