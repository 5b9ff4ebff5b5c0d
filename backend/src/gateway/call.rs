//! Outbound call description.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH};
use reqwest::Method;

/// One outbound HTTP call to a named sibling service.
///
/// Immutable once built; the builder methods consume and return the call.
/// The `target` name keys the circuit breaker, so every call to the same
/// service shares one breaker state.
#[derive(Debug)]
pub struct ServiceCall {
    pub target: String,
    pub base_url: String,
    pub path: String,
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub form: Option<Vec<(String, String)>>,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
}

impl ServiceCall {
    pub fn new(method: Method, target: &str, base_url: &str, path: &str) -> Self {
        Self {
            target: target.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            path: path.to_string(),
            method,
            query: Vec::new(),
            json: None,
            form: None,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
        }
    }

    pub fn get(target: &str, base_url: &str, path: &str) -> Self {
        Self::new(Method::GET, target, base_url, path)
    }

    pub fn post(target: &str, base_url: &str, path: &str) -> Self {
        Self::new(Method::POST, target, base_url, path)
    }

    pub fn put(target: &str, base_url: &str, path: &str) -> Self {
        Self::new(Method::PUT, target, base_url, path)
    }

    pub fn delete(target: &str, base_url: &str, path: &str) -> Self {
        Self::new(Method::DELETE, target, base_url, path)
    }

    pub fn patch(target: &str, base_url: &str, path: &str) -> Self {
        Self::new(Method::PATCH, target, base_url, path)
    }

    /// Append one query parameter; repeated keys are sent multi-valued.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.form = Some(fields);
        self
    }

    /// Forward a header verbatim. `content-length` is always dropped: the
    /// client recomputes it for the rebuilt body.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if name.eq_ignore_ascii_case(CONTENT_LENGTH.as_str()) {
            return self;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        } else {
            tracing::warn!(header = %name, "dropping malformed outbound header");
        }
        self
    }

    pub fn cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push((name.to_string(), value.to_string()));
        self
    }

    /// Full request URL.
    pub fn url(&self) -> String {
        if self.path.starts_with('/') {
            format!("{}{}", self.base_url, self.path)
        } else {
            format!("{}/{}", self.base_url, self.path)
        }
    }

    /// `Cookie` header value for the attached cookies, if any.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Last path segment, used as the fallback attachment filename.
    pub fn filename_hint(&self) -> String {
        self.path
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("download")
            .to_string()
    }
}
