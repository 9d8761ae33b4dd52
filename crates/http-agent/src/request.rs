//! Request specification and the pure builder that turns it into transport
//! parameters.
//!
//! [`prepare`] performs template rendering, query-string appending and body
//! classification without touching the network, so every request decision is
//! testable in isolation.

use crate::config::{ContentType, HeaderPair, HttpMethod, DEFAULT_TIMEOUT_SECS};
use crate::template::{render_or_raw, TemplateRenderer, Variables};
use serde_json::Value;
use std::time::Duration;

const CONTENT_TYPE_HEADER: &str = "Content-Type";
const DEFAULT_TEXT_CONTENT_TYPE: &str = "text/plain";

/// Immutable description of one request, as configured.
///
/// All string fields except `headers[].key` are templates.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub url: String,
    pub method: HttpMethod,
    pub headers: Vec<HeaderPair>,
    pub payload: Option<String>,
    pub querystring: Option<String>,
    /// Content type for raw text payloads when no `Content-Type` header is set.
    pub content_type: Option<ContentType>,
    pub timeout: Duration,
    pub verify_tls: bool,
    pub variables: Variables,
}

impl RequestSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            payload: None,
            querystring: None,
            content_type: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_tls: true,
            variables: Variables::new(),
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderPair::new(key, value));
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_querystring(mut self, querystring: impl Into<String>) -> Self {
        self.querystring = Some(querystring.into());
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_verify_tls(mut self, verify_tls: bool) -> Self {
        self.verify_tls = verify_tls;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// Body to send with a prepared request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Payload parsed as JSON; sent with `application/json`.
    Json(Value),
    /// Payload that is not JSON; sent verbatim.
    Text(String),
}

/// Fully rendered transport parameters for a single request.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    /// Rendered URL including any appended query string.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl PreparedRequest {
    /// Host component used to bound per-host concurrency.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Append a rendered query string to `url`, picking `&` or `?`.
pub fn append_query_string(url: &str, querystring: &str) -> String {
    if querystring.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{querystring}")
}

/// Render and assemble the transport parameters for `spec`.
pub fn prepare(spec: &RequestSpec, renderer: &dyn TemplateRenderer) -> PreparedRequest {
    let vars = &spec.variables;

    let rendered_url = render_or_raw(renderer, &spec.url, vars);
    let rendered_query = render_or_raw(renderer, spec.querystring.as_deref().unwrap_or(""), vars);
    let url = append_query_string(&rendered_url, &rendered_query);

    let mut headers: Vec<(String, String)> = spec
        .headers
        .iter()
        .map(|h| (h.key.clone(), render_or_raw(renderer, &h.value, vars)))
        .collect();

    let mut body = None;
    if spec.method.carries_payload() {
        let payload = render_or_raw(renderer, spec.payload.as_deref().unwrap_or(""), vars);
        if !payload.is_empty() {
            body = Some(match serde_json::from_str::<Value>(&payload) {
                Ok(json) => RequestBody::Json(json),
                Err(_) => {
                    let has_content_type = headers
                        .iter()
                        .any(|(k, _)| k.eq_ignore_ascii_case(CONTENT_TYPE_HEADER));
                    if !has_content_type {
                        // A body that failed to parse is never labelled as JSON.
                        let content_type = spec
                            .content_type
                            .filter(|ct| *ct != ContentType::Json)
                            .map(ContentType::as_str)
                            .unwrap_or(DEFAULT_TEXT_CONTENT_TYPE);
                        headers.push((CONTENT_TYPE_HEADER.to_string(), content_type.to_string()));
                    }
                    RequestBody::Text(payload)
                }
            });
        }
    }

    PreparedRequest {
        method: spec.method,
        url,
        headers,
        body,
        timeout: spec.timeout,
        verify_tls: spec.verify_tls,
    }
}
