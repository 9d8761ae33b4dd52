//! Request executor: one templated HTTP request per call, never raising.
//!
//! [`RequestExecutor::execute`] renders the spec, waits for a pool slot,
//! sends exactly one request and classifies the outcome. Timeouts and
//! transport failures come back as a [`ResponseWrapper`] in the matching
//! state rather than as errors.

use crate::config::HttpMethod;
use crate::pool::ConnectionPool;
use crate::request::{prepare, PreparedRequest, RequestBody, RequestSpec};
use crate::response::{OutcomeState, ResponseWrapper};
use crate::template::TemplateRenderer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Error message recorded for a request that ran out of time.
pub const TIMEOUT_ERROR: &str = "Timeout";

/// What was attempted, alongside the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Rendered URL, query string included.
    pub url: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Serializable record of one request, as published to callers and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    pub status_code: Option<u16>,
    pub state: OutcomeState,
    /// Parsed JSON body, or the raw text when the body is not JSON.
    pub response: Option<Value>,
    pub response_text: String,
    pub headers: BTreeMap<String, String>,
    pub url: String,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestResult {
    pub fn new(response: &ResponseWrapper, metadata: &RequestMetadata) -> Self {
        let body = response.status_code().map(|_| {
            response
                .json()
                .cloned()
                .unwrap_or_else(|| Value::String(response.text().to_string()))
        });
        Self {
            status_code: response.status_code(),
            state: response.state(),
            response: body,
            response_text: response.text().to_string(),
            headers: response.headers().clone(),
            url: metadata.url.clone(),
            method: metadata.method,
            error: metadata.error.clone(),
        }
    }

    /// Status code as text, or the outcome state when there is none.
    pub fn display_state(&self) -> String {
        match self.status_code {
            Some(code) => code.to_string(),
            None => self.state.to_string(),
        }
    }

    pub fn status_icon(&self) -> &'static str {
        match (self.state, self.status_code) {
            (OutcomeState::Ok, Some(code)) if (200..300).contains(&code) => "mdi:web-check",
            (OutcomeState::Timeout, _) => "mdi:web-clock",
            (OutcomeState::Error, _) => "mdi:web-remove",
            (_, Some(code)) if code >= 400 => "mdi:web-remove",
            _ => "mdi:web",
        }
    }
}

/// Icon for an endpoint given its latest result, if any.
///
/// No result yet gives `mdi:web-off`, as does a disabled endpoint whose last
/// result carries no success, timeout or error signal.
pub fn endpoint_icon(result: Option<&RequestResult>, enabled: bool) -> &'static str {
    match result.map(RequestResult::status_icon) {
        None => "mdi:web-off",
        Some("mdi:web") if !enabled => "mdi:web-off",
        Some(icon) => icon,
    }
}

enum Sent {
    Completed {
        status: u16,
        headers: Vec<(String, String)>,
        text: String,
    },
    Failed {
        state: OutcomeState,
        error: Option<String>,
    },
}

/// Executes request specs against one instance's connection pool.
#[derive(Clone)]
pub struct RequestExecutor {
    pool: Arc<ConnectionPool>,
    renderer: Arc<dyn TemplateRenderer>,
}

impl RequestExecutor {
    pub fn new(pool: Arc<ConnectionPool>, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self { pool, renderer }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn renderer(&self) -> &Arc<dyn TemplateRenderer> {
        &self.renderer
    }

    /// Render, send and classify one request.
    pub async fn execute(&self, spec: &RequestSpec) -> (ResponseWrapper, RequestMetadata) {
        let prepared = prepare(spec, self.renderer.as_ref());
        tracing::debug!("Making HTTP request: {} {}", prepared.method, prepared.url);

        let started = std::time::Instant::now();
        let sent = self.send(&prepared).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut metadata = RequestMetadata {
            url: prepared.url,
            method: prepared.method,
            error: None,
            elapsed_ms,
        };
        let response = match sent {
            Sent::Completed {
                status,
                headers,
                text,
            } => ResponseWrapper::completed(status, headers, text),
            Sent::Failed { state, error } => {
                metadata.error = error;
                ResponseWrapper::failed(state)
            }
        };
        (response, metadata)
    }

    /// Like [`execute`](Self::execute), returning the serializable record.
    pub async fn execute_result(&self, spec: &RequestSpec) -> RequestResult {
        let (response, metadata) = self.execute(spec).await;
        RequestResult::new(&response, &metadata)
    }

    async fn send(&self, prepared: &PreparedRequest) -> Sent {
        let client = match self.pool.client(prepared.verify_tls) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to build HTTP client: {e}");
                return Sent::Failed {
                    state: OutcomeState::Error,
                    error: Some(e.to_string()),
                };
            }
        };

        let mut builder = client
            .request(prepared.method.to_reqwest(), &prepared.url)
            .timeout(prepared.timeout);
        for (key, value) in &prepared.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = match &prepared.body {
            Some(RequestBody::Json(json)) => builder.json(json),
            Some(RequestBody::Text(text)) => builder.body(text.clone()),
            None => builder,
        };

        let host = prepared.host();
        let exchange = async {
            let _permit = self.pool.acquire(host.as_deref()).await;
            let resp = builder.send().await?;
            let status = resp.status().as_u16();
            let headers: Vec<(String, String)> = resp
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();
            let text = resp.text().await?;
            Ok::<_, reqwest::Error>((status, headers, text))
        };

        match tokio::time::timeout(prepared.timeout, exchange).await {
            Ok(Ok((status, headers, text))) => Sent::Completed {
                status,
                headers,
                text,
            },
            Ok(Err(e)) if e.is_timeout() => timed_out(prepared),
            Ok(Err(e)) => {
                tracing::error!("Error making HTTP request to {}: {e}", prepared.url);
                Sent::Failed {
                    state: OutcomeState::Error,
                    error: Some(e.to_string()),
                }
            }
            Err(_) => timed_out(prepared),
        }
    }
}

fn timed_out(prepared: &PreparedRequest) -> Sent {
    tracing::warn!(
        "Timeout after {} making HTTP request to {}",
        format_secs(prepared.timeout),
        prepared.url
    );
    Sent::Failed {
        state: OutcomeState::Timeout,
        error: Some(TIMEOUT_ERROR.to_string()),
    }
}

fn format_secs(d: Duration) -> String {
    format!("{}s", d.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> RequestMetadata {
        RequestMetadata {
            url: "http://dev.local/status".to_string(),
            method: HttpMethod::Get,
            error: None,
            elapsed_ms: 3,
        }
    }

    #[test]
    fn test_result_from_json_response() {
        let resp = ResponseWrapper::completed(
            200,
            [("Content-Type", "application/json")],
            r#"{"on": true}"#.to_string(),
        );
        let result = RequestResult::new(&resp, &metadata());
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.state, OutcomeState::Ok);
        assert_eq!(result.response, Some(json!({"on": true})));
        assert_eq!(result.headers["content-type"], "application/json");
        assert_eq!(result.display_state(), "200");
        assert_eq!(result.status_icon(), "mdi:web-check");
    }

    #[test]
    fn test_result_from_text_error_response() {
        let resp = ResponseWrapper::completed(503, Vec::<(String, String)>::new(), "busy".to_string());
        let result = RequestResult::new(&resp, &metadata());
        assert_eq!(result.state, OutcomeState::Error);
        assert_eq!(result.response, Some(json!("busy")));
        assert_eq!(result.status_icon(), "mdi:web-remove");
    }

    #[test]
    fn test_result_from_timeout() {
        let resp = ResponseWrapper::failed(OutcomeState::Timeout);
        let result = RequestResult::new(&resp, &metadata());
        assert_eq!(result.status_code, None);
        assert_eq!(result.response, None);
        assert_eq!(result.response_text, "");
        assert!(result.headers.is_empty());
        assert_eq!(result.display_state(), "timeout");
        assert_eq!(result.status_icon(), "mdi:web-clock");
    }

    #[test]
    fn test_endpoint_icon_without_data_or_when_disabled() {
        assert_eq!(endpoint_icon(None, true), "mdi:web-off");

        let redirect = ResponseWrapper::completed(304, Vec::<(String, String)>::new(), String::new());
        let mut result = RequestResult::new(&redirect, &metadata());
        result.state = OutcomeState::Ok;
        assert_eq!(endpoint_icon(Some(&result), true), "mdi:web");
        assert_eq!(endpoint_icon(Some(&result), false), "mdi:web-off");

        let timeout = RequestResult::new(&ResponseWrapper::failed(OutcomeState::Timeout), &metadata());
        assert_eq!(endpoint_icon(Some(&timeout), false), "mdi:web-clock");
    }

    #[test]
    fn test_result_serialization_omits_missing_error() {
        let resp = ResponseWrapper::failed(OutcomeState::Error);
        let ok = serde_json::to_value(RequestResult::new(&resp, &metadata())).unwrap();
        assert!(ok.get("error").is_none());
        assert_eq!(ok["state"], "error");
        assert_eq!(ok["method"], "GET");

        let mut failed_meta = metadata();
        failed_meta.error = Some("connection refused".to_string());
        let failed = serde_json::to_value(RequestResult::new(&resp, &failed_meta)).unwrap();
        assert_eq!(failed["error"], "connection refused");
        assert_eq!(failed["status_code"], Value::Null);
    }
}
