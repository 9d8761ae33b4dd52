//! Manually triggered requests.
//!
//! A service call is a one-off request described entirely by its call data.
//! Every key of that data is also available to the templates.

use crate::config::{check_range, HttpMethod, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS, MIN_TIMEOUT_SECS};
use crate::error::{AgentError, AgentResult};
use crate::request::RequestSpec;
use crate::template::caller_variables;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;

/// The request services an instance exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Method taken from the call data, GET when absent.
    #[serde(rename = "http_request")]
    Request,
    #[serde(rename = "http_get")]
    Get,
    #[serde(rename = "http_post")]
    Post,
    #[serde(rename = "http_put")]
    Put,
    #[serde(rename = "http_delete")]
    Delete,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 5] = [
        ServiceKind::Request,
        ServiceKind::Get,
        ServiceKind::Post,
        ServiceKind::Put,
        ServiceKind::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "http_request",
            Self::Get => "http_get",
            Self::Post => "http_post",
            Self::Put => "http_put",
            Self::Delete => "http_delete",
        }
    }

    /// Method this service forces, if any.
    pub fn method_override(self) -> Option<HttpMethod> {
        match self {
            Self::Request => None,
            Self::Get => Some(HttpMethod::Get),
            Self::Post => Some(HttpMethod::Post),
            Self::Put => Some(HttpMethod::Put),
            Self::Delete => Some(HttpMethod::Delete),
        }
    }
}

impl FromStr for ServiceKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim())
            .ok_or_else(|| AgentError::InvalidConfig(format!("unknown service '{s}'")))
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of a request service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub service: ServiceKind,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ServiceCall {
    pub fn new(service: ServiceKind, data: Map<String, Value>) -> Self {
        Self { service, data }
    }

    /// Method that will be used: the service's own, else `method` from data.
    pub fn method(&self) -> AgentResult<HttpMethod> {
        if let Some(method) = self.service.method_override() {
            return Ok(method);
        }
        match self.data.get("method") {
            None | Some(Value::Null) => Ok(HttpMethod::Get),
            Some(Value::String(s)) => s.parse(),
            Some(other) => Err(AgentError::InvalidMethod(other.to_string())),
        }
    }

    /// Translate the call data into a request.
    pub fn request_spec(&self) -> AgentResult<RequestSpec> {
        let url = self
            .string_field("url")
            .filter(|u| !u.trim().is_empty())
            .ok_or(AgentError::MissingUrl)?;

        let timeout = match self.data.get("timeout") {
            None | Some(Value::Null) => DEFAULT_TIMEOUT_SECS,
            Some(value) => parse_seconds(value)?,
        };
        check_range("timeout", timeout, MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)?;

        let verify_tls = self
            .data
            .get("verify_ssl")
            .or_else(|| self.data.get("ssl_verify"))
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut spec = RequestSpec::new(url)
            .with_method(self.method()?)
            .with_timeout(Duration::from_secs(timeout))
            .with_verify_tls(verify_tls);

        if let Some(payload) = self.data.get("payload").and_then(payload_text) {
            spec = spec.with_payload(payload);
        }
        if let Some(querystring) = self.string_field("querystring") {
            spec = spec.with_querystring(querystring);
        }
        match self.data.get("headers") {
            Some(Value::Object(headers)) => {
                for (key, value) in headers {
                    spec = spec.with_header(key.clone(), scalar_text(value));
                }
            }
            None | Some(Value::Null) => {}
            Some(other) => {
                return Err(AgentError::InvalidConfig(format!(
                    "headers must be a mapping, got {other}"
                )));
            }
        }

        spec.variables = caller_variables(&self.data);
        Ok(spec)
    }

    fn string_field(&self, key: &str) -> Option<String> {
        match self.data.get(key)? {
            Value::Null => None,
            value => Some(scalar_text(value)),
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Structured payloads are sent as their JSON text.
fn payload_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_seconds(value: &Value) -> AgentResult<u64> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AgentError::InvalidConfig(format!("timeout must be a whole number of seconds, got {value}")))
}
