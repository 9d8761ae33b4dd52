//! Normalized, multi-format view of one HTTP response.
//!
//! A [`ResponseWrapper`] is built once per request and never mutated. The
//! body is parsed on demand through three independent channels (JSON, XML,
//! HTML); a channel whose parse fails is simply absent and never affects the
//! others.
//!
//! The wrapper holds `scraper` and `sxd_document` trees, which are not
//! `Send`. Build it, extract from it, and drop it without crossing an
//! `.await`.

use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use sxd_document::Package;

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeState {
    /// Completed with a 2xx status.
    Ok,
    /// Completed with a non-2xx status, or failed in transport.
    Error,
    /// Did not finish within its timeout.
    Timeout,
}

impl OutcomeState {
    /// Classify a completed response by status code.
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            Self::Ok
        } else {
            Self::Error
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for OutcomeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable response record with lazily parsed body channels.
pub struct ResponseWrapper {
    status_code: Option<u16>,
    text: String,
    headers: BTreeMap<String, String>,
    state: OutcomeState,
    json: OnceCell<Option<Value>>,
    xml: OnceCell<Option<Package>>,
    html: OnceCell<Option<Html>>,
}

impl ResponseWrapper {
    /// Wrap a response that completed at the HTTP level.
    pub fn completed<I, K, V>(status: u16, headers: I, text: String) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut folded: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in headers {
            let key = key.as_ref().to_ascii_lowercase();
            let value = value.into();
            folded
                .entry(key)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        Self {
            status_code: Some(status),
            text,
            headers: folded,
            state: OutcomeState::from_status(status),
            json: OnceCell::new(),
            xml: OnceCell::new(),
            html: OnceCell::new(),
        }
    }

    /// Wrap a request that never produced a response.
    pub fn failed(state: OutcomeState) -> Self {
        Self {
            status_code: None,
            text: String::new(),
            headers: BTreeMap::new(),
            state,
            json: OnceCell::new(),
            xml: OnceCell::new(),
            html: OnceCell::new(),
        }
    }

    /// Wrap a body obtained outside the executor (files, fixtures).
    pub fn from_body(content_type: Option<&str>, text: impl Into<String>) -> Self {
        let headers = content_type.map(|ct| ("content-type", ct.to_string()));
        Self::completed(200, headers, text.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header lookup; `name` is matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn state(&self) -> OutcomeState {
        self.state
    }

    /// Body parsed as JSON, if it is valid JSON.
    pub fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| serde_json::from_str(&self.text).ok())
            .as_ref()
    }

    /// Body parsed as an XML document, if it is well-formed.
    pub fn xml(&self) -> Option<&Package> {
        self.xml
            .get_or_init(|| {
                let body = self.text.trim();
                if body.is_empty() {
                    return None;
                }
                sxd_document::parser::parse(body).ok()
            })
            .as_ref()
    }

    /// Body parsed as an HTML document. Absent for blank bodies.
    pub fn html(&self) -> Option<&Html> {
        self.html
            .get_or_init(|| {
                if self.text.trim().is_empty() {
                    None
                } else {
                    Some(Html::parse_document(&self.text))
                }
            })
            .as_ref()
    }
}

impl std::fmt::Debug for ResponseWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWrapper")
            .field("status_code", &self.status_code)
            .field("state", &self.state)
            .field("headers", &self.headers)
            .field("body_len", &self.text.len())
            .finish()
    }
}
