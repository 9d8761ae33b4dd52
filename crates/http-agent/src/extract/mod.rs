//! Selector-driven value extraction from a [`ResponseWrapper`].
//!
//! A selector carries no strategy tag. The engine orders the strategies by
//! what the response declares (`content-type`) and what actually parsed, then
//! evaluates the selector under each in turn until one produces a value.
//!
//! # Ordering
//!
//! Only strategies whose content-type hint (`json`, `xml`, `html`) appears in
//! the response's `content-type` and whose body channel parsed are tried. When
//! none qualifies, every strategy whose channel parsed is tried instead. The
//! order is fixed either way: JSON path, XPath, CSS. A strategy whose channel
//! is absent is never attempted.
//!
//! Extraction is synchronous and never performs I/O.

pub mod css;
pub mod json_path;
pub mod xpath;

use crate::response::ResponseWrapper;
use serde::Serialize;
use serde_json::Value;

/// One of the three ways a selector can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    JsonPath,
    XPath,
    Css,
}

impl Strategy {
    /// Fixed tie-break order.
    pub const ALL: [Strategy; 3] = [Strategy::JsonPath, Strategy::XPath, Strategy::Css];

    /// Substring of a `content-type` value that prefers this strategy.
    pub fn content_type_hint(self) -> &'static str {
        match self {
            Self::JsonPath => "json",
            Self::XPath => "xml",
            Self::Css => "html",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::JsonPath => "json_path",
            Self::XPath => "xpath",
            Self::Css => "css",
        }
    }

    fn is_available(self, response: &ResponseWrapper) -> bool {
        match self {
            Self::JsonPath => response.json().is_some(),
            Self::XPath => response.xml().is_some(),
            Self::Css => response.html().is_some(),
        }
    }

    fn evaluate(self, response: &ResponseWrapper, selector: &str) -> Result<Option<Value>, ExtractError> {
        match self {
            Self::JsonPath => Ok(response
                .json()
                .and_then(|root| json_path::select(root, selector))),
            Self::XPath => match response.xml() {
                Some(package) => Ok(xpath::select(package, selector)?.map(Value::String)),
                None => Ok(None),
            },
            Self::Css => match response.html() {
                Some(document) => Ok(css::select(document, selector)?.map(Value::String)),
                None => Ok(None),
            },
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single strategy produced nothing. Always recovered by the engine.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

/// Outcome of one extraction, including which strategies were tried.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub value: Option<Value>,
    /// Strategy that produced `value`.
    pub strategy: Option<Strategy>,
    /// Strategies evaluated, in order.
    pub attempted: Vec<Strategy>,
}

/// Strategies to try for `response`, in evaluation order.
pub fn candidate_strategies(response: &ResponseWrapper) -> Vec<Strategy> {
    let content_type = response
        .content_type()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let available: Vec<Strategy> = Strategy::ALL
        .into_iter()
        .filter(|strategy| strategy.is_available(response))
        .collect();
    let preferred: Vec<Strategy> = available
        .iter()
        .copied()
        .filter(|strategy| content_type.contains(strategy.content_type_hint()))
        .collect();

    if preferred.is_empty() {
        available
    } else {
        preferred
    }
}

/// Evaluate `selector` and return the first value any strategy produces.
pub fn extract(response: &ResponseWrapper, selector: &str) -> Option<Value> {
    extract_detailed(response, selector).value
}

/// Like [`extract`], but also reports the strategies involved.
pub fn extract_detailed(response: &ResponseWrapper, selector: &str) -> Extraction {
    let selector = selector.trim();
    if selector.is_empty() {
        return Extraction::default();
    }

    let mut attempted = Vec::new();
    for strategy in candidate_strategies(response) {
        attempted.push(strategy);
        match strategy.evaluate(response, selector) {
            Ok(Some(value)) => {
                return Extraction {
                    value: Some(value),
                    strategy: Some(strategy),
                    attempted,
                };
            }
            Ok(None) => {
                tracing::debug!("{strategy} found nothing for selector '{selector}'");
            }
            Err(e) => {
                tracing::debug!("{strategy} failed for selector '{selector}': {e}");
            }
        }
    }

    Extraction {
        value: None,
        strategy: None,
        attempted,
    }
}
