//! Template rendering for request fields.
//!
//! URL, header values, payload and query string are Jinja-style templates.
//! Rendering is a collaborator behind [`TemplateRenderer`] so the host can
//! plug in its own engine; [`JinjaRenderer`] is the stock implementation.
//! A failed render never aborts a request: [`render_or_raw`] logs and falls
//! back to the literal template text.

use chrono::Local;
use minijinja::Environment;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};

/// Variable names supplied by the host that callers may not define.
pub const RESERVED_VARIABLES: &[&str] = &["states", "now"];

/// Caller-supplied template variables.
pub type Variables = Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum TemplateError {
    #[error("render failed: {0}")]
    Render(String),
}

/// Renders a template string against a set of variables.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, template: &str, variables: &Variables) -> Result<String, TemplateError>;
}

/// Render `template`, returning it unchanged if rendering fails.
pub fn render_or_raw(renderer: &dyn TemplateRenderer, template: &str, variables: &Variables) -> String {
    if template.is_empty() {
        return String::new();
    }
    match renderer.render(template, variables) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::warn!("Failed to render template '{template}': {e}");
            template.to_string()
        }
    }
}

/// Drop reserved names from caller data, keeping everything else.
pub fn caller_variables(data: &Map<String, Value>) -> Variables {
    data.iter()
        .filter(|(key, _)| {
            let reserved = RESERVED_VARIABLES.contains(&key.as_str());
            if reserved {
                tracing::warn!("ignoring reserved template variable '{key}' from caller data");
            }
            !reserved
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Jinja renderer backed by `minijinja`.
///
/// Every render sees the caller's variables plus two host values: `states`,
/// a snapshot of entity states the host pushes via [`JinjaRenderer::set_states`],
/// and `now`, the local time as an RFC 3339 string.
#[derive(Clone)]
pub struct JinjaRenderer {
    env: Arc<Environment<'static>>,
    states: Arc<RwLock<Map<String, Value>>>,
}

impl JinjaRenderer {
    pub fn new() -> Self {
        Self {
            env: Arc::new(Environment::new()),
            states: Arc::new(RwLock::new(Map::new())),
        }
    }

    /// Replace the entity-state snapshot exposed as `states`.
    pub fn set_states(&self, states: Map<String, Value>) {
        match self.states.write() {
            Ok(mut guard) => *guard = states,
            Err(poisoned) => *poisoned.into_inner() = states,
        }
    }

    fn context(&self, variables: &Variables) -> Map<String, Value> {
        let mut ctx = variables.clone();
        let states = match self.states.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        ctx.insert("states".to_string(), Value::Object(states));
        ctx.insert("now".to_string(), Value::String(Local::now().to_rfc3339()));
        ctx
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(&self, template: &str, variables: &Variables) -> Result<String, TemplateError> {
        self.env
            .render_str(template, self.context(variables))
            .map_err(|e| TemplateError::Render(e.to_string()))
    }
}
