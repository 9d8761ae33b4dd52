//! One configured endpoint and the resources it owns.

use crate::config::{AgentSettings, EndpointConfig};
use crate::error::AgentResult;
use crate::events::{AgentEvent, EventBus};
use crate::executor::{RequestExecutor, RequestResult};
use crate::pool::ConnectionPool;
use crate::reading::{read_sensors, SensorReadings};
use crate::service::ServiceCall;
use crate::template::TemplateRenderer;
use serde::Serialize;
use std::sync::Arc;

/// Everything one poll cycle produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollOutcome {
    pub result: RequestResult,
    pub sensors: SensorReadings,
}

/// A configured endpoint with its own pool and event bus.
pub struct EndpointInstance {
    config: EndpointConfig,
    executor: RequestExecutor,
    events: EventBus,
}

impl EndpointInstance {
    pub fn new(config: EndpointConfig, settings: &AgentSettings, renderer: Arc<dyn TemplateRenderer>) -> Self {
        let pool = Arc::new(ConnectionPool::new(settings.pool));
        Self {
            config,
            executor: RequestExecutor::new(pool, renderer),
            events: EventBus::new(settings.event_capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Run one poll cycle. Disabled endpoints return `None` without I/O.
    pub async fn poll(&self) -> Option<PollOutcome> {
        if !self.config.enabled {
            tracing::debug!("endpoint '{}' is disabled, skipping poll", self.config.name);
            return None;
        }

        let spec = self.config.request_spec();
        let (response, metadata) = self.executor.execute(&spec).await;
        let sensors = read_sensors(&response, &self.config.sensors);
        let result = RequestResult::new(&response, &metadata);
        drop(response);

        self.events.emit(AgentEvent::PollCompleted {
            endpoint: self.config.name.clone(),
            state: result.state,
            status_code: result.status_code,
            elapsed_ms: metadata.elapsed_ms,
        });
        Some(PollOutcome { result, sensors })
    }

    /// Run a manually triggered request and publish its result.
    pub async fn call_service(&self, call: &ServiceCall) -> AgentResult<RequestResult> {
        let spec = call.request_spec()?;
        let result = self.executor.execute_result(&spec).await;

        self.events.emit(AgentEvent::Response {
            service: call.service.as_str().to_string(),
            data: call.data.clone(),
            result: result.clone(),
        });
        tracing::info!(
            "HTTP {} request to {} completed with status {}",
            spec.method,
            spec.url,
            result
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
        Ok(result)
    }

    /// Release the connection pool. Returns `false` if it was already closed.
    pub fn shutdown(&self) -> bool {
        self.executor.pool().close()
    }
}
