//! All configured endpoint instances of a process.

use crate::config::{AgentConfig, AgentSettings};
use crate::error::{AgentError, AgentResult};
use crate::instance::{EndpointInstance, PollOutcome};
use crate::template::TemplateRenderer;
use std::sync::Arc;

/// Endpoint instances in configuration order.
pub struct EndpointRegistry {
    instances: Vec<Arc<EndpointInstance>>,
}

impl EndpointRegistry {
    /// Validate `config` and build one instance per endpoint.
    pub fn from_config(
        config: AgentConfig,
        settings: AgentSettings,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> AgentResult<Self> {
        config.validate()?;
        let instances = config
            .endpoints
            .into_iter()
            .map(|endpoint| Arc::new(EndpointInstance::new(endpoint, &settings, Arc::clone(&renderer))))
            .collect();
        Ok(Self { instances })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EndpointInstance>> {
        self.instances.iter()
    }

    pub fn get(&self, name: &str) -> AgentResult<Arc<EndpointInstance>> {
        self.instances
            .iter()
            .find(|instance| instance.name() == name)
            .cloned()
            .ok_or_else(|| AgentError::EndpointNotFound(name.to_string()))
    }

    /// Poll every enabled endpoint concurrently.
    pub async fn poll_all(&self) -> Vec<(String, PollOutcome)> {
        let polls = self.instances.iter().map(|instance| async move {
            instance
                .poll()
                .await
                .map(|outcome| (instance.name().to_string(), outcome))
        });
        futures::future::join_all(polls)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Close every instance's pool. Returns how many were open.
    pub fn shutdown_all(&self) -> usize {
        let closed = self.instances.iter().filter(|instance| instance.shutdown()).count();
        tracing::debug!("closed {closed} connection pool(s)");
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use crate::template::JinjaRenderer;

    fn registry(endpoints: Vec<EndpointConfig>) -> AgentResult<EndpointRegistry> {
        EndpointRegistry::from_config(
            AgentConfig { endpoints },
            AgentSettings::default(),
            Arc::new(JinjaRenderer::new()),
        )
    }

    #[test]
    fn test_lookup_by_name() {
        let reg = registry(vec![
            EndpointConfig::new("a", "http://a.local"),
            EndpointConfig::new("b", "http://b.local"),
        ])
        .unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("b").unwrap().name(), "b");
        assert!(matches!(reg.get("c"), Err(AgentError::EndpointNotFound(_))));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let dup = registry(vec![
            EndpointConfig::new("a", "http://a.local"),
            EndpointConfig::new("a", "http://b.local"),
        ]);
        assert!(matches!(dup, Err(AgentError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_disabled_endpoints_are_skipped() {
        let mut disabled = EndpointConfig::new("off", "http://127.0.0.1:9/never");
        disabled.enabled = false;
        let reg = registry(vec![disabled]).unwrap();
        assert!(reg.poll_all().await.is_empty());
    }

    #[test]
    fn test_shutdown_before_any_request() {
        let reg = registry(vec![EndpointConfig::new("a", "http://a.local")]).unwrap();
        assert_eq!(reg.shutdown_all(), 0);
        reg.get("a").unwrap().executor().pool().client(true).unwrap();
        assert_eq!(reg.shutdown_all(), 1);
        assert_eq!(reg.shutdown_all(), 0);
    }
}
