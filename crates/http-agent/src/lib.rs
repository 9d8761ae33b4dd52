//! http-agent: templated HTTP polling with JSON path, XPath and CSS value extraction.

pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod extract;
pub mod instance;
pub mod pool;
pub mod reading;
pub mod registry;
pub mod request;
pub mod response;
pub mod service;
pub mod template;

pub use config::{
    AgentConfig, AgentSettings, ContentType, EndpointConfig, HeaderPair, HttpMethod, PoolSettings,
    SensorConfig, SensorType,
};
pub use error::{AgentError, AgentResult};
pub use events::{AgentEvent, EventBus, RESPONSE_EVENT};
pub use executor::{RequestExecutor, RequestMetadata, RequestResult};
pub use extract::{extract, extract_detailed, Extraction, Strategy};
pub use instance::{EndpointInstance, PollOutcome};
pub use pool::ConnectionPool;
pub use reading::{read_sensors, SensorReading, SensorReadings, SourceType};
pub use registry::EndpointRegistry;
pub use request::{prepare, PreparedRequest, RequestBody, RequestSpec};
pub use response::{OutcomeState, ResponseWrapper};
pub use service::{ServiceCall, ServiceKind};
pub use template::{JinjaRenderer, TemplateRenderer, Variables};
