//! Error types surfaced to callers of the agent.
//!
//! Only configuration problems and malformed manual requests are reported as
//! errors. Everything that can go wrong during a poll cycle degrades to a
//! well-defined outcome state or an absent value instead.

/// Errors that can occur while configuring or driving the agent.
#[derive(thiserror::Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL is required")]
    MissingUrl,

    #[error("Unsupported HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Unsupported content type: {0}")]
    InvalidContentType(String),

    #[error("Unsupported sensor type: {0}")]
    InvalidSensorType(String),

    #[error("Device class '{device_class}' is not valid for {sensor_type} sensors")]
    InvalidDeviceClass {
        sensor_type: String,
        device_class: String,
    },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Variable name '{0}' is reserved")]
    ReservedVariable(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(String),
}

/// Convenience result type.
pub type AgentResult<T> = Result<T, AgentError>;
