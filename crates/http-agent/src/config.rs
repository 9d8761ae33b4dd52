//! Endpoint configuration and process-level settings.
//!
//! Endpoint definitions arrive as JSON (normally produced by the host's
//! configuration UI) and are validated once up front. Connection-pool and
//! event-bus sizing come from environment variables.

use crate::error::{AgentError, AgentResult};
use crate::request::RequestSpec;
use crate::template::RESERVED_VARIABLES;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 86_400;

const DEFAULT_POOL_MAX: usize = 100;
const DEFAULT_POOL_MAX_PER_HOST: usize = 30;
const DEFAULT_POOL_IDLE_SECS: u64 = 90;
const DEFAULT_EVENT_CAPACITY: usize = 64;

// ── HTTP method ──────────────────────────────────────────────────────────────

/// HTTP methods an endpoint may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "delete")]
    Delete,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "head")]
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
        }
    }

    /// Methods whose rendered payload is sent as a request body.
    pub fn carries_payload(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
        }
    }
}

impl FromStr for HttpMethod {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            _ => Err(AgentError::InvalidMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Request content type ─────────────────────────────────────────────────────

/// Declared content type for raw (non-JSON) request payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "application/json")]
    Json,
    #[serde(rename = "application/xml")]
    ApplicationXml,
    #[serde(rename = "text/xml")]
    TextXml,
    #[serde(rename = "application/x-www-form-urlencoded")]
    FormUrlEncoded,
    #[serde(rename = "text/plain")]
    TextPlain,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::ApplicationXml => "application/xml",
            Self::TextXml => "text/xml",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::TextPlain => "text/plain",
        }
    }
}

impl FromStr for ContentType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "application/json" => Ok(Self::Json),
            "application/xml" => Ok(Self::ApplicationXml),
            "text/xml" => Ok(Self::TextXml),
            "application/x-www-form-urlencoded" => Ok(Self::FormUrlEncoded),
            "text/plain" => Ok(Self::TextPlain),
            _ => Err(AgentError::InvalidContentType(s.to_string())),
        }
    }
}

// ── Sensors ──────────────────────────────────────────────────────────────────

/// Kind of entity a declared output field feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    #[default]
    Sensor,
    BinarySensor,
    Number,
    DeviceTracker,
}

impl SensorType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
            Self::Number => "number",
            Self::DeviceTracker => "device_tracker",
        }
    }

    /// Device classes the host platform accepts for this entity kind.
    pub fn device_classes(self) -> &'static [&'static str] {
        match self {
            Self::Sensor => SENSOR_DEVICE_CLASSES,
            Self::BinarySensor => BINARY_SENSOR_DEVICE_CLASSES,
            Self::Number => NUMBER_DEVICE_CLASSES,
            Self::DeviceTracker => &[],
        }
    }
}

impl FromStr for SensorType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sensor" => Ok(Self::Sensor),
            "binary_sensor" => Ok(Self::BinarySensor),
            "number" => Ok(Self::Number),
            "device_tracker" => Ok(Self::DeviceTracker),
            _ => Err(AgentError::InvalidSensorType(s.to_string())),
        }
    }
}

/// One declared output field: which selectors feed which reading attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(rename = "sensor_name")]
    pub name: String,
    #[serde(rename = "sensor_type", default)]
    pub sensor_type: SensorType,
    #[serde(rename = "sensor_state", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "sensor_icon", default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "sensor_color", default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "sensor_device_class", default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(rename = "sensor_unit", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "tracker_latitude", default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(rename = "tracker_longitude", default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
    #[serde(rename = "tracker_location_name", default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(rename = "tracker_source_type", default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

impl SensorConfig {
    pub fn validate(&self) -> AgentResult<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "sensor_name must not be empty".to_string(),
            ));
        }
        if let Some(device_class) = self.device_class.as_deref().filter(|d| !d.is_empty()) {
            if !self.sensor_type.device_classes().contains(&device_class) {
                return Err(AgentError::InvalidDeviceClass {
                    sensor_type: self.sensor_type.as_str().to_string(),
                    device_class: device_class.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ── Endpoints ────────────────────────────────────────────────────────────────

/// A single request header; the value is a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair {
    pub key: String,
    pub value: String,
}

impl HeaderPair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// One configured integration instance: the endpoint to poll and the fields
/// derived from its response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: Vec<HeaderPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default = "default_true", alias = "ssl_verify")]
    pub verify_ssl: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub querystring: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

fn default_true() -> bool {
    true
}

impl EndpointConfig {
    /// Minimal enabled GET endpoint with default bounds.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: HttpMethod::Get,
            headers: Vec::new(),
            payload: None,
            content_type: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            interval: DEFAULT_INTERVAL_SECS,
            verify_ssl: true,
            querystring: None,
            enabled: true,
            variables: Map::new(),
            sensors: Vec::new(),
        }
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.name.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "endpoint name must not be empty".to_string(),
            ));
        }
        if self.url.trim().is_empty() {
            return Err(AgentError::MissingUrl);
        }
        check_range("timeout", self.timeout, MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)?;
        check_range("interval", self.interval, MIN_INTERVAL_SECS, MAX_INTERVAL_SECS)?;

        if let Some(reserved) = self
            .variables
            .keys()
            .find(|k| RESERVED_VARIABLES.contains(&k.as_str()))
        {
            return Err(AgentError::ReservedVariable(reserved.clone()));
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            sensor.validate()?;
            if !seen.insert(sensor.name.as_str()) {
                return Err(AgentError::InvalidConfig(format!(
                    "duplicate sensor_name '{}' in endpoint '{}'",
                    sensor.name, self.name
                )));
            }
        }
        Ok(())
    }

    /// Interval the host's timer should use between poll cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Snapshot the request half of this endpoint.
    pub fn request_spec(&self) -> RequestSpec {
        RequestSpec {
            url: self.url.clone(),
            method: self.method,
            headers: self.headers.clone(),
            payload: self.payload.clone(),
            querystring: self.querystring.clone(),
            content_type: self.content_type,
            timeout: Duration::from_secs(self.timeout),
            verify_tls: self.verify_ssl,
            variables: self.variables.clone(),
        }
    }
}

pub(crate) fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> AgentResult<()> {
    if value < min || value > max {
        return Err(AgentError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Top-level configuration file: `{"endpoints": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl AgentConfig {
    pub fn from_json(raw: &str) -> AgentResult<Self> {
        let config: AgentConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> AgentResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> AgentResult<()> {
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            endpoint.validate()?;
            if !seen.insert(endpoint.name.as_str()) {
                return Err(AgentError::InvalidConfig(format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
        }
        Ok(())
    }
}

// ── Process settings ─────────────────────────────────────────────────────────

/// Bounds for the per-instance connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum concurrent requests across all hosts.
    pub max_connections: usize,
    /// Maximum concurrent requests to a single host.
    pub max_per_host: usize,
    /// How long idle keep-alive connections are retained.
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_POOL_MAX,
            max_per_host: DEFAULT_POOL_MAX_PER_HOST,
            idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_SECS),
        }
    }
}

/// Settings shared by every instance in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    pub pool: PoolSettings,
    pub event_capacity: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            pool: PoolSettings::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl AgentSettings {
    pub fn from_env() -> Self {
        Self {
            pool: PoolSettings {
                max_connections: read_env_usize("HTTP_AGENT_POOL_MAX", DEFAULT_POOL_MAX).max(1),
                max_per_host: read_env_usize(
                    "HTTP_AGENT_POOL_MAX_PER_HOST",
                    DEFAULT_POOL_MAX_PER_HOST,
                )
                .max(1),
                idle_timeout: Duration::from_secs(read_env_u64(
                    "HTTP_AGENT_POOL_IDLE_SECS",
                    DEFAULT_POOL_IDLE_SECS,
                )),
            },
            event_capacity: read_env_usize("HTTP_AGENT_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)
                .max(1),
        }
    }
}

fn read_env_u64(name: &str, default_value: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default_value)
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

// ── Device classes ───────────────────────────────────────────────────────────

pub const SENSOR_DEVICE_CLASSES: &[&str] = &[
    "apparent_power",
    "aqi",
    "atmospheric_pressure",
    "battery",
    "carbon_dioxide",
    "carbon_monoxide",
    "current",
    "data_rate",
    "data_size",
    "date",
    "distance",
    "duration",
    "energy",
    "energy_storage",
    "enum",
    "frequency",
    "gas",
    "humidity",
    "illuminance",
    "irradiance",
    "moisture",
    "monetary",
    "nitrogen_dioxide",
    "nitrogen_monoxide",
    "nitrous_oxide",
    "ozone",
    "ph",
    "pm1",
    "pm10",
    "pm25",
    "power",
    "power_factor",
    "precipitation",
    "precipitation_intensity",
    "pressure",
    "reactive_power",
    "signal_strength",
    "sound_pressure",
    "speed",
    "sulphur_dioxide",
    "temperature",
    "timestamp",
    "volatile_organic_compounds",
    "volatile_organic_compounds_parts",
    "voltage",
    "volume",
    "volume_flow_rate",
    "volume_storage",
    "water",
    "weight",
    "wind_speed",
];

pub const BINARY_SENSOR_DEVICE_CLASSES: &[&str] = &[
    "battery",
    "battery_charging",
    "carbon_monoxide",
    "cold",
    "connectivity",
    "door",
    "garage_door",
    "gas",
    "heat",
    "light",
    "lock",
    "moisture",
    "motion",
    "moving",
    "occupancy",
    "opening",
    "plug",
    "power",
    "presence",
    "problem",
    "running",
    "safety",
    "smoke",
    "sound",
    "tamper",
    "update",
    "vibration",
    "window",
];

pub const NUMBER_DEVICE_CLASSES: &[&str] = &[
    "apparent_power",
    "aqi",
    "atmospheric_pressure",
    "battery",
    "carbon_dioxide",
    "carbon_monoxide",
    "current",
    "data_rate",
    "data_size",
    "distance",
    "duration",
    "energy",
    "energy_storage",
    "frequency",
    "gas",
    "humidity",
    "illuminance",
    "irradiance",
    "moisture",
    "monetary",
    "nitrogen_dioxide",
    "nitrogen_monoxide",
    "nitrous_oxide",
    "ozone",
    "ph",
    "pm1",
    "pm10",
    "pm25",
    "power",
    "power_factor",
    "precipitation",
    "precipitation_intensity",
    "pressure",
    "reactive_power",
    "signal_strength",
    "sound_pressure",
    "speed",
    "sulphur_dioxide",
    "temperature",
    "volatile_organic_compounds",
    "volatile_organic_compounds_parts",
    "voltage",
    "volume",
    "volume_flow_rate",
    "volume_storage",
    "water",
    "weight",
    "wind_speed",
];
