//! Sensor readings: extracted field sets keyed by sensor name.
//!
//! A reading keeps the raw extracted values. Typed views (on/off, numeric,
//! coordinates) are computed on demand, the same way each entity kind
//! interprets its state.

use crate::config::SensorConfig;
use crate::config::SensorType;
use crate::extract;
use crate::response::ResponseWrapper;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// All readings produced by one poll, keyed by sensor name.
pub type SensorReadings = BTreeMap<String, SensorReading>;

/// How a device tracker determined its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Gps,
    Router,
    Bluetooth,
    BluetoothLe,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gps => "gps",
            Self::Router => "router",
            Self::Bluetooth => "bluetooth",
            Self::BluetoothLe => "bluetooth_le",
        }
    }
}

impl FromStr for SourceType {
    type Err = std::convert::Infallible;

    /// Unknown names fall back to GPS.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "router" => Self::Router,
            "bluetooth" => Self::Bluetooth,
            "bluetooth_le" => Self::BluetoothLe,
            _ => Self::Gps,
        })
    }
}

/// Extracted field set for one declared sensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(skip)]
    pub sensor_type: SensorType,
    pub state: Option<Value>,
    pub icon: Option<Value>,
    pub color: Option<Value>,
    pub device_class: Option<String>,
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
}

impl SensorReading {
    /// Binary interpretation of the state.
    pub fn is_on(&self) -> Option<bool> {
        match self.state.as_ref()? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => Some(matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "on" | "yes" | "1" | "active" | "open"
            )),
            Value::Number(n) => Some(n.as_f64().is_some_and(|v| v > 0.0)),
            Value::Array(items) => Some(!items.is_empty()),
            Value::Object(map) => Some(!map.is_empty()),
            Value::Null => None,
        }
    }

    /// Numeric interpretation of the state.
    pub fn native_number(&self) -> Option<f64> {
        self.state.as_ref().and_then(|v| as_f64(v, "state"))
    }

    /// Icon with the `mdi:` prefix applied.
    pub fn icon(&self) -> Option<String> {
        let icon = value_text(self.icon.as_ref()?);
        if icon.is_empty() {
            return None;
        }
        if icon.starts_with("mdi:") {
            Some(icon)
        } else {
            Some(format!("mdi:{icon}"))
        }
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude.as_ref().and_then(|v| as_f64(v, "latitude"))
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude.as_ref().and_then(|v| as_f64(v, "longitude"))
    }

    /// Location name, falling back to the state.
    pub fn location_name(&self) -> Option<String> {
        self.location_name
            .as_ref()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .or_else(|| self.state.as_ref().map(value_text))
    }

    /// State as the entity kind reports it.
    pub fn display_value(&self) -> Option<Value> {
        match self.sensor_type {
            SensorType::BinarySensor => self.is_on().map(Value::Bool),
            SensorType::Number => self
                .native_number()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            SensorType::DeviceTracker => self.location_name().map(Value::String),
            SensorType::Sensor => self.state.clone(),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value, field: &str) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if parsed.is_none() {
        tracing::warn!("Could not convert {field} '{value}' to a number");
    }
    parsed
}

fn extract_field(response: &ResponseWrapper, sensor: &str, field: &str, selector: Option<&str>) -> Option<Value> {
    let selector = selector.map(str::trim).filter(|s| !s.is_empty())?;
    let value = extract::extract(response, selector);
    if value.is_none() {
        tracing::warn!("Could not extract {field} for sensor '{sensor}' using selector '{selector}'");
    }
    value
}

/// Build the reading for one sensor from `response`.
pub fn read_sensor(response: &ResponseWrapper, sensor: &SensorConfig) -> SensorReading {
    let name = sensor.name.as_str();
    let mut reading = SensorReading {
        sensor_type: sensor.sensor_type,
        state: extract_field(response, name, "state", sensor.state.as_deref()),
        icon: extract_field(response, name, "icon", sensor.icon.as_deref()),
        color: extract_field(response, name, "color", sensor.color.as_deref()),
        device_class: sensor.device_class.clone().filter(|d| !d.is_empty()),
        unit: sensor.unit.clone().filter(|u| !u.is_empty()),
        ..SensorReading::default()
    };

    if sensor.sensor_type == SensorType::DeviceTracker {
        reading.latitude = extract_field(response, name, "latitude", sensor.latitude.as_deref());
        reading.longitude = extract_field(response, name, "longitude", sensor.longitude.as_deref());
        reading.location_name =
            extract_field(response, name, "location_name", sensor.location_name.as_deref());
        reading.source_type = Some(
            sensor
                .source_type
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        );
    }
    reading
}

/// Build readings for every declared sensor.
pub fn read_sensors(response: &ResponseWrapper, sensors: &[SensorConfig]) -> SensorReadings {
    sensors
        .iter()
        .map(|sensor| (sensor.name.clone(), read_sensor(response, sensor)))
        .collect()
}
