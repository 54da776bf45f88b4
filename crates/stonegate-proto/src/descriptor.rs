use crate::value::JsonValue;
use serde::{Deserialize, Serialize};

/// The JSON kind a metric's value takes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Number,
    Integer,
    Boolean,
    String,
}

/// Bounds and type information for one declared device property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub kind: MetricKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

impl MetricDescriptor {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            unit: None,
            min: None,
            max: None,
            precision: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// A device's identity, declared properties, and per-property metric
/// metadata. Projected from the registry by the descriptor protocol (C6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated: Option<bool>,
    pub properties: Vec<String>,
    pub metrics: indexmap::IndexMap<String, MetricDescriptor>,
}

/// Arbitrary additional fields some callers attach to an action or patch
/// payload that don't fit the strongly-typed envelopes. Reserved for future
/// extension; currently unused but kept so `JsonValue` stays reachable from
/// the public API surface without an unused-import warning.
pub type ActionPayload = indexmap::IndexMap<String, JsonValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips_through_json() {
        let mut metrics = indexmap::IndexMap::new();
        metrics.insert(
            "temperature_K".to_string(),
            MetricDescriptor::new(MetricKind::Number)
                .with_unit("K")
                .with_bounds(50.0, 350.0),
        );
        let descriptor = DeviceDescriptor {
            id: "tc1".to_string(),
            device_type: "Thermocouple".to_string(),
            simulated: Some(true),
            properties: vec!["temperature_K".to_string()],
            metrics,
        };
        let json = serde_json::to_string(&descriptor).unwrap();
        let back: DeviceDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
        assert!(json.contains("\"type\":\"Thermocouple\""));
    }
}
