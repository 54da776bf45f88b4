use crate::value::JsonValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single property's value plus its uncertainty. Uncertainty is always
/// >= 0; non-numeric values report 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementValue {
    pub value: JsonValue,
    pub uncertainty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MeasurementValue {
    pub fn numeric(value: f64, uncertainty: f64) -> Self {
        Self {
            value: JsonValue::Number(value),
            uncertainty: uncertainty.abs(),
            unit: None,
        }
    }

    pub fn exact(value: JsonValue) -> Self {
        Self {
            value,
            uncertainty: 0.0,
            unit: None,
        }
    }
}

/// A timestamped snapshot of a device's declared and derived properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub ts: i64,
    pub state: String,
    pub measurements: IndexMap<String, MeasurementValue>,
}

impl Measurement {
    pub fn nominal(ts: i64) -> Self {
        Self {
            ts,
            state: "nominal".to_string(),
            measurements: IndexMap::new(),
        }
    }
}
