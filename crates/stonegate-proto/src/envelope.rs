use crate::descriptor::DeviceDescriptor;
use crate::measurement::Measurement;
use serde::{Deserialize, Serialize};

/// `{type: "descriptor", devices: [...]}`, sent once on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorMessage {
    #[serde(rename = "type")]
    pub kind: DescriptorMessageTag,
    pub devices: Vec<DeviceDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptorMessageTag {
    #[serde(rename = "descriptor")]
    Descriptor,
}

impl DescriptorMessage {
    pub fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            kind: DescriptorMessageTag::Descriptor,
            devices,
        }
    }
}

/// One device's measurement inside a `measurement_update` broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementEntry {
    pub id: String,
    pub measurement: Measurement,
}

/// `{type: "measurement_update", updates: [...]}`, sent every broadcast tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementUpdate {
    #[serde(rename = "type")]
    pub kind: MeasurementUpdateTag,
    pub updates: Vec<MeasurementEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementUpdateTag {
    #[serde(rename = "measurement_update")]
    MeasurementUpdate,
}

impl MeasurementUpdate {
    pub fn new(updates: Vec<MeasurementEntry>) -> Self {
        Self {
            kind: MeasurementUpdateTag::MeasurementUpdate,
            updates,
        }
    }
}
