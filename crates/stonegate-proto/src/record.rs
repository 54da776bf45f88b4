use crate::measurement::MeasurementValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One device/metric pair to sample at an independent rate. `metrics`
/// empty means "include every available metric".
#[derive(Debug, Clone, Deserialize)]
pub struct RecordStreamSpec {
    pub device_id: String,
    #[serde(default)]
    pub metrics: Vec<String>,
    pub rate_hz: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordStartParams {
    pub streams: Vec<RecordStreamSpec>,
    pub file_base: Option<String>,
    pub script_name: Option<String>,
    pub operator: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordStartResult {
    pub recording_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordStopParams {
    pub recording_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordStopResult {
    pub recording_id: String,
    pub path: String,
    pub samples_written: u64,
    pub started_ts_ms: i64,
    pub stopped_ts_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingBackendInfo {
    pub port: u16,
    pub git_commit: String,
    pub build_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingMeta {
    pub script_name: Option<String>,
    pub operator: Option<String>,
    pub backend: RecordingBackendInfo,
}

/// First line written to a recording file.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingHeader {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub schema_version: u32,
    pub recording_id: String,
    pub started_ts_ms: i64,
    pub meta: RecordingMeta,
    pub streams: Vec<RecordStreamSpec>,
}

impl RecordingHeader {
    pub fn new(
        recording_id: String,
        started_ts_ms: i64,
        meta: RecordingMeta,
        streams: Vec<RecordStreamSpec>,
    ) -> Self {
        Self {
            kind: "stonegate_recording",
            schema_version: 1,
            recording_id,
            started_ts_ms,
            meta,
            streams,
        }
    }
}

impl Serialize for RecordStreamSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("RecordStreamSpec", 3)?;
        s.serialize_field("device_id", &self.device_id)?;
        s.serialize_field("metrics", &self.metrics)?;
        s.serialize_field("rate_hz", &self.rate_hz)?;
        s.end()
    }
}

/// A middle line of a recording file: one device's normalized sample.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSample {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub ts_ms: i64,
    pub device_id: String,
    pub state: String,
    pub measurements: IndexMap<String, MeasurementValue>,
}

impl RecordingSample {
    pub fn new(
        ts_ms: i64,
        device_id: String,
        state: String,
        measurements: IndexMap<String, MeasurementValue>,
    ) -> Self {
        Self {
            kind: "sample",
            ts_ms,
            device_id,
            state,
            measurements,
        }
    }
}

/// Last line written to a recording file on graceful stop.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingFooter {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub recording_id: String,
    pub stopped_ts_ms: i64,
    pub samples_written: u64,
}

impl RecordingFooter {
    pub fn new(recording_id: String, stopped_ts_ms: i64, samples_written: u64) -> Self {
        Self {
            kind: "stop",
            recording_id,
            stopped_ts_ms,
            samples_written,
        }
    }
}
