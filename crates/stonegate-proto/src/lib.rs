//! Wire types for the stonegate device RPC channel.
//!
//! All other stonegate crates refer to these shapes instead of inventing
//! their own JSON. Serialization is JSON over UTF-8; numeric fields are
//! IEEE-754 doubles unless explicitly an integer; timestamps are integer
//! milliseconds since the Unix epoch.

pub mod descriptor;
pub mod envelope;
pub mod ids;
pub mod measurement;
pub mod qec;
pub mod record;
pub mod rpc;
pub mod value;

pub use descriptor::{ActionPayload, DeviceDescriptor, MetricDescriptor, MetricKind};
pub use envelope::{DescriptorMessage, MeasurementEntry, MeasurementUpdate};
pub use ids::{DeviceId, DeviceIdError};
pub use measurement::{Measurement, MeasurementValue};
pub use qec::{
    QecBenchmarkParams, QecBenchmarkResult, QecBenchmarkStatistics, QecCorrection,
    QecDecodeParams, QecDecodeResult, QecDecodeStatistics, QecMeasurementEntry,
};
pub use record::{
    RecordStartParams, RecordStartResult, RecordStopParams, RecordStopResult, RecordStreamSpec,
    RecordingBackendInfo, RecordingFooter, RecordingHeader, RecordingMeta, RecordingSample,
};
pub use rpc::{ControlAck, ControlMessage, ErrorDetail, RpcErrorBody, RpcRequest, RpcResult};
pub use value::{deep_merge, JsonValue};
