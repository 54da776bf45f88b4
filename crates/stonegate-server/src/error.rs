//! Detail tokens for the `control_rejected` error taxonomy (spec section
//! naming these literally), kept as named constants so call sites can't
//! typo a token string.

pub const RPC_MISSING_ID: &str = "rpc_missing_id";
pub const RPC_MISSING_METHOD: &str = "rpc_missing_method";
pub const RPC_UNKNOWN_METHOD: &str = "rpc_unknown_method";
pub const UNKNOWN_DEVICE: &str = "unknown_device";
pub const MISSING_DEVICE_ID: &str = "missing_device_id";
pub const MISSING_ACTION: &str = "missing_action";
pub const MISSING_RECORDING_ID: &str = "missing_recording_id";
pub const UNKNOWN_RECORDING_ID: &str = "unknown_recording_id";
pub const QEC_MEASUREMENTS_NOT_ARRAY: &str = "qec_measurements_not_array";
pub const RECORD_PARAMS_NOT_OBJECT: &str = "record_params_not_object";
pub const RECORD_STREAMS_REQUIRED: &str = "record_streams_required";
pub const RECORD_STREAM_MISSING_DEVICE_ID: &str = "record_stream_missing_device_id";
pub const RECORD_STREAM_RATE_INVALID: &str = "record_stream_rate_invalid";
pub const RECORD_OPEN_FILE_FAILED: &str = "record_open_file_failed";
pub const INVALID_REQUEST: &str = "invalid_request";
