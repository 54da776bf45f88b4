use crate::value::JsonValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// `{type:"rpc", id, method, params}` client request.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub id: Option<String>,
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<JsonValue>,
}

/// Detail tokens named in the error taxonomy. Carried as a plain string so
/// new tokens don't require a protocol version bump.
pub type ErrorDetail = String;

#[derive(Debug, Clone, Serialize)]
pub struct RpcErrorBody {
    pub code: &'static str,
    pub message: String,
    pub details: IndexMap<String, JsonValue>,
}

impl RpcErrorBody {
    pub fn rejected(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let mut details = IndexMap::new();
        details.insert("detail".to_string(), JsonValue::String(detail.clone()));
        Self {
            code: "control_rejected",
            message: detail,
            details,
        }
    }

    pub fn with_field(mut self, key: &str, value: JsonValue) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// `{type:"rpc_result", id, ok, result?, error?}` server reply.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResult {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResult {
    pub fn ok(id: Option<String>, result: JsonValue) -> Self {
        Self {
            kind: "rpc_result",
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Option<String>, error: RpcErrorBody) -> Self {
        Self {
            kind: "rpc_result",
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Legacy `{cmd, ...}` control message. `extra` retains sibling keys
/// (`device_id`, `action`, ...) the specific command needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlMessage {
    pub cmd: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

/// `{type:"control_ack", cmd, ok, ...}` reply to a legacy control message.
#[derive(Debug, Clone, Serialize)]
pub struct ControlAck {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub cmd: Option<String>,
    pub ok: bool,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

impl ControlAck {
    pub fn new(cmd: Option<String>, ok: bool) -> Self {
        Self {
            kind: "control_ack",
            cmd,
            ok,
            extra: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: JsonValue) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}
