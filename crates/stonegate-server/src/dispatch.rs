//! Routes an incoming frame to the legacy-control or RPC handler and
//! returns the serialized reply, if any.

use stonegate_core::Device;
use stonegate_proto::{ControlAck, ControlMessage, JsonValue, RpcErrorBody, RpcRequest, RpcResult};
use tracing::warn;

use crate::error;
use crate::rpc_methods;
use crate::state::AppState;

/// Parse `raw` and dispatch. Malformed JSON is silently dropped per the
/// frame-parsing policy; everything else always produces a reply.
pub async fn handle_message(state: &AppState, raw: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(raw).ok()?;
    let obj = value.as_object()?;

    let is_rpc = obj.get("type").and_then(|v| v.as_str()) == Some("rpc");
    if is_rpc {
        let request: RpcRequest = serde_json::from_str(raw).ok()?;
        return Some(serde_json::to_string(&handle_rpc(state, request).await).unwrap_or_default());
    }

    if obj.contains_key("cmd") {
        let message: ControlMessage = serde_json::from_str(raw).ok()?;
        return Some(serde_json::to_string(&handle_control(state, message)).unwrap_or_default());
    }

    None
}

async fn handle_rpc(state: &AppState, request: RpcRequest) -> RpcResult {
    let Some(id) = request.id.filter(|id| !id.is_empty()) else {
        return RpcResult::err(None, RpcErrorBody::rejected(error::RPC_MISSING_ID));
    };
    let Some(method) = request.method.filter(|m| !m.is_empty()) else {
        return RpcResult::err(Some(id), RpcErrorBody::rejected(error::RPC_MISSING_METHOD));
    };
    let params = request.params.unwrap_or_else(JsonValue::object);

    let outcome: Result<JsonValue, RpcErrorBody> = match method.as_str() {
        "devices.list" => Ok(rpc_methods::devices_list(state)),
        "devices.poll" => Ok(rpc_methods::devices_poll(state)),
        "backend.info" => Ok(rpc_methods::backend_info(state)),
        "device.action" => rpc_methods::device_action(state, &params),
        "record.start" => rpc_methods::record_start(state, &params),
        "record.stop" => rpc_methods::record_stop(state, &params).await,
        "qec.decode" => rpc_methods::qec_decode(&params),
        "qec.benchmark" => rpc_methods::qec_benchmark(&params),
        _ => Err(RpcErrorBody::rejected(error::RPC_UNKNOWN_METHOD)),
    };

    match outcome {
        Ok(result) => RpcResult::ok(Some(id), result),
        Err(err) => RpcResult::err(Some(id), err),
    }
}

fn handle_control(state: &AppState, message: ControlMessage) -> ControlAck {
    let Some(cmd) = message.cmd.clone() else {
        return ControlAck::new(None, false);
    };

    match cmd.as_str() {
        "reload_overrides" => {
            let any = state.physics.reload_overrides();
            ControlAck::new(Some(cmd), true).with_field("any", JsonValue::Bool(any))
        }
        "action" | "device_action" => {
            let device_id = message.extra.get("device_id").and_then(|v| v.as_str());
            let action = message.extra.get("action").and_then(|v| v.as_object());
            let (Some(device_id), Some(action)) = (device_id, action) else {
                warn!("action control message missing device_id/action");
                return ControlAck::new(Some(cmd), false);
            };
            let Ok(id) = stonegate_proto::DeviceId::new(device_id) else {
                return ControlAck::new(Some(cmd), false);
            };
            let Some(device) = state.registry.get(&id) else {
                return ControlAck::new(Some(cmd), false);
            };
            let mapped = crate::action_map::map_action(device.device_type(), action);
            device.perform_action(&JsonValue::Object(mapped));
            ControlAck::new(Some(cmd), true)
        }
        _ => ControlAck::new(Some(cmd), false),
    }
}
