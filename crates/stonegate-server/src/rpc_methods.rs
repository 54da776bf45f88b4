//! Implementations of the RPC methods dispatched by `dispatch::handle_rpc`.

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use stonegate_core::Device;
use stonegate_proto::{DeviceId, JsonValue, RpcErrorBody};

use crate::action_map::map_action;
use crate::error;
use crate::state::AppState;

/// Round-trips any `Serialize` result type through `serde_json::Value` into
/// our wire `JsonValue`, the same conversion used at the file-I/O boundary
/// in the core crate's loader/overrides modules.
pub fn to_json_value<T: Serialize>(value: &T) -> JsonValue {
    json_to_proto(serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
}

fn json_to_proto(value: serde_json::Value) -> JsonValue {
    match value {
        serde_json::Value::Null => JsonValue::Null,
        serde_json::Value::Bool(b) => JsonValue::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::Int(i)
            } else {
                JsonValue::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => JsonValue::String(s),
        serde_json::Value::Array(items) => JsonValue::Array(items.into_iter().map(json_to_proto).collect()),
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::new();
            for (k, v) in map {
                out.insert(k, json_to_proto(v));
            }
            JsonValue::Object(out)
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn seed_or_clock(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

pub fn devices_list(state: &AppState) -> JsonValue {
    let devices = state.registry.descriptor_graph();
    let mut out = IndexMap::new();
    out.insert("devices".to_string(), JsonValue::Array(devices.iter().map(to_json_value).collect()));
    JsonValue::Object(out)
}

pub fn devices_poll(state: &AppState) -> JsonValue {
    let updates = state.registry.poll_all();
    let entries: Vec<JsonValue> = updates
        .into_iter()
        .map(|(id, measurement)| {
            let mut m = IndexMap::new();
            m.insert("id".to_string(), JsonValue::String(id.to_string()));
            m.insert("measurement".to_string(), to_json_value(&measurement));
            JsonValue::Object(m)
        })
        .collect();
    let mut out = IndexMap::new();
    out.insert("updates".to_string(), JsonValue::Array(entries));
    JsonValue::Object(out)
}

pub fn backend_info(state: &AppState) -> JsonValue {
    let mut out = IndexMap::new();
    out.insert("port".to_string(), JsonValue::Int(state.port as i64));
    out.insert("git_commit".to_string(), JsonValue::String(state.git_commit.clone()));
    out.insert("build_time".to_string(), JsonValue::String(state.build_time.clone()));
    JsonValue::Object(out)
}

pub fn device_action(state: &AppState, params: &JsonValue) -> Result<JsonValue, RpcErrorBody> {
    let obj = params.as_object().ok_or_else(|| RpcErrorBody::rejected(error::MISSING_DEVICE_ID))?;
    let device_id_str = obj
        .get("device_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcErrorBody::rejected(error::MISSING_DEVICE_ID))?;
    let action = obj
        .get("action")
        .and_then(|v| v.as_object())
        .ok_or_else(|| RpcErrorBody::rejected(error::MISSING_ACTION))?;

    let device_id = DeviceId::new(device_id_str).map_err(|_| RpcErrorBody::rejected(error::UNKNOWN_DEVICE))?;
    let device = state.registry.get(&device_id).ok_or_else(|| RpcErrorBody::rejected(error::UNKNOWN_DEVICE))?;

    let mapped = map_action(device.device_type(), action);
    device.perform_action(&JsonValue::Object(mapped));

    let mut out = IndexMap::new();
    out.insert("device_id".to_string(), JsonValue::String(device_id_str.to_string()));
    out.insert("applied".to_string(), JsonValue::Bool(true));
    Ok(JsonValue::Object(out))
}

pub fn record_start(state: &AppState, params: &JsonValue) -> Result<JsonValue, RpcErrorBody> {
    let obj = params.as_object().ok_or_else(|| RpcErrorBody::rejected(error::RECORD_PARAMS_NOT_OBJECT))?;
    let raw_streams = obj
        .get("streams")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcErrorBody::rejected(error::RECORD_STREAMS_REQUIRED))?;
    if raw_streams.is_empty() {
        return Err(RpcErrorBody::rejected(error::RECORD_STREAMS_REQUIRED));
    }

    let mut streams = Vec::with_capacity(raw_streams.len());
    for stream in raw_streams {
        let Some(s) = stream.as_object() else {
            return Err(RpcErrorBody::rejected(error::RECORD_STREAM_MISSING_DEVICE_ID));
        };
        let device_id = s
            .get("device_id")
            .and_then(|v| v.as_str())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| RpcErrorBody::rejected(error::RECORD_STREAM_MISSING_DEVICE_ID))?;
        let rate_hz = s.get("rate_hz").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if !rate_hz.is_finite() || rate_hz <= 0.0 {
            return Err(RpcErrorBody::rejected(error::RECORD_STREAM_RATE_INVALID));
        }
        let metrics = s
            .get("metrics")
            .and_then(|v| v.as_array())
            .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        streams.push(stonegate_proto::RecordStreamSpec {
            device_id: device_id.to_string(),
            metrics,
            rate_hz,
        });
    }

    let params = stonegate_proto::RecordStartParams {
        streams,
        file_base: obj.get("file_base").and_then(|v| v.as_str()).map(str::to_string),
        script_name: obj.get("script_name").and_then(|v| v.as_str()).map(str::to_string),
        operator: obj.get("operator").and_then(|v| v.as_str()).map(str::to_string),
    };

    state
        .recorder
        .start(params)
        .map(|result| to_json_value(&result))
        .map_err(|_| RpcErrorBody::rejected(error::RECORD_OPEN_FILE_FAILED))
}

pub async fn record_stop(state: &AppState, params: &JsonValue) -> Result<JsonValue, RpcErrorBody> {
    let recording_id = params
        .as_object()
        .and_then(|m| m.get("recording_id"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcErrorBody::rejected(error::MISSING_RECORDING_ID))?;

    state
        .recorder
        .stop(recording_id)
        .await
        .map(|result| to_json_value(&result))
        .ok_or_else(|| RpcErrorBody::rejected(error::UNKNOWN_RECORDING_ID))
}

pub fn qec_decode(params: &JsonValue) -> Result<JsonValue, RpcErrorBody> {
    let obj = params.as_object();
    let job_id = obj.and_then(|m| m.get("job_id")).and_then(|v| v.as_str()).map(str::to_string);
    let measurements = obj
        .and_then(|m| m.get("measurements"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| RpcErrorBody::rejected(error::QEC_MEASUREMENTS_NOT_ARRAY))?;

    let mut tally: IndexMap<i64, (i64, i64)> = IndexMap::new();
    let mut total = 0usize;
    for entry in measurements {
        let Some(entry) = entry.as_object() else { continue };
        let Some(qubit) = entry.get("qubit").and_then(|v| v.as_i64()) else { continue };
        if qubit < 0 {
            continue;
        }
        let value = entry.get("value").and_then(|v| v.as_i64()).unwrap_or(0);
        total += 1;
        let slot = tally.entry(qubit).or_insert((0, 0));
        if value == 0 {
            slot.0 += 1;
        } else {
            slot.1 += 1;
        }
    }

    let corrections: Vec<JsonValue> = tally
        .into_iter()
        .map(|(qubit, (zeros, ones))| {
            let mut c = IndexMap::new();
            c.insert("qubit".to_string(), JsonValue::Int(qubit));
            c.insert("round".to_string(), JsonValue::Int(0));
            c.insert("correction".to_string(), JsonValue::Int(if ones > zeros { 1 } else { 0 }));
            JsonValue::Object(c)
        })
        .collect();

    let mut statistics = IndexMap::new();
    statistics.insert("qubits".to_string(), JsonValue::Int(corrections.len() as i64));
    statistics.insert("measurements".to_string(), JsonValue::Int(total as i64));

    let mut out = IndexMap::new();
    out.insert("job_id".to_string(), job_id.map(JsonValue::String).unwrap_or(JsonValue::Null));
    out.insert("corrections".to_string(), JsonValue::Array(corrections));
    out.insert("statistics".to_string(), JsonValue::Object(statistics));
    Ok(JsonValue::Object(out))
}

fn force_odd_at_least_3(d: i64) -> i64 {
    let d = d.max(3);
    if d % 2 == 0 {
        d + 1
    } else {
        d
    }
}

pub fn qec_benchmark(params: &JsonValue) -> Result<JsonValue, RpcErrorBody> {
    let obj = params.as_object();
    let job_id = obj.and_then(|m| m.get("job_id")).and_then(|v| v.as_str()).map(str::to_string);
    let code = obj
        .and_then(|m| m.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("repetition")
        .to_string();
    let p_flip = obj.and_then(|m| m.get("p_flip")).and_then(|v| v.as_f64()).unwrap_or(0.05).clamp(0.0, 1.0);
    let rounds = obj.and_then(|m| m.get("rounds")).and_then(|v| v.as_i64()).unwrap_or(1).max(1);
    let shots = obj.and_then(|m| m.get("shots")).and_then(|v| v.as_i64()).unwrap_or(1).max(1);
    let seed = obj.and_then(|m| m.get("seed")).and_then(|v| v.as_i64()).unwrap_or(0).max(0) as u64;
    let distance = obj
        .and_then(|m| m.get("params"))
        .and_then(|v| v.as_object())
        .and_then(|p| p.get("distance"))
        .and_then(|v| v.as_i64())
        .map(force_odd_at_least_3)
        .unwrap_or(3);

    let decoded_error_rate = match code.as_str() {
        "repetition" => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed_or_clock(seed));
            let mut errors = 0_i64;
            for _ in 0..shots {
                let ones = (0..rounds).filter(|_| rng.gen_bool(p_flip)).count() as i64;
                if ones * 2 > rounds {
                    errors += 1;
                }
            }
            errors as f64 / shots as f64
        }
        "surface" => {
            let exponent = (distance as f64 + 1.0) / 2.0;
            (0.1 * (p_flip / 0.01).max(1e-12).powf(exponent)).clamp(0.0, 1.0)
        }
        _ => p_flip,
    };

    let statistics = stonegate_proto::QecBenchmarkStatistics {
        shots,
        rounds,
        p_flip,
        raw_error_rate: p_flip,
        decoded_error_rate,
        code,
    };

    let mut out = IndexMap::new();
    out.insert("job_id".to_string(), job_id.map(JsonValue::String).unwrap_or(JsonValue::Null));
    out.insert("status".to_string(), JsonValue::String("done".to_string()));
    out.insert("statistics".to_string(), to_json_value(&statistics));
    let _ = now_ms();
    Ok(JsonValue::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, JsonValue)]) -> JsonValue {
        JsonValue::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn qec_decode_majority_votes_per_qubit() {
        let measurements = JsonValue::Array(vec![
            obj(&[("qubit", JsonValue::Int(0)), ("value", JsonValue::Int(1))]),
            obj(&[("qubit", JsonValue::Int(0)), ("value", JsonValue::Int(1))]),
            obj(&[("qubit", JsonValue::Int(0)), ("value", JsonValue::Int(0))]),
        ]);
        let params = obj(&[("measurements", measurements)]);
        let result = qec_decode(&params).unwrap();
        let corrections = result.as_object().unwrap().get("corrections").unwrap().as_array().unwrap();
        assert_eq!(corrections[0].as_object().unwrap().get("correction").unwrap().as_i64(), Some(1));
    }

    #[test]
    fn qec_decode_skips_negative_qubits() {
        let measurements = JsonValue::Array(vec![obj(&[("qubit", JsonValue::Int(-1)), ("value", JsonValue::Int(1))])]);
        let params = obj(&[("measurements", measurements)]);
        let result = qec_decode(&params).unwrap();
        let corrections = result.as_object().unwrap().get("corrections").unwrap().as_array().unwrap();
        assert!(corrections.is_empty());
    }

    #[test]
    fn qec_benchmark_surface_uses_fowler_scaling() {
        let params = obj(&[
            ("code", JsonValue::String("surface".to_string())),
            ("p_flip", JsonValue::Number(0.01)),
        ]);
        let result = qec_benchmark(&params).unwrap();
        let stats = result.as_object().unwrap().get("statistics").unwrap();
        let decoded = stats.as_object().unwrap().get("decoded_error_rate").unwrap().as_f64().unwrap();
        assert!((decoded - 0.1).abs() < 1e-9);
    }

    #[test]
    fn qec_benchmark_same_seed_is_deterministic() {
        let params = obj(&[
            ("code", JsonValue::String("repetition".to_string())),
            ("seed", JsonValue::Int(99)),
            ("shots", JsonValue::Int(50)),
            ("rounds", JsonValue::Int(5)),
        ]);
        let a = qec_benchmark(&params).unwrap();
        let b = qec_benchmark(&params).unwrap();
        assert_eq!(a, b);
    }
}
