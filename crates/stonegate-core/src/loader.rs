//! Builds devices, physics nodes, and edges from a device-graph document (C5).

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use stonegate_proto::{DeviceId, JsonValue};
use tracing::{info, warn};

use crate::error::CoreError;
use crate::physics::PhysicsEngine;
use crate::registry::DeviceRegistry;
use crate::simulated::SimulatedDevice;

const DEFAULT_TICK: Duration = Duration::from_millis(200);

fn read_json(path: &Path) -> Result<JsonValue, CoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: serde_json::Value = serde_json::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(json_to_proto(value))
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
            let mut out = indexmap::IndexMap::new();
            for (k, v) in map {
                out.insert(k, json_to_proto(v));
            }
            JsonValue::Object(out)
        }
    }
}

fn schema_properties(schema: &JsonValue, device_type: &str) -> Vec<String> {
    schema
        .as_object()
        .and_then(|m| m.get(device_type))
        .and_then(|v| v.as_array())
        .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn resolve_part_spec(node: &JsonValue, device_type: &str, parts: &HashMap<String, JsonValue>) -> JsonValue {
    if let Some(explicit) = node.as_object().and_then(|m| m.get("part")) {
        match explicit {
            JsonValue::Object(_) => return explicit.clone(),
            JsonValue::String(name) => {
                if let Some(part) = parts.get(name) {
                    return part.clone();
                }
            }
            _ => {}
        }
    }
    parts.get(device_type).cloned().unwrap_or_else(JsonValue::object)
}

fn hash_id(id: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    id.hash(&mut hasher);
    hasher.finish()
}

/// Loads a device-graph document (plus sibling `ComponentSchema.json` /
/// `PartsLibrary.json`) into `registry` and `physics`, then starts the
/// physics engine's background tick loop.
pub fn load_device_graph(
    graph_path: &Path,
    registry: &Arc<DeviceRegistry>,
    physics: &Arc<PhysicsEngine>,
    seed: u64,
) -> Result<(), CoreError> {
    let graph = read_json(graph_path)?;
    let dir = graph_path.parent().unwrap_or_else(|| Path::new("."));

    let schema_path = dir.join("ComponentSchema.json");
    let schema = if schema_path.exists() {
        read_json(&schema_path)?
    } else {
        JsonValue::object()
    };

    let parts_path = dir.join("PartsLibrary.json");
    let parts = if parts_path.exists() {
        crate::physics::load_parts_library(&parts_path)?
    } else {
        HashMap::new()
    };

    let Some(nodes) = graph.as_object().and_then(|m| m.get("nodes")).and_then(|v| v.as_array()) else {
        return Ok(());
    };

    for node in nodes {
        let Some(obj) = node.as_object() else { continue };
        let (Some(id_str), Some(device_type)) = (
            obj.get("id").and_then(|v| v.as_str()),
            obj.get("type").and_then(|v| v.as_str()),
        ) else {
            warn!("skipping device-graph node missing id/type");
            continue;
        };

        let Ok(device_id) = DeviceId::new(id_str) else {
            warn!(id = id_str, "skipping device-graph node with invalid id");
            continue;
        };

        let properties = schema_properties(&schema, device_type);
        let part_spec = resolve_part_spec(node, device_type, &parts);

        physics.register_node(device_id.clone(), device_type, part_spec);

        let device_seed = if seed != 0 { seed.wrapping_add(hash_id(id_str)) } else { 0 };
        let device = SimulatedDevice::new(
            device_id.clone(),
            device_type,
            properties,
            device_seed,
            Some(Arc::clone(physics)),
        );
        registry.register(Arc::new(device));
        info!(device_id = %device_id, device_type, "registered device");
    }

    if let Some(edges) = graph.as_object().and_then(|m| m.get("edges")).and_then(|v| v.as_array()) {
        for edge in edges {
            let Some(obj) = edge.as_object() else { continue };
            let (Some(from), Some(to)) = (
                obj.get("from").and_then(|v| v.as_str()),
                obj.get("to").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if let (Ok(from), Ok(to)) = (DeviceId::new(from), DeviceId::new(to)) {
                physics.register_edge(from, to);
            }
        }
    }

    physics.start_background_loop(DEFAULT_TICK);
    Ok(())
}

/// Resolves the default graph path from `STONEGATE_GRAPH_PATH`, falling back
/// to `override_path` when the env var is unset.
pub fn resolve_graph_path(override_path: Option<PathBuf>) -> Option<PathBuf> {
    std::env::var("STONEGATE_GRAPH_PATH").ok().map(PathBuf::from).or(override_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn loads_minimal_graph_and_registers_devices() {
        let dir = tempfile::tempdir().unwrap();
        let graph_path = dir.path().join("graph.json");
        let mut file = std::fs::File::create(&graph_path).unwrap();
        write!(
            file,
            r#"{{"nodes": [{{"id": "tc1", "type": "Thermocouple"}}], "edges": []}}"#
        )
        .unwrap();

        let registry = Arc::new(DeviceRegistry::new());
        let physics = Arc::new(PhysicsEngine::new());
        load_device_graph(&graph_path, &registry, &physics, 7).unwrap();

        assert_eq!(registry.len(), 1);
        physics.stop_background_loop();
    }
}
