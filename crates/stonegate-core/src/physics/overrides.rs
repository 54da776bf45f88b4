use std::collections::HashMap;
use std::fs;
use std::path::Path;

use stonegate_proto::{DeviceId, JsonValue};

use crate::error::CoreError;

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

fn read_json_file(path: &Path) -> Result<JsonValue, CoreError> {
    let contents = fs::read_to_string(path).map_err(|e| CoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let value: serde_json::Value = serde_json::from_str(&contents).map_err(|e| CoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(json_to_proto(value))
}

/// Per-type default part specs, keyed by `type`. Built-in entries come
/// from `PartsLibrary.json`; a sibling `user_parts.json`, if present,
/// merges on top (later entries for the same type win).
pub type PartsLibrary = HashMap<String, JsonValue>;

/// First entry whose `type` matches wins; later duplicates within the same
/// document are ignored.
fn parts_by_type(doc: &JsonValue) -> PartsLibrary {
    let mut out = HashMap::new();
    let Some(entries) = doc.as_array() else {
        return out;
    };
    for entry in entries {
        let Some(obj) = entry.as_object() else { continue };
        let Some(ty) = obj.get("type").and_then(|v| v.as_str()) else {
            continue;
        };
        out.entry(ty.to_string()).or_insert_with(|| entry.clone());
    }
    out
}

/// Parse `PartsLibrary.json` next to `path`, then merge `user_parts.json`
/// from the same directory on top if present.
pub fn load_parts_library(path: &Path) -> Result<PartsLibrary, CoreError> {
    let builtin = read_json_file(path)?;
    let mut merged = parts_by_type(&builtin);

    if let Some(dir) = path.parent() {
        let user_path = dir.join("user_parts.json");
        if user_path.exists() {
            let user_doc = read_json_file(&user_path)?;
            for (ty, part) in parts_by_type(&user_doc) {
                merged.insert(ty, part);
            }
        }
    }

    Ok(merged)
}

/// Parse a device-override document: `{device_id: patch, ...}`.
pub fn load_override_file(path: &Path) -> Result<HashMap<DeviceId, JsonValue>, CoreError> {
    let doc = read_json_file(path)?;
    let mut out = HashMap::new();
    let Some(obj) = doc.as_object() else {
        return Ok(out);
    };
    for (id, patch) in obj {
        if let Ok(device_id) = DeviceId::new(id.clone()) {
            out.insert(device_id, patch.clone());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_device_override_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tc1": {{"noise_coeff": 0.02}}}}"#).unwrap();
        let parsed = load_override_file(file.path()).unwrap();
        let tc1 = DeviceId::new("tc1").unwrap();
        assert!(parsed.contains_key(&tc1));
    }

    #[test]
    fn parts_library_merges_user_parts_over_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let builtin_path = dir.path().join("PartsLibrary.json");
        fs::write(
            &builtin_path,
            r#"[{"type": "Laser", "noise_coeff": 0.01}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("user_parts.json"),
            r#"[{"type": "Laser", "noise_coeff": 0.05}]"#,
        )
        .unwrap();

        let library = load_parts_library(&builtin_path).unwrap();
        let laser = library.get("Laser").unwrap();
        let noise_coeff = laser.as_object().unwrap().get("noise_coeff").unwrap().as_f64();
        assert_eq!(noise_coeff, Some(0.05));
    }
}
