//! Action-envelope mapping: translates the `action` field of a legacy
//! `action`/`device_action` control message (and `device.action` RPC calls)
//! into the `set_<prop>` convention `SimulatedDevice::perform_action`
//! understands.

use indexmap::IndexMap;
use stonegate_proto::JsonValue;

fn laser_controller_alias(key: &str) -> Option<&'static str> {
    match key {
        "phase_rad" => Some("set_phase"),
        "intensity" | "power" | "optical_power" => Some("set_intensity"),
        _ => None,
    }
}

fn ln2_cooling_controller_alias(key: &str) -> Option<&'static str> {
    match key {
        "temperature_K" | "setpoint_K" => Some("set_setpoint"),
        "flow_rate_Lmin" => Some("set_flow_rate"),
        _ => None,
    }
}

/// Build the final action payload sent to `Device::perform_action`.
///
/// If `action` has a `set` submap, every sibling key of `action` is copied
/// verbatim, then each `(k, v)` in `set` is expanded per the device-type
/// alias table, falling back to the generic `set_<k>` (plus a
/// suffix-stripped variant) when no alias applies.
pub fn map_action(device_type: &str, action: &IndexMap<String, JsonValue>) -> IndexMap<String, JsonValue> {
    let mut out = action.clone();
    let Some(set) = action.get("set").and_then(|v| v.as_object()) else {
        return out;
    };
    out.shift_remove("set");

    for (key, value) in set {
        if key.starts_with("set_") {
            out.insert(key.clone(), value.clone());
            continue;
        }

        let alias = match device_type {
            "laser_controller" | "Laser" => laser_controller_alias(key),
            "ln2_cooling_controller" | "LN2CoolingController" => ln2_cooling_controller_alias(key),
            _ => None,
        };

        if let Some(alias) = alias {
            out.insert(alias.to_string(), value.clone());
            continue;
        }

        out.insert(format!("set_{key}"), value.clone());
        if let Some((stem, _suffix)) = key.rsplit_once('_') {
            out.insert(format!("set_{stem}"), value.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, JsonValue)]) -> IndexMap<String, JsonValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn laser_phase_rad_maps_to_set_phase() {
        let action = obj(&[("set", JsonValue::Object(obj(&[("phase_rad", JsonValue::Number(1.2))])))]);
        let mapped = map_action("laser_controller", &action);
        assert!(mapped.contains_key("set_phase"));
    }

    #[test]
    fn ln2_setpoint_k_maps_to_set_setpoint() {
        let action = obj(&[("set", JsonValue::Object(obj(&[("setpoint_K", JsonValue::Number(77.0))])))]);
        let mapped = map_action("ln2_cooling_controller", &action);
        assert!(mapped.contains_key("set_setpoint"));
    }

    #[test]
    fn unknown_key_falls_back_to_generic_set_prefix() {
        let action = obj(&[("set", JsonValue::Object(obj(&[("averages", JsonValue::Int(8))])))]);
        let mapped = map_action("NoiseSpectrometer", &action);
        assert!(mapped.contains_key("set_averages"));
    }

    #[test]
    fn suffixed_key_also_gets_stem_variant() {
        let action = obj(&[("set", JsonValue::Object(obj(&[("center_freq_hz", JsonValue::Number(5e9))])))]);
        let mapped = map_action("NoiseSpectrometer", &action);
        assert!(mapped.contains_key("set_center_freq_hz"));
        assert!(mapped.contains_key("set_center_freq"));
    }

    #[test]
    fn action_without_set_submap_passes_through() {
        let action = obj(&[("zero", JsonValue::Bool(true))]);
        let mapped = map_action("Thermocouple", &action);
        assert_eq!(mapped.get("zero"), Some(&JsonValue::Bool(true)));
    }
}
