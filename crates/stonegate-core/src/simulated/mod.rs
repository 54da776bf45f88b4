//! Reference simulated device implementation (C2) with per-type state
//! machines for the eight QEC-adjacent device types.

mod behavior;
mod noise;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stonegate_proto::{DeviceDescriptor, DeviceId, JsonValue, Measurement, MeasurementValue, MetricDescriptor, MetricKind};
use tracing::instrument;

use crate::device::Device;
use crate::physics::{standalone_p_flip, PhysicsEngine};

pub use behavior::DeviceBehavior;

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

struct Inner {
    rng: ChaCha8Rng,
    numeric_state: IndexMap<String, f64>,
    int_state: IndexMap<String, i64>,
    bool_state: IndexMap<String, bool>,
    string_state: IndexMap<String, String>,
    behavior: DeviceBehavior,
    last_read_ms: i64,
}

/// A simulated device: a per-type state machine over four parallel stores
/// (numeric/int/bool/string), optionally coupled to a physics engine for
/// environment-driven derived properties.
pub struct SimulatedDevice {
    id: DeviceId,
    device_type: String,
    properties: Vec<String>,
    physics: Option<Arc<PhysicsEngine>>,
    inner: Mutex<Inner>,
}

/// Controller-typed devices push a subset of their state into the physics
/// engine so downstream derived properties respond on the next tick.
fn is_controller_type(device_type: &str) -> bool {
    matches!(device_type, "Laser" | "PhaseModulator" | "PressureController" | "LN2CoolingController")
}

impl SimulatedDevice {
    pub fn new(
        id: DeviceId,
        device_type: impl Into<String>,
        properties: Vec<String>,
        seed: u64,
        physics: Option<Arc<PhysicsEngine>>,
    ) -> Self {
        let device_type = device_type.into();
        let mut rng = ChaCha8Rng::seed_from_u64(seed_or_clock(seed));

        let mut numeric_state = IndexMap::new();
        let mut int_state = IndexMap::new();
        let mut bool_state = IndexMap::new();
        let mut string_state = IndexMap::new();

        for prop in &properties {
            noise::seed_default(prop, &mut rng, &mut numeric_state, &mut int_state, &mut bool_state, &mut string_state);
        }

        let behavior = DeviceBehavior::for_type(&device_type);

        Self {
            id,
            device_type,
            properties,
            physics,
            inner: Mutex::new(Inner {
                rng,
                numeric_state,
                int_state,
                bool_state,
                string_state,
                behavior,
                last_read_ms: now_ms(),
            }),
        }
    }

    fn metric_kind_for(&self, inner: &Inner, prop: &str) -> MetricKind {
        if inner.bool_state.contains_key(prop) {
            MetricKind::Boolean
        } else if inner.int_state.contains_key(prop) {
            MetricKind::Integer
        } else if inner.string_state.contains_key(prop) {
            MetricKind::String
        } else {
            MetricKind::Number
        }
    }
}

impl Device for SimulatedDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn device_type(&self) -> &str {
        &self.device_type
    }

    fn descriptor(&self) -> DeviceDescriptor {
        let inner = self.inner.lock().unwrap();
        let mut metrics = IndexMap::new();
        for prop in &self.properties {
            metrics.insert(prop.clone(), MetricDescriptor::new(self.metric_kind_for(&inner, prop)));
        }
        DeviceDescriptor {
            id: self.id.to_string(),
            device_type: self.device_type.clone(),
            simulated: Some(true),
            properties: self.properties.clone(),
            metrics,
        }
    }

    #[instrument(skip(self), fields(device_id = %self.id))]
    fn read_measurement(&self) -> Measurement {
        let mut inner = self.inner.lock().unwrap();
        let ts = now_ms();
        let dt_s = ((ts - inner.last_read_ms).max(0) as f64) / 1000.0;
        inner.last_read_ms = ts;

        let snapshot = self.physics.as_ref().map(|p| p.get_cached_step());
        let device_snapshot = snapshot
            .as_ref()
            .and_then(|s| s.get(&self.id))
            .and_then(|v| v.as_object());

        let noise_coeff = device_snapshot
            .and_then(|m| m.get("noise_coeff"))
            .and_then(|v| v.as_f64());

        let mut measurements = IndexMap::new();

        for prop in &self.properties {
            // 2: resolve base value, bool -> int -> string -> numeric.
            if let Some(b) = inner.bool_state.get(prop).copied() {
                measurements.insert(prop.clone(), MeasurementValue::exact(JsonValue::Bool(b)));
                continue;
            }
            if let Some(i) = inner.int_state.get(prop).copied() {
                measurements.insert(prop.clone(), MeasurementValue::exact(JsonValue::Int(i)));
                continue;
            }
            if let Some(s) = inner.string_state.get(prop).cloned() {
                measurements.insert(prop.clone(), MeasurementValue::exact(JsonValue::String(s)));
                continue;
            }

            let mut base = inner.numeric_state.get(prop).copied().unwrap_or_else(|| {
                1.0 + noise::sample_normal(&mut inner.rng, 0.0, 0.01)
            });

            // 3: snapshot override for this device/key.
            if let Some(v) = device_snapshot.and_then(|m| m.get(prop)).and_then(|v| v.as_f64()) {
                base = v;
            }

            // 4: temperature aliasing.
            if prop == "temperature_C" {
                if let Some(t_k) = device_snapshot.and_then(|m| m.get("temperature_K")).and_then(|v| v.as_f64()) {
                    base = t_k - 273.15;
                }
            } else if prop.contains("temp") && prop != "temperature_C" {
                if let Some(t_k) = device_snapshot.and_then(|m| m.get("temperature_K")).and_then(|v| v.as_f64()) {
                    base = t_k;
                }
            }

            let rel = noise_coeff.unwrap_or(0.01).max(1e-4);
            let noisy = base + noise::sample_normal(&mut inner.rng, 0.0, (base.abs() * rel).max(1e-6));
            measurements.insert(prop.clone(), MeasurementValue::numeric(noisy, noisy.abs() * rel));
        }

        let temperature_k = device_snapshot
            .and_then(|m| m.get("temperature_K"))
            .and_then(|v| v.as_f64());
        let pressure_kpa = device_snapshot
            .and_then(|m| m.get("pressure_kPa"))
            .and_then(|v| v.as_f64());
        let vibration_rms = device_snapshot
            .and_then(|m| m.get("vibration_rms"))
            .and_then(|v| v.as_f64());
        let refractive_index = device_snapshot
            .and_then(|m| m.get("refractive_index"))
            .and_then(|v| v.as_f64());
        let leak_rate_per_s = device_snapshot
            .and_then(|m| m.get("leak_rate_per_s"))
            .and_then(|v| v.as_f64());

        behavior::inject_derived(
            &mut inner,
            &self.device_type,
            temperature_k,
            pressure_kpa,
            refractive_index,
            vibration_rms,
            leak_rate_per_s,
            dt_s,
            &mut measurements,
        );

        Measurement {
            ts,
            state: "nominal".to_string(),
            measurements,
        }
    }

    #[instrument(skip(self, cmd), fields(device_id = %self.id))]
    fn perform_action(&self, cmd: &JsonValue) {
        let Some(obj) = cmd.as_object() else { return };
        let mut inner = self.inner.lock().unwrap();

        // 1: explicit envelope keys.
        if let Some(v) = obj.get("seal").and_then(|v| v.as_bool()) {
            inner.bool_state.insert("sealed".to_string(), v);
        }
        if let Some(v) = obj.get("vent").and_then(|v| v.as_bool()) {
            if v {
                inner.bool_state.insert("sealed".to_string(), false);
            }
        }
        if let Some(v) = obj.get("pump_enable").and_then(|v| v.as_bool()) {
            inner.bool_state.insert("pump_enabled".to_string(), v);
        }
        if let Some(v) = obj.get("set_pressure_kPa").and_then(|v| v.as_f64()) {
            inner.numeric_state.insert("pressure_setpoint_kPa".to_string(), v);
        }

        // 2: generic set_<prop> convention, with the power/optical_power alias.
        for (key, value) in obj {
            if let Some(prop) = key.strip_prefix("set_") {
                write_by_kind(&mut inner, prop, value);
                if prop == "power" {
                    write_by_kind(&mut inner, "optical_power", value);
                }
            }
        }

        // 3: zero/reset.
        if obj.get("zero").and_then(|v| v.as_bool()).unwrap_or(false)
            || obj.get("reset").and_then(|v| v.as_bool()).unwrap_or(false)
        {
            for v in inner.numeric_state.values_mut() {
                *v = 0.0;
            }
            for v in inner.int_state.values_mut() {
                *v = 0;
            }
            for v in inner.bool_state.values_mut() {
                *v = false;
            }
        }

        // 4: type-specific dispatch.
        behavior::dispatch_action(&mut inner, &self.device_type, obj, self.physics.as_deref());

        // 5: controller-typed devices push state into the physics engine.
        if is_controller_type(&self.device_type) {
            if let Some(physics) = &self.physics {
                let submap = controller_submap(&self.device_type, &inner);
                if !submap.is_empty() {
                    physics.update_controller_state(&self.id, JsonValue::Object(submap));
                }
            }
        }
    }
}

fn write_by_kind(inner: &mut Inner, prop: &str, value: &JsonValue) {
    match value {
        JsonValue::Bool(b) => {
            inner.bool_state.insert(prop.to_string(), *b);
        }
        JsonValue::Int(i) => {
            inner.int_state.insert(prop.to_string(), *i);
        }
        JsonValue::Number(n) => {
            inner.numeric_state.insert(prop.to_string(), *n);
        }
        JsonValue::String(s) => {
            inner.string_state.insert(prop.to_string(), s.clone());
        }
        _ => {}
    }
}

fn controller_submap(device_type: &str, inner: &Inner) -> IndexMap<String, JsonValue> {
    let mut out = IndexMap::new();
    let keys: &[&str] = match device_type {
        "Laser" => &["optical_power", "power", "phase_rad", "phase"],
        "PhaseModulator" => &["phase_rad", "phase"],
        "PressureController" => &["pressure_setpoint_kPa", "sealed", "pump_enabled"],
        "LN2CoolingController" => &["flow_rate_Lmin", "setpoint_K"],
        _ => &[],
    };
    for key in keys {
        if let Some(v) = inner.numeric_state.get(*key) {
            out.insert(key.to_string(), JsonValue::Number(*v));
        }
        if let Some(v) = inner.bool_state.get(*key) {
            out.insert(key.to_string(), JsonValue::Bool(*v));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_sequence_for_fixed_seed() {
        let a = SimulatedDevice::new(
            DeviceId::new("d0").unwrap(),
            "QECModule",
            vec!["syndrome".to_string(), "correction_applied".to_string()],
            42,
            None,
        );
        let b = SimulatedDevice::new(
            DeviceId::new("d0").unwrap(),
            "QECModule",
            vec!["syndrome".to_string(), "correction_applied".to_string()],
            42,
            None,
        );

        let seq_a: Vec<_> = (0..3)
            .map(|_| a.read_measurement().measurements.get("syndrome").unwrap().value.clone())
            .collect();
        let seq_b: Vec<_> = (0..3)
            .map(|_| b.read_measurement().measurements.get("syndrome").unwrap().value.clone())
            .collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn generic_set_prop_writes_numeric_store() {
        let device = SimulatedDevice::new(
            DeviceId::new("laser0").unwrap(),
            "Laser",
            vec!["optical_power".to_string()],
            7,
            None,
        );
        let mut patch = IndexMap::new();
        patch.insert("set_optical_power".to_string(), JsonValue::Number(9.5));
        device.perform_action(&JsonValue::Object(patch));
        let inner = device.inner.lock().unwrap();
        assert_eq!(inner.numeric_state.get("optical_power"), Some(&9.5));
    }
}
