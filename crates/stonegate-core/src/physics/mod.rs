//! Environmental dynamics, per-device derived-property cache, and the
//! three-layer override system (C4).

mod overrides;

pub use overrides::{load_parts_library, PartsLibrary};

use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Instant, SystemTime};

use stonegate_proto::{deep_merge, DeviceId, JsonValue};
use tracing::{instrument, warn};

const LN2_ID: &str = "ln2";
const PRESS_CTRL_ID: &str = "press_ctrl0";
const LASER_ID: &str = "laser0";
const PHASE_MOD_ID: &str = "pm0";
const AMBIENT_ID: &str = "amb0";

const QEC_TYPES: &[&str] = &[
    "QECModule",
    "SyndromeStream",
    "SurfaceCodeController",
    "LatticeSurgeryController",
    "LeakageResetController",
    "NoiseSpectrometer",
    "ReadoutCalibrator",
    "FaultInjector",
];

/// Singleton environmental state, clamped on every update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentalState {
    pub temperature_k: f64,
    pub pressure_kpa: f64,
    pub ambient_lux: f64,
    pub vibration_rms: f64,
}

impl Default for EnvironmentalState {
    fn default() -> Self {
        Self {
            temperature_k: 295.0,
            pressure_kpa: 101.3,
            ambient_lux: 500.0,
            vibration_rms: 0.0003,
        }
    }
}

impl EnvironmentalState {
    fn clamp(&mut self) {
        self.temperature_k = self.temperature_k.clamp(50.0, 350.0);
        self.pressure_kpa = self.pressure_kpa.clamp(10.0, 200.0);
        self.ambient_lux = self.ambient_lux.clamp(0.0, 10_000.0);
        self.vibration_rms = self.vibration_rms.clamp(0.0, 0.05);
    }
}

/// A registered physics node: a device id, its declared type, and the part
/// spec frozen at registration.
#[derive(Debug, Clone)]
pub struct Node {
    pub device_id: DeviceId,
    pub node_type: String,
    pub part_spec: JsonValue,
}

/// `p_flip(T_K) = clamp(0.01 + 0.004*max(0, T_K - 77), 0, 0.35)` — the
/// standalone noise model used when a device has no physics reference.
pub fn standalone_p_flip(temperature_k: f64) -> f64 {
    (0.01 + 0.004 * (temperature_k - 77.0).max(0.0)).clamp(0.0, 0.35)
}

/// The richer, environment-driven variant combining temperature, fractional
/// pressure deviation, and vibration.
fn environment_p_flip(temperature_k: f64, pressure_kpa: f64, vibration_rms: f64) -> f64 {
    let pressure_term = 0.06 * (pressure_kpa - 101.3).abs() / 101.3;
    (0.01 + 0.0035 * (temperature_k - 77.0).max(0.0) + pressure_term + 10.0 * vibration_rms)
        .clamp(0.0, 0.35)
}

fn spec_number(spec: &JsonValue, key: &str, default: f64) -> f64 {
    spec.as_object()
        .and_then(|m| m.get(key))
        .and_then(|v| v.as_f64())
        .unwrap_or(default)
}

fn spec_bool(spec: &JsonValue, key: &str, default: bool) -> bool {
    spec.as_object()
        .and_then(|m| m.get(key))
        .and_then(|v| v.as_bool())
        .unwrap_or(default)
}

fn controller_number(state: Option<&JsonValue>, keys: &[&str], default: f64) -> f64 {
    let Some(state) = state.and_then(|v| v.as_object()) else {
        return default;
    };
    for key in keys {
        if let Some(v) = state.get(*key).and_then(|v| v.as_f64()) {
            return v;
        }
    }
    default
}

/// Background simulator owning environment, overrides, and the cached
/// per-device property map. `Arc`-shared between the server, the loader,
/// and simulated devices; devices hold a non-owning reference, never the
/// other way around.
pub struct PhysicsEngine {
    env: RwLock<EnvironmentalState>,
    nodes: RwLock<IndexMap<DeviceId, Node>>,
    edges: RwLock<Vec<(DeviceId, DeviceId)>>,
    controller_state: RwLock<HashMap<DeviceId, JsonValue>>,
    device_overrides: RwLock<HashMap<DeviceId, JsonValue>>,
    runtime_overrides: RwLock<HashMap<DeviceId, JsonValue>>,
    cache: RwLock<Arc<HashMap<DeviceId, JsonValue>>>,
    overrides_path: RwLock<Option<PathBuf>>,
    overrides_mtime: RwLock<Option<SystemTime>>,
    last_tick: RwLock<Instant>,
    running: Arc<AtomicBool>,
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine {
    pub fn new() -> Self {
        Self {
            env: RwLock::new(EnvironmentalState::default()),
            nodes: RwLock::new(IndexMap::new()),
            edges: RwLock::new(Vec::new()),
            controller_state: RwLock::new(HashMap::new()),
            device_overrides: RwLock::new(HashMap::new()),
            runtime_overrides: RwLock::new(HashMap::new()),
            cache: RwLock::new(Arc::new(HashMap::new())),
            overrides_path: RwLock::new(None),
            overrides_mtime: RwLock::new(None),
            last_tick: RwLock::new(Instant::now()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register_node(&self, device_id: DeviceId, node_type: impl Into<String>, part_spec: JsonValue) {
        let node = Node {
            device_id: device_id.clone(),
            node_type: node_type.into(),
            part_spec,
        };
        self.nodes.write().unwrap().insert(device_id, node);
    }

    pub fn register_edge(&self, from: DeviceId, to: DeviceId) {
        self.edges.write().unwrap().push((from, to));
    }

    pub fn update_controller_state(&self, id: &DeviceId, patch: JsonValue) {
        let mut controllers = self.controller_state.write().unwrap();
        let merged = match controllers.get(id) {
            Some(existing) => deep_merge(existing, &patch),
            None => patch,
        };
        controllers.insert(id.clone(), merged);
    }

    pub fn apply_runtime_override(&self, id: DeviceId, patch: JsonValue) {
        let mut overrides = self.runtime_overrides.write().unwrap();
        let merged = match overrides.get(&id) {
            Some(existing) => deep_merge(existing, &patch),
            None => patch,
        };
        overrides.insert(id, merged);
    }

    pub fn clear_runtime_overrides(&self) {
        self.runtime_overrides.write().unwrap().clear();
    }

    pub fn clear_runtime_override(&self, id: &DeviceId) {
        self.runtime_overrides.write().unwrap().remove(id);
    }

    pub fn get_runtime_overrides_snapshot(&self) -> HashMap<DeviceId, JsonValue> {
        self.runtime_overrides.read().unwrap().clone()
    }

    /// Apply a whitelisted, clamped patch to the environmental state.
    pub fn set_env_state(&self, patch: &JsonValue) {
        let Some(patch) = patch.as_object() else {
            return;
        };
        let mut env = self.env.write().unwrap();
        if let Some(v) = patch.get("temperature_K").and_then(|v| v.as_f64()) {
            env.temperature_k = v;
        }
        if let Some(v) = patch.get("pressure_kPa").and_then(|v| v.as_f64()) {
            env.pressure_kpa = v;
        }
        if let Some(v) = patch.get("ambient_lux").and_then(|v| v.as_f64()) {
            env.ambient_lux = v;
        }
        if let Some(v) = patch.get("vibration_rms").and_then(|v| v.as_f64()) {
            env.vibration_rms = v;
        }
        env.clamp();
        drop(env);
        self.recompute_and_cache();
    }

    pub fn get_env_state(&self) -> EnvironmentalState {
        *self.env.read().unwrap()
    }

    pub fn load_device_overrides(&self, path: &Path) -> Result<(), crate::error::CoreError> {
        let parsed = overrides::load_override_file(path)?;
        *self.device_overrides.write().unwrap() = parsed;
        *self.overrides_path.write().unwrap() = Some(path.to_path_buf());
        *self.overrides_mtime.write().unwrap() = fs::metadata(path).ok().and_then(|m| m.modified().ok());
        self.recompute_and_cache();
        Ok(())
    }

    /// Returns `true` if an override path was set and the file was found
    /// and parsed successfully; `false` if no path was ever set, or the
    /// reload failed (the previous overrides are kept either way).
    pub fn reload_overrides(&self) -> bool {
        let Some(path) = self.overrides_path.read().unwrap().clone() else {
            return false;
        };
        match overrides::load_override_file(&path) {
            Ok(parsed) => {
                *self.device_overrides.write().unwrap() = parsed;
                self.recompute_and_cache();
                true
            }
            Err(err) => {
                warn!(error = %err, "override reload failed, keeping previous values");
                false
            }
        }
    }

    fn merged_spec(&self, node: &Node) -> JsonValue {
        let device_overrides = self.device_overrides.read().unwrap();
        let runtime_overrides = self.runtime_overrides.read().unwrap();
        let mut merged = node.part_spec.clone();
        if let Some(patch) = device_overrides.get(&node.device_id) {
            merged = deep_merge(&merged, patch);
        }
        if let Some(patch) = runtime_overrides.get(&node.device_id) {
            merged = deep_merge(&merged, patch);
        }
        merged
    }

    /// Pure: returns a fresh per-device property map without mutating
    /// anything. `compute_and_cache` is the only mutating caller.
    #[instrument(skip(self))]
    pub fn compute_step(&self) -> HashMap<DeviceId, JsonValue> {
        let env = *self.env.read().unwrap();
        let nodes = self.nodes.read().unwrap();
        let controllers = self.controller_state.read().unwrap();

        let n0 = 1.00027_f64;
        let t0 = 293.15_f64;
        let p0 = 101.3_f64;
        let k_coeff = (n0 - 1.0) * (t0 / p0);
        let refractive_index = 1.0 + k_coeff * (env.pressure_kpa / env.temperature_k.max(1.0));

        let mut out = HashMap::with_capacity(nodes.len());
        for node in nodes.values() {
            let spec = self.merged_spec(node);
            let noise_coeff = spec_number(&spec, "noise_coeff", 0.01);

            let mut props = IndexMap::new();
            props.insert("temperature_K".to_string(), JsonValue::Number(env.temperature_k));
            props.insert("pressure_kPa".to_string(), JsonValue::Number(env.pressure_kpa));
            props.insert("refractive_index".to_string(), JsonValue::Number(refractive_index));
            props.insert("noise_coeff".to_string(), JsonValue::Number(noise_coeff));

            match node.node_type.as_str() {
                "PressureSensor" => {
                    props.insert("pressure_kPa".to_string(), JsonValue::Number(env.pressure_kpa));
                }
                "AmbientLightSensor" => {
                    props.insert("ambient_lux".to_string(), JsonValue::Number(env.ambient_lux));
                }
                "VibrationSensor" => {
                    props.insert("vibration_rms".to_string(), JsonValue::Number(env.vibration_rms));
                }
                "Laser" => {
                    let laser_power = controller_number(
                        controllers.get(&node.device_id),
                        &["optical_power", "power"],
                        12.0,
                    );
                    let optical_power =
                        laser_power * (1.0 - 0.0015 * (env.temperature_k - 77.0).max(0.0)).max(0.2);
                    props.insert("optical_power".to_string(), JsonValue::Number(optical_power));
                }
                "PhaseModulator" => {
                    let pm_phase = controller_number(
                        controllers.get(&node.device_id),
                        &["phase_rad", "phase"],
                        0.0,
                    );
                    let beta_n = 2e3_f64;
                    let gamma_v = 50.0_f64;
                    let phase = pm_phase + beta_n * (refractive_index - n0) + gamma_v * env.vibration_rms;
                    props.insert("phase".to_string(), JsonValue::Number(phase));
                }
                "PhotonicDetector" => {
                    let laser_power = controller_number(
                        controllers.get(&DeviceId::new(LASER_ID).unwrap()),
                        &["optical_power", "power"],
                        12.0,
                    );
                    let phase = controller_number(
                        controllers.get(&DeviceId::new(PHASE_MOD_ID).unwrap()),
                        &["phase_rad", "phase"],
                        0.0,
                    );
                    let counts = (90.0 * laser_power.max(0.0) * 0.5 * (1.0 + 0.95 * phase.cos())
                        + 0.8 * env.ambient_lux)
                        .max(0.0);
                    let dark_rate = (0.02 * (1.0 + env.ambient_lux / 200.0) * (1.0 + 5.0 * env.vibration_rms)).max(0.0);
                    props.insert("counts".to_string(), JsonValue::Number(counts));
                    props.insert("dark_rate".to_string(), JsonValue::Number(dark_rate));
                    props.insert("temperature".to_string(), JsonValue::Number(env.temperature_k));
                }
                t if QEC_TYPES.contains(&t) => {
                    let p_flip = environment_p_flip(env.temperature_k, env.pressure_kpa, env.vibration_rms);
                    props.insert("p_flip".to_string(), JsonValue::Number(p_flip));
                    if t == "LeakageResetController" {
                        let leak_rate_per_s = spec_number(&spec, "leak_rate_per_s", 0.01);
                        props.insert("leak_rate_per_s".to_string(), JsonValue::Number(leak_rate_per_s));
                    }
                }
                _ => {}
            }

            out.insert(node.device_id.clone(), JsonValue::Object(props));
        }
        out
    }

    /// Advance wall-clock dynamics by `dt` seconds. `dt` must be > 0.
    pub fn advance_dynamics(&self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let controllers = self.controller_state.read().unwrap();
        let nodes = self.nodes.read().unwrap();

        let flow_rate = controller_number(controllers.get(&DeviceId::new(LN2_ID).unwrap()), &["flow_rate_Lmin"], 0.0);
        let setpoint_k = controller_number(controllers.get(&DeviceId::new(LN2_ID).unwrap()), &["setpoint_K"], 77.0)
            .clamp(60.0, 300.0);

        let press_ctrl_state = controllers.get(&DeviceId::new(PRESS_CTRL_ID).unwrap());
        let press_ctrl_spec = nodes
            .get(&DeviceId::new(PRESS_CTRL_ID).unwrap())
            .map(|n| self.merged_spec(n))
            .unwrap_or(JsonValue::object());

        let default_setpoint = spec_number(&press_ctrl_spec, "pressure_setpoint_default_kPa", 101.3);
        let pressure_setpoint = controller_number(press_ctrl_state, &["pressure_setpoint_kPa"], default_setpoint);
        let sealed = press_ctrl_state
            .and_then(|s| s.as_object())
            .and_then(|m| m.get("sealed"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let pump_enabled = press_ctrl_state
            .and_then(|s| s.as_object())
            .and_then(|m| m.get("pump_enabled"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let tau_pressure = spec_number(&press_ctrl_spec, "tau_pressure_s", 8.0);
        let leak_rate = spec_number(&press_ctrl_spec, "leak_rate_per_s", 0.0002);

        let amb_spec = nodes
            .get(&DeviceId::new(AMBIENT_ID).unwrap())
            .map(|n| self.merged_spec(n));

        drop(nodes);
        drop(controllers);

        let mut env = self.env.write().unwrap();
        let mut pressure = env.pressure_kpa;
        if !sealed {
            let tau = 1.5;
            pressure += (101.3 - pressure) * dt / tau;
        } else {
            let pump_term = if pump_enabled {
                (pressure_setpoint - pressure) * dt / tau_pressure.max(0.5)
            } else {
                0.0
            };
            let leak_term = -leak_rate * (pressure - 101.3);
            pressure += pump_term + leak_term * dt;
        }
        pressure = pressure.clamp(10.0, 200.0);

        let eff = (pressure / 101.3).clamp(0.2, 2.0).powf(0.35);
        let mut temperature = env.temperature_k;
        let t_env = 295.0;
        let tau_warm = 400.0;
        temperature += (t_env - temperature) * dt / tau_warm;
        temperature += eff * 0.015 * flow_rate.clamp(0.0, 10.0) * (setpoint_k - temperature) * dt;

        if let Some(amb_spec) = amb_spec {
            env.ambient_lux = spec_number(&amb_spec, "ambient_lux_default", env.ambient_lux);
        }

        let mut vibration = if pump_enabled { 0.0015 } else { 0.0003 };
        vibration += 0.0005 * (pressure_setpoint - pressure).abs() / 50.0;

        env.pressure_kpa = pressure;
        env.temperature_k = temperature;
        env.vibration_rms = vibration;
        env.clamp();
    }

    fn recompute_and_cache(&self) {
        let step = self.compute_step();
        *self.cache.write().unwrap() = Arc::new(step);
    }

    /// Advance dynamics by wall-clock dt since the last call, then compute
    /// and publish. The cache is replaced atomically: readers either see
    /// the previous map or the new one, never a partial one.
    #[instrument(skip(self))]
    pub fn compute_and_cache(&self) {
        let now = Instant::now();
        let dt = {
            let mut last = self.last_tick.write().unwrap();
            let dt = now.duration_since(*last).as_secs_f64();
            *last = now;
            dt
        };
        if dt > 0.0 {
            self.advance_dynamics(dt);
        }
        self.recompute_and_cache();
        self.maybe_reload_overrides();
    }

    fn maybe_reload_overrides(&self) {
        let Some(path) = self.overrides_path.read().unwrap().clone() else {
            return;
        };
        let current = fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        let changed = {
            let previous = self.overrides_mtime.read().unwrap();
            current != *previous
        };
        if changed {
            *self.overrides_mtime.write().unwrap() = current;
            self.reload_overrides();
        }
    }

    pub fn get_cached_step(&self) -> Arc<HashMap<DeviceId, JsonValue>> {
        self.cache.read().unwrap().clone()
    }

    /// Spawn the background tick task. Idempotent: a second call while
    /// already running is a no-op.
    pub fn start_background_loop(self: &Arc<Self>, interval: std::time::Duration) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let engine = Arc::clone(self);
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                engine.compute_and_cache();
                tokio::time::sleep(interval).await;
            }
        });
    }

    pub fn stop_background_loop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> DeviceId {
        DeviceId::new(s).unwrap()
    }

    #[test]
    fn p_flip_boundary_at_reference_point() {
        assert_eq!(environment_p_flip(77.0, 101.3, 0.0), 0.01);
        assert_eq!(standalone_p_flip(77.0), 0.01);
    }

    #[test]
    fn env_state_clamps_on_set() {
        let engine = PhysicsEngine::new();
        let mut patch = IndexMap::new();
        patch.insert("temperature_K".to_string(), JsonValue::Number(1000.0));
        engine.set_env_state(&JsonValue::Object(patch));
        assert_eq!(engine.get_env_state().temperature_k, 350.0);
    }

    #[test]
    fn compute_step_is_pure_and_repeatable() {
        let engine = PhysicsEngine::new();
        engine.register_node(id("tc1"), "Thermocouple", JsonValue::object());
        let a = engine.compute_step();
        let b = engine.compute_step();
        assert_eq!(a.get(&id("tc1")), b.get(&id("tc1")));
    }

    #[test]
    fn runtime_override_applies_and_clears() {
        let engine = PhysicsEngine::new();
        let target = id("det0");
        let mut patch = IndexMap::new();
        patch.insert("counts".to_string(), JsonValue::Number(12345.0));
        engine.apply_runtime_override(target.clone(), JsonValue::Object(patch));
        assert!(engine.get_runtime_overrides_snapshot().contains_key(&target));
        engine.clear_runtime_overrides();
        assert!(engine.get_runtime_overrides_snapshot().is_empty());
    }

    #[test]
    fn advance_dynamics_cools_toward_setpoint_with_flow() {
        let engine = PhysicsEngine::new();
        engine.update_controller_state(
            &id(LN2_ID),
            JsonValue::Object({
                let mut m = IndexMap::new();
                m.insert("flow_rate_Lmin".to_string(), JsonValue::Number(5.0));
                m.insert("setpoint_K".to_string(), JsonValue::Number(77.0));
                m
            }),
        );
        let before = engine.get_env_state().temperature_k;
        for _ in 0..50 {
            engine.advance_dynamics(0.2);
        }
        let after = engine.get_env_state().temperature_k;
        assert!(after < before);
    }
}
