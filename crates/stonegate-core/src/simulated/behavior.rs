use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::Rng;
use stonegate_proto::{JsonValue, MeasurementValue};

use super::{noise, Inner};
use crate::physics::{standalone_p_flip, PhysicsEngine};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Per-type state carried alongside the four generic stores. Devices whose
/// type has no bespoke behavior use `Generic` and rely entirely on the
/// property stores plus physics-derived values.
pub enum DeviceBehavior {
    Generic,
    QecModule {
        rounds: i64,
        history: VecDeque<bool>,
    },
    SyndromeStream {
        running: bool,
        round: i64,
        last_bit: bool,
    },
    NoiseSpectrometer {
        center_freq_hz: f64,
        span_hz: f64,
        averages: i64,
    },
    ReadoutCalibrator {
        fidelity: f64,
        last_calibrated_ts: i64,
    },
    FaultInjector,
    LeakageResetController {
        leak_population: f64,
        reset_count: i64,
        last_integrated_ms: i64,
    },
    SurfaceCodeController {
        distance: i64,
        cycles_run: i64,
        logical_error_rate: f64,
    },
    LatticeSurgeryController {
        merge_active: bool,
        merge_count: i64,
        boundary_type: String,
    },
}

impl DeviceBehavior {
    pub fn for_type(device_type: &str) -> Self {
        match device_type {
            "QECModule" => DeviceBehavior::QecModule {
                rounds: 0,
                history: VecDeque::with_capacity(3),
            },
            "SyndromeStream" => DeviceBehavior::SyndromeStream {
                running: false,
                round: 0,
                last_bit: false,
            },
            "NoiseSpectrometer" => DeviceBehavior::NoiseSpectrometer {
                center_freq_hz: 5e9,
                span_hz: 1e6,
                averages: 16,
            },
            "ReadoutCalibrator" => DeviceBehavior::ReadoutCalibrator {
                fidelity: 0.98,
                last_calibrated_ts: 0,
            },
            "FaultInjector" => DeviceBehavior::FaultInjector,
            "LeakageResetController" => DeviceBehavior::LeakageResetController {
                leak_population: 0.0,
                reset_count: 0,
                last_integrated_ms: now_ms(),
            },
            "SurfaceCodeController" => DeviceBehavior::SurfaceCodeController {
                distance: 3,
                cycles_run: 0,
                logical_error_rate: 0.0,
            },
            "LatticeSurgeryController" => DeviceBehavior::LatticeSurgeryController {
                merge_active: false,
                merge_count: 0,
                boundary_type: "rough".to_string(),
            },
            _ => DeviceBehavior::Generic,
        }
    }
}

fn force_odd_at_least_3(d: i64) -> i64 {
    let d = d.max(3);
    if d % 2 == 0 {
        d + 1
    } else {
        d
    }
}

/// `p_L = A*(p/p_th)^((d+1)/2)`, `A=0.1`, `p_th=0.01`.
fn fowler_logical_error_rate(p_flip: f64, distance: i64) -> f64 {
    const A: f64 = 0.1;
    const P_TH: f64 = 0.01;
    let exponent = (distance as f64 + 1.0) / 2.0;
    A * (p_flip / P_TH).powf(exponent)
}

/// Step 6 of `read_measurement`: inject type-specific derived properties
/// into `measurements`, mutating `behavior` state as a side effect.
#[allow(clippy::too_many_arguments)]
pub fn inject_derived(
    inner: &mut Inner,
    _device_type: &str,
    temperature_k: Option<f64>,
    pressure_kpa: Option<f64>,
    refractive_index: Option<f64>,
    vibration_rms: Option<f64>,
    leak_rate_per_s: Option<f64>,
    dt_s: f64,
    measurements: &mut IndexMap<String, MeasurementValue>,
) {
    let p_flip = temperature_k.map(standalone_p_flip).unwrap_or(0.01);

    match &mut inner.behavior {
        DeviceBehavior::Generic => {}
        DeviceBehavior::QecModule { rounds, history } => {
            *rounds += 1;
            let syndrome = inner.rng.gen_bool(p_flip.clamp(0.0, 1.0));
            if history.len() == 3 {
                history.pop_front();
            }
            history.push_back(syndrome);
            let ones = history.iter().filter(|&&b| b).count();
            let correction_applied = ones * 2 > history.len();

            measurements.insert("rounds".to_string(), MeasurementValue::exact(JsonValue::Int(*rounds)));
            measurements.insert("syndrome".to_string(), MeasurementValue::exact(JsonValue::Bool(syndrome)));
            measurements.insert(
                "correction_applied".to_string(),
                MeasurementValue::exact(JsonValue::Bool(correction_applied)),
            );
            measurements.insert(
                "temperature_K".to_string(),
                MeasurementValue::exact(JsonValue::Number(temperature_k.unwrap_or(295.0))),
            );
            measurements.insert(
                "pressure_kPa".to_string(),
                MeasurementValue::exact(JsonValue::Number(pressure_kpa.unwrap_or(101.3))),
            );
            measurements.insert(
                "refractive_index".to_string(),
                MeasurementValue::exact(JsonValue::Number(refractive_index.unwrap_or(1.00027))),
            );
            measurements.insert("p_flip".to_string(), MeasurementValue::exact(JsonValue::Number(p_flip)));
        }
        DeviceBehavior::SyndromeStream { running, round, last_bit } => {
            if *running {
                *round += 1;
                *last_bit = inner.rng.gen_bool(p_flip.clamp(0.0, 1.0));
            }
            measurements.insert("running".to_string(), MeasurementValue::exact(JsonValue::Bool(*running)));
            measurements.insert("round".to_string(), MeasurementValue::exact(JsonValue::Int(*round)));
            measurements.insert("last_bit".to_string(), MeasurementValue::exact(JsonValue::Bool(*last_bit)));
        }
        DeviceBehavior::NoiseSpectrometer { center_freq_hz, span_hz, averages } => {
            let vib = vibration_rms.unwrap_or(0.0003);
            let psd = -120.0 - 10.0 * (1.0 + vib * 1e4).log10();
            measurements.insert("psd_dbm_per_hz".to_string(), MeasurementValue::numeric(psd, psd.abs() * 0.01));
            measurements.insert("center_freq_hz".to_string(), MeasurementValue::exact(JsonValue::Number(*center_freq_hz)));
            measurements.insert("span_hz".to_string(), MeasurementValue::exact(JsonValue::Number(*span_hz)));
            measurements.insert("averages".to_string(), MeasurementValue::exact(JsonValue::Int(*averages)));
        }
        DeviceBehavior::ReadoutCalibrator { fidelity, last_calibrated_ts } => {
            measurements.insert("fidelity".to_string(), MeasurementValue::exact(JsonValue::Number(*fidelity)));
            measurements.insert(
                "last_calibrated_ts".to_string(),
                MeasurementValue::exact(JsonValue::Int(*last_calibrated_ts)),
            );
        }
        DeviceBehavior::FaultInjector => {}
        DeviceBehavior::LeakageResetController { leak_population, reset_count, last_integrated_ms } => {
            let leak_rate = leak_rate_per_s.unwrap_or(0.01);
            *leak_population = (*leak_population + leak_rate * dt_s.max(0.0)).clamp(0.0, 1.0);
            *last_integrated_ms = now_ms();
            measurements.insert(
                "leak_population".to_string(),
                MeasurementValue::numeric(*leak_population, *leak_population * 0.02),
            );
            measurements.insert("reset_count".to_string(), MeasurementValue::exact(JsonValue::Int(*reset_count)));
        }
        DeviceBehavior::SurfaceCodeController { distance, cycles_run, logical_error_rate } => {
            measurements.insert("distance".to_string(), MeasurementValue::exact(JsonValue::Int(*distance)));
            measurements.insert("cycles_run".to_string(), MeasurementValue::exact(JsonValue::Int(*cycles_run)));
            measurements.insert(
                "logical_error_rate".to_string(),
                MeasurementValue::numeric(*logical_error_rate, 0.0),
            );
        }
        DeviceBehavior::LatticeSurgeryController { merge_active, merge_count, boundary_type } => {
            measurements.insert("merge_active".to_string(), MeasurementValue::exact(JsonValue::Bool(*merge_active)));
            measurements.insert("merge_count".to_string(), MeasurementValue::exact(JsonValue::Int(*merge_count)));
            measurements.insert(
                "boundary_type".to_string(),
                MeasurementValue::exact(JsonValue::String(boundary_type.clone())),
            );
        }
    }
}

/// Step 4 of `perform_action`: dispatch to the behavior-specific handler.
/// Per-action failures (missing fields, bad types) are swallowed — a single
/// malformed action must never abort the whole call.
pub fn dispatch_action(inner: &mut Inner, device_type: &str, obj: &IndexMap<String, JsonValue>, physics: Option<&PhysicsEngine>) {
    match device_type {
        "SyndromeStream" => {
            if let DeviceBehavior::SyndromeStream { running, .. } = &mut inner.behavior {
                if obj.get("start").and_then(|v| v.as_bool()).unwrap_or(false) {
                    *running = true;
                }
                if obj.get("stop").and_then(|v| v.as_bool()).unwrap_or(false) {
                    *running = false;
                }
            }
        }
        "ReadoutCalibrator" => {
            if obj.get("calibrate").is_some() {
                let p_flip = inner
                    .numeric_state
                    .get("p_flip")
                    .copied()
                    .unwrap_or(0.01);
                let sampled = noise::sample_normal(&mut inner.rng, 0.98 - p_flip, 0.01).clamp(0.0, 1.0);
                let ts = now_ms();
                if let DeviceBehavior::ReadoutCalibrator { fidelity, last_calibrated_ts } = &mut inner.behavior {
                    *fidelity = sampled;
                    *last_calibrated_ts = ts;
                }
            }
        }
        "FaultInjector" => {
            let Some(physics) = physics else { return };
            if let Some(spec) = obj.get("override_device").and_then(|v| v.as_object()) {
                if let (Some(device_id), Some(patch)) = (
                    spec.get("device_id").and_then(|v| v.as_str()),
                    spec.get("override"),
                ) {
                    if let Ok(id) = stonegate_proto::DeviceId::new(device_id) {
                        physics.apply_runtime_override(id, patch.clone());
                    }
                }
            }
            if obj.get("clear_overrides").and_then(|v| v.as_bool()).unwrap_or(false) {
                physics.clear_runtime_overrides();
            }
            if let Some(spec) = obj.get("clear_override").and_then(|v| v.as_object()) {
                if let Some(device_id) = spec.get("device_id").and_then(|v| v.as_str()) {
                    if let Ok(id) = stonegate_proto::DeviceId::new(device_id) {
                        physics.clear_runtime_override(&id);
                    }
                }
            }
        }
        "LeakageResetController" => {
            if obj.get("reset").and_then(|v| v.as_bool()).unwrap_or(false) {
                if let DeviceBehavior::LeakageResetController { leak_population, reset_count, .. } = &mut inner.behavior {
                    let reset_strength = 0.9;
                    *leak_population *= 1.0 - reset_strength;
                    *reset_count += 1;
                }
            }
        }
        "SurfaceCodeController" => {
            if let Some(set_distance) = obj.get("set_distance").and_then(|v| v.as_i64()) {
                if let DeviceBehavior::SurfaceCodeController { distance, .. } = &mut inner.behavior {
                    *distance = force_odd_at_least_3(set_distance);
                }
            }
            if let Some(run_cycles) = obj.get("run_cycles").and_then(|v| v.as_object()) {
                let n = run_cycles.get("n").and_then(|v| v.as_i64()).unwrap_or(1).max(0);
                let p_flip = inner.numeric_state.get("p_flip").copied().unwrap_or(0.01);
                if let DeviceBehavior::SurfaceCodeController { distance, cycles_run, logical_error_rate } = &mut inner.behavior {
                    *logical_error_rate = fowler_logical_error_rate(p_flip, *distance);
                    *cycles_run += n;
                }
            }
        }
        "LatticeSurgeryController" => {
            if obj.get("merge").and_then(|v| v.as_bool()).unwrap_or(false) {
                if let DeviceBehavior::LatticeSurgeryController { merge_active, merge_count, .. } = &mut inner.behavior {
                    *merge_active = true;
                    *merge_count += 1;
                }
            }
            if obj.get("split").and_then(|v| v.as_bool()).unwrap_or(false) {
                if let DeviceBehavior::LatticeSurgeryController { merge_active, .. } = &mut inner.behavior {
                    *merge_active = false;
                }
            }
            if let Some(boundary) = obj.get("set_boundary_type").and_then(|v| v.as_str()) {
                if let DeviceBehavior::LatticeSurgeryController { boundary_type, .. } = &mut inner.behavior {
                    *boundary_type = boundary.to_string();
                }
            }
        }
        _ => {}
    }
}
