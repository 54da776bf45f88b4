use indexmap::IndexMap;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Sample `N(mean, max(sigma, 1e-9))`; falls back to `mean` itself if the
/// distribution can't be constructed (sigma given as exactly zero collapses
/// to a point mass).
pub fn sample_normal(rng: &mut ChaCha8Rng, mean: f64, sigma: f64) -> f64 {
    let sigma = sigma.max(1e-9);
    Normal::new(mean, sigma)
        .map(|dist| dist.sample(rng))
        .unwrap_or(mean)
}

/// Populate a plausible initial value for `prop` into whichever store its
/// inferred kind belongs to.
///
/// Booleans/integers/strings initialize to fixed defaults, except
/// `*_count` properties, which are drawn from `round(N(1000, 0.1 rel))`.
/// Numeric properties are drawn from a domain-specific mean with a small
/// relative spread (e.g. `temperature_K` ~ `N(77, 0.2 rel)`).
pub fn seed_default(
    prop: &str,
    rng: &mut ChaCha8Rng,
    numeric_state: &mut IndexMap<String, f64>,
    int_state: &mut IndexMap<String, i64>,
    bool_state: &mut IndexMap<String, bool>,
    string_state: &mut IndexMap<String, String>,
) {
    if prop.ends_with("_count") {
        let mean = 1000.0;
        let count = sample_normal(rng, mean, mean * 0.1).round().max(0.0) as i64;
        int_state.insert(prop.to_string(), count);
        return;
    }
    if prop == "sealed" || prop == "pump_enabled" || prop.starts_with("is_") {
        bool_state.insert(prop.to_string(), false);
        return;
    }
    if prop.ends_with("_round") || prop == "rounds" {
        int_state.insert(prop.to_string(), 0);
        return;
    }
    if prop.ends_with("_type") || prop.ends_with("_id") {
        string_state.insert(prop.to_string(), String::new());
        return;
    }

    let (mean, rel): (f64, f64) = match prop {
        "temperature_K" | "setpoint_K" => (77.0, 0.2),
        "optical_power" | "power" => (12.0, 0.02),
        "pressure_kPa" | "pressure_setpoint_kPa" => (101.3, 0.01),
        "phase_rad" | "phase" | "flow_rate_Lmin" => (0.0, 0.0),
        _ => (1.0, 0.01),
    };
    let sigma = (mean.abs() * rel).max(1e-6);
    numeric_state.insert(prop.to_string(), sample_normal(rng, mean, sigma));
}
