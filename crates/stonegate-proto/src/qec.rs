use serde::{Deserialize, Serialize};

/// One qubit's raw syndrome reading.
#[derive(Debug, Clone, Deserialize)]
pub struct QecMeasurementEntry {
    pub qubit: i64,
    pub value: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QecDecodeParams {
    #[serde(default)]
    pub measurements: Vec<QecMeasurementEntry>,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QecCorrection {
    pub qubit: i64,
    pub round: i64,
    pub correction: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QecDecodeStatistics {
    pub qubits: usize,
    pub measurements: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QecDecodeResult {
    pub job_id: Option<String>,
    pub corrections: Vec<QecCorrection>,
    pub statistics: QecDecodeStatistics,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QecBenchmarkParamsExtra {
    pub distance: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QecBenchmarkParams {
    pub code: Option<String>,
    pub p_flip: Option<f64>,
    pub rounds: Option<i64>,
    pub shots: Option<i64>,
    pub seed: Option<i64>,
    pub params: Option<QecBenchmarkParamsExtra>,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QecBenchmarkStatistics {
    pub shots: i64,
    pub rounds: i64,
    pub p_flip: f64,
    pub raw_error_rate: f64,
    pub decoded_error_rate: f64,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QecBenchmarkResult {
    pub job_id: Option<String>,
    pub status: &'static str,
    pub statistics: QecBenchmarkStatistics,
}
