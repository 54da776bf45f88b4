//! Session-scoped multi-stream sampler producing append-only recording
//! files (C7).

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::RngCore;
use stonegate_proto::{
    DeviceId, MeasurementValue, RecordStartParams, RecordStartResult, RecordStopResult, RecordStreamSpec,
    RecordingBackendInfo, RecordingFooter, RecordingHeader, RecordingMeta, RecordingSample,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{instrument, warn};

use crate::error::CoreError;
use crate::registry::DeviceRegistry;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn random_hex_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Replace any char outside `[A-Za-z0-9_\-.]` with `_`.
pub fn sanitize_file_base(base: &str) -> String {
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn date_subdir(ts_ms: i64) -> String {
    let days = ts_ms.max(0) / 86_400_000;
    let secs = days * 86_400;
    // Civil-from-days (Howard Hinnant's algorithm), avoiding a chrono dep
    // for a single formatted directory name.
    let z = secs / 86_400 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}")
}

/// One in-flight recording: its spec, output file, and running flag.
/// `Recorder::stop` signals `running` then joins `worker` so the footer and
/// `samples_written` it reports are guaranteed consistent with the file on
/// disk by the time it returns.
pub struct RecordSession {
    id: String,
    path: PathBuf,
    started_ts_ms: i64,
    stopped_ts_ms: AtomicI64,
    streams: Vec<RecordStreamSpec>,
    samples_written: AtomicU64,
    running: Arc<AtomicBool>,
    writer: AsyncMutex<std::io::BufWriter<std::fs::File>>,
}

pub struct Recorder {
    sessions: Mutex<HashMap<String, RecordHandle>>,
    registry: Arc<DeviceRegistry>,
    recordings_dir: PathBuf,
    port: u16,
    git_commit: String,
    build_time: String,
}

struct RecordHandle {
    session: Arc<RecordSession>,
    worker: JoinHandle<()>,
}

impl Recorder {
    pub fn new(registry: Arc<DeviceRegistry>, recordings_dir: PathBuf, port: u16, git_commit: String, build_time: String) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            registry,
            recordings_dir,
            port,
            git_commit,
            build_time,
        }
    }

    #[instrument(skip(self, params))]
    pub fn start(&self, params: RecordStartParams) -> Result<RecordStartResult, CoreError> {
        if params.streams.is_empty() {
            return Err(CoreError::InvalidStream("streams must be a non-empty array"));
        }
        for stream in &params.streams {
            if stream.device_id.is_empty() {
                return Err(CoreError::InvalidStream("device_id must be non-empty"));
            }
            if !stream.rate_hz.is_finite() || stream.rate_hz <= 0.0 {
                return Err(CoreError::InvalidStream("rate_hz must be finite and > 0"));
            }
        }

        let started_ts_ms = now_ms();
        let recording_id = random_hex_id();
        let base = sanitize_file_base(params.file_base.as_deref().unwrap_or("recording"));
        let dir = self.recordings_dir.join(date_subdir(started_ts_ms));
        std::fs::create_dir_all(&dir).map_err(|e| CoreError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let path = dir.join(format!("{base}_{recording_id}.jsonl"));

        let file = std::fs::File::create(&path).map_err(|e| CoreError::Io {
            path: path.clone(),
            source: e,
        })?;
        let mut writer = std::io::BufWriter::new(file);

        let header = RecordingHeader::new(
            recording_id.clone(),
            started_ts_ms,
            RecordingMeta {
                script_name: params.script_name.clone(),
                operator: params.operator.clone(),
                backend: RecordingBackendInfo {
                    port: self.port,
                    git_commit: self.git_commit.clone(),
                    build_time: self.build_time.clone(),
                },
            },
            params.streams.clone(),
        );
        write_line(&mut writer, &header).map_err(|e| CoreError::Io {
            path: path.clone(),
            source: e,
        })?;

        let running = Arc::new(AtomicBool::new(true));
        let session = Arc::new(RecordSession {
            id: recording_id.clone(),
            path: path.clone(),
            started_ts_ms,
            stopped_ts_ms: AtomicI64::new(0),
            streams: params.streams.clone(),
            samples_written: AtomicU64::new(0),
            running: Arc::clone(&running),
            writer: AsyncMutex::new(writer),
        });

        let registry = Arc::clone(&self.registry);
        let worker_session = Arc::clone(&session);
        let worker = tokio::spawn(async move {
            run_worker(worker_session, registry, running).await;
        });

        self.sessions
            .lock()
            .unwrap()
            .insert(recording_id.clone(), RecordHandle { session, worker });

        Ok(RecordStartResult {
            recording_id,
            path: path.to_string_lossy().into_owned(),
        })
    }

    /// Signals the worker to stop, then joins it before returning so the
    /// footer line and `samples_written` reflect the file's final state.
    #[instrument(skip(self))]
    pub async fn stop(&self, recording_id: &str) -> Option<RecordStopResult> {
        let handle = self.sessions.lock().unwrap().remove(recording_id)?;
        let RecordHandle { session, worker } = handle;
        session.running.store(false, Ordering::SeqCst);
        let stopped_ts_ms = now_ms();
        session.stopped_ts_ms.store(stopped_ts_ms, Ordering::SeqCst);

        if let Err(err) = worker.await {
            warn!(error = %err, "recording worker task panicked while joining on stop");
        }

        Some(RecordStopResult {
            recording_id: session.id.clone(),
            path: session.path.to_string_lossy().into_owned(),
            samples_written: session.samples_written.load(Ordering::SeqCst),
            started_ts_ms: session.started_ts_ms,
            stopped_ts_ms,
        })
    }

    pub fn active_recording_ids(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let sessions = self.sessions.lock().unwrap();
        for handle in sessions.values() {
            handle.session.running.store(false, Ordering::SeqCst);
        }
    }
}

fn write_line<T: serde::Serialize>(writer: &mut impl Write, value: &T) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Retain only `metrics` if non-empty, else pass through unchanged.
pub fn filter_measurements(measurements: &IndexMap<String, MeasurementValue>, metrics: &[String]) -> IndexMap<String, MeasurementValue> {
    if metrics.is_empty() {
        return measurements.clone();
    }
    measurements
        .iter()
        .filter(|(k, _)| metrics.iter().any(|m| m == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

async fn run_worker(session: Arc<RecordSession>, registry: Arc<DeviceRegistry>, running: Arc<AtomicBool>) {
    let mut next_due: Vec<i64> = vec![now_ms(); session.streams.len()];

    while running.load(Ordering::SeqCst) {
        let now = now_ms();
        let mut min_wait = 100_i64;

        for (idx, stream) in session.streams.iter().enumerate() {
            if next_due[idx] > now {
                min_wait = min_wait.min((next_due[idx] - now).max(1));
                continue;
            }

            let interval_ms = (1000.0 / stream.rate_hz).max(1.0) as i64;
            next_due[idx] = now + interval_ms;
            min_wait = min_wait.min(interval_ms.max(1));

            let Ok(device_id) = DeviceId::new(stream.device_id.clone()) else {
                continue;
            };
            let Some(device) = registry.get(&device_id) else {
                warn!(device_id = %stream.device_id, "record stream references unknown device");
                continue;
            };

            let measurement = device.read_measurement();
            let measurements = filter_measurements(&measurement.measurements, &stream.metrics);
            let sample = RecordingSample::new(measurement.ts, stream.device_id.clone(), measurement.state, measurements);

            let mut writer = session.writer.lock().await;
            if let Err(err) = write_line(&mut *writer, &sample) {
                warn!(error = %err, "failed to write recording sample, continuing");
                continue;
            }
            drop(writer);
            session.samples_written.fetch_add(1, Ordering::SeqCst);
        }

        tokio::time::sleep(std::time::Duration::from_millis(min_wait.clamp(1, 100) as u64)).await;
    }

    let mut writer = session.writer.lock().await;
    let footer = RecordingFooter::new(
        session.id.clone(),
        session.stopped_ts_ms.load(Ordering::SeqCst).max(now_ms()),
        session.samples_written.load(Ordering::SeqCst),
    );
    let _ = write_line(&mut *writer, &footer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize_file_base("run/one two.txt"), "run_one_two.txt");
    }

    #[test]
    fn date_subdir_formats_known_epoch() {
        assert_eq!(date_subdir(0), "1970-01-01");
    }

    #[test]
    fn filter_measurements_passes_through_when_empty() {
        let mut m = IndexMap::new();
        m.insert("a".to_string(), MeasurementValue::numeric(1.0, 0.0));
        assert_eq!(filter_measurements(&m, &[]).len(), 1);
        assert_eq!(filter_measurements(&m, &["b".to_string()]).len(), 0);
    }
}
