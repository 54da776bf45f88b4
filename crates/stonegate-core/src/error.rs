use std::path::PathBuf;
use thiserror::Error;

/// Errors that propagate past a subsystem boundary. Everything else (C2
/// per-property/per-action failures, C4 override-reload failures, C8 frame
/// parse failures) is swallowed at the smallest possible granularity and
/// logged via `tracing`, per the propagation policy.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("recording stream invalid: {0}")]
    InvalidStream(&'static str),
}
