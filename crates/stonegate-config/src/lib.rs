//! Configuration loading and tracing bootstrap for stonegate.
//!
//! This crate has minimal dependencies so it can be imported by every
//! other stonegate crate without causing circular dependency issues.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/stonegate/config.toml` (system)
//! 2. `~/.config/stonegate/config.toml` (user)
//! 3. `./stonegate.toml` (local override)
//! 4. Environment variables (`STONEGATE_*`)
//!
//! # Example Config
//!
//! ```toml
//! port = 8787
//! recordings_dir = "~/.local/share/stonegate/recordings"
//! interval_ms = 200
//! ```

pub mod loader;
pub mod tracing_init;

pub use loader::{ConfigSources, discover_config_files_with_override};
pub use tracing_init::init_tracing;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Build provenance baked in at compile time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildInfo {
    pub git_commit: String,
    pub build_time: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            git_commit: option_env!("STONEGATE_GIT_COMMIT")
                .unwrap_or("unknown")
                .to_string(),
            build_time: option_env!("STONEGATE_BUILD_TIME")
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Complete stonegate configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    /// WebSocket listen port.
    #[serde(default = "CoreConfig::default_port")]
    pub port: u16,

    /// Directory where recorder sessions write their files.
    #[serde(default = "CoreConfig::default_recordings_dir")]
    pub recordings_dir: PathBuf,

    /// Device-graph document describing the simulated instrument.
    #[serde(default)]
    pub graph_path: Option<PathBuf>,

    /// Physics tick interval, in milliseconds.
    #[serde(default = "CoreConfig::default_interval_ms")]
    pub interval_ms: u64,

    /// Build provenance, not read from file or environment.
    #[serde(skip, default)]
    pub build_info: BuildInfo,
}

impl CoreConfig {
    fn default_port() -> u16 {
        8787
    }

    fn default_recordings_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/stonegate/recordings"))
            .unwrap_or_else(|| PathBuf::from(".local/share/stonegate/recordings"))
    }

    fn default_interval_ms() -> u64 {
        200
    }

    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/stonegate/config.toml`
    /// 3. `~/.config/stonegate/config.toml`
    /// 4. `./stonegate.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_from(config_path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&std::path::Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = CoreConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_config = loader::load_from_file(&path)?;
            config = loader::merge_configs(config, file_config);
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);
        config.build_info = BuildInfo::default();

        Ok((config, sources))
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();
        output.push_str("# stonegate configuration\n\n");
        output.push_str(&format!("port = {}\n", self.port));
        output.push_str(&format!(
            "recordings_dir = \"{}\"\n",
            self.recordings_dir.display()
        ));
        if let Some(graph_path) = &self.graph_path {
            output.push_str(&format!("graph_path = \"{}\"\n", graph_path.display()));
        }
        output.push_str(&format!("interval_ms = {}\n", self.interval_ms));
        output
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            recordings_dir: Self::default_recordings_dir(),
            graph_path: None,
            interval_ms: Self::default_interval_ms(),
            build_info: BuildInfo::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.port, 8787);
        assert_eq!(config.interval_ms, 200);
    }

    #[test]
    fn to_toml_round_trips_scalars() {
        let config = CoreConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("port = 8787"));
        assert!(toml.contains("interval_ms = 200"));
    }

    #[test]
    fn load_defaults_without_files() {
        let config = CoreConfig::load().unwrap();
        assert_eq!(config.port, 8787);
    }
}
