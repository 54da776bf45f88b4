//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, CoreConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order).
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values.
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local). Only returns files
/// that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/stonegate/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("stonegate/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("stonegate.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<CoreConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path)
}

/// Parse config from a TOML string. Unset fields keep `CoreConfig` defaults
/// so a partial file only overrides what it names.
fn parse_toml(contents: &str, path: &Path) -> Result<CoreConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config = CoreConfig::default();

    if let Some(v) = table.get("port").and_then(|v| v.as_integer()) {
        config.port = v as u16;
    }
    if let Some(v) = table.get("recordings_dir").and_then(|v| v.as_str()) {
        config.recordings_dir = expand_path(v);
    }
    if let Some(v) = table.get("graph_path").and_then(|v| v.as_str()) {
        config.graph_path = Some(expand_path(v));
    }
    if let Some(v) = table.get("interval_ms").and_then(|v| v.as_integer()) {
        config.interval_ms = v as u64;
    }

    Ok(config)
}

/// Merge two configs, with `overlay` taking precedence field-by-field.
/// A field equal to the compiled default is treated as "unset" in the
/// overlay and the base value is kept.
pub fn merge_configs(base: CoreConfig, overlay: CoreConfig) -> CoreConfig {
    let defaults = CoreConfig::default();

    CoreConfig {
        port: if overlay.port != defaults.port {
            overlay.port
        } else {
            base.port
        },
        recordings_dir: if overlay.recordings_dir != defaults.recordings_dir {
            overlay.recordings_dir
        } else {
            base.recordings_dir
        },
        graph_path: overlay.graph_path.or(base.graph_path),
        interval_ms: if overlay.interval_ms != defaults.interval_ms {
            overlay.interval_ms
        } else {
            base.interval_ms
        },
        build_info: base.build_info,
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut CoreConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("STONEGATE_PORT") {
        if let Ok(port) = v.parse() {
            config.port = port;
            sources.env_overrides.push("STONEGATE_PORT".to_string());
        }
    }
    if let Ok(v) = env::var("STONEGATE_RECORDINGS_DIR") {
        config.recordings_dir = expand_path(&v);
        sources.env_overrides.push("STONEGATE_RECORDINGS_DIR".to_string());
    }
    if let Ok(v) = env::var("STONEGATE_GRAPH_PATH") {
        config.graph_path = Some(expand_path(&v));
        sources.env_overrides.push("STONEGATE_GRAPH_PATH".to_string());
    }
    if let Ok(v) = env::var("STONEGATE_TICK_MS") {
        if let Ok(ms) = v.parse() {
            config.interval_ms = ms;
            sources.env_overrides.push("STONEGATE_TICK_MS".to_string());
        }
    }
}

/// Expand `~` and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            return if let Ok(var_value) = env::var(var_name) {
                PathBuf::from(var_value).join(&stripped[slash_pos + 1..])
            } else {
                PathBuf::from(path)
            };
        }
        return env::var(stripped)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(path));
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn discover_config_files_does_not_panic() {
        let _files = discover_config_files();
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
port = 9001
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.port, 9001);
        assert_eq!(config.interval_ms, 200);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
port = 9100
recordings_dir = "/data/recordings"
graph_path = "/data/graph.json"
interval_ms = 50
"#;
        let config = parse_toml(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.recordings_dir, PathBuf::from("/data/recordings"));
        assert_eq!(config.graph_path, Some(PathBuf::from("/data/graph.json")));
        assert_eq!(config.interval_ms, 50);
    }

    #[test]
    fn merge_keeps_base_when_overlay_unset() {
        let base = CoreConfig {
            port: 7000,
            ..CoreConfig::default()
        };
        let overlay = CoreConfig::default();
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.port, 7000);
    }
}
