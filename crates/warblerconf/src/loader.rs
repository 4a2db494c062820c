//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, WarblerConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local `./warbler.toml`; a CLI
/// path that does not exist is still returned so loading reports it.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/warbler/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("warbler/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("warbler.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Overlay one TOML file onto `config`.
pub fn load_from_file(config: &mut WarblerConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Overlay TOML text onto `config`. Only keys present in the text change.
pub fn apply_toml(config: &mut WarblerConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    if let Some(api) = table.get("api").and_then(|v| v.as_table()) {
        if let Some(v) = api.get("base_url").and_then(|v| v.as_str()) {
            config.api.base_url = v.to_string();
        }
        if let Some(v) = api.get("token").and_then(|v| v.as_str()) {
            config.api.token = v.to_string();
        }
        if let Some(v) = api.get("submit_path").and_then(|v| v.as_str()) {
            config.api.submit_path = v.to_string();
        }
        if let Some(v) = api.get("fetch_path").and_then(|v| v.as_str()) {
            config.api.fetch_path = v.to_string();
        }
    }

    if let Some(polling) = table.get("polling").and_then(|v| v.as_table()) {
        if let Some(v) = polling.get("interval_ms").and_then(|v| v.as_integer()) {
            config.polling.interval_ms = u64::try_from(v)
                .map_err(|_| parse_err(format!("polling.interval_ms must be >= 0, got {}", v)))?;
        }
        if let Some(v) = polling.get("max_attempts").and_then(|v| v.as_integer()) {
            config.polling.max_attempts = u32::try_from(v)
                .map_err(|_| parse_err(format!("polling.max_attempts out of range: {}", v)))?;
        }
        if let Some(v) = polling.get("max_transport_errors").and_then(|v| v.as_integer()) {
            config.polling.max_transport_errors = u32::try_from(v).map_err(|_| {
                parse_err(format!("polling.max_transport_errors out of range: {}", v))
            })?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = v.to_string();
        }
    }

    Ok(())
}

/// Apply process environment overrides to config.
pub fn apply_env_overrides(config: &mut WarblerConfig, sources: &mut ConfigSources) {
    apply_env_overrides_from(config, sources, |key| env::var(key).ok());
}

/// Apply environment overrides read through `lookup`.
///
/// Later entries win, so `SUNO_API_KEY` beats the legacy `SunoKey`, and
/// `RUST_LOG` beats `WARBLER_LOG_LEVEL`.
pub fn apply_env_overrides_from<F>(config: &mut WarblerConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut string_var = |key: &str, target: &mut String| {
        if let Some(v) = lookup(key) {
            *target = v;
            sources.env_overrides.push(key.to_string());
        }
    };

    // API
    string_var("WARBLER_API_BASE_URL", &mut config.api.base_url);
    string_var("SunoKey", &mut config.api.token);
    string_var("SUNO_API_KEY", &mut config.api.token);
    string_var("WARBLER_API_TOKEN", &mut config.api.token);

    // Telemetry
    string_var("WARBLER_OTLP_ENDPOINT", &mut config.telemetry.otlp_endpoint);
    string_var("OTEL_EXPORTER_OTLP_ENDPOINT", &mut config.telemetry.otlp_endpoint);
    string_var("WARBLER_LOG_LEVEL", &mut config.telemetry.log_level);
    string_var("RUST_LOG", &mut config.telemetry.log_level);

    // Polling; unparsable values are ignored
    if let Some(v) = lookup("WARBLER_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        config.polling.interval_ms = v;
        sources.env_overrides.push("WARBLER_POLL_INTERVAL_MS".to_string());
    }
    if let Some(v) = lookup("WARBLER_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
        config.polling.max_attempts = v;
        sources.env_overrides.push("WARBLER_MAX_ATTEMPTS".to_string());
    }
    if let Some(v) = lookup("WARBLER_MAX_TRANSPORT_ERRORS").and_then(|v| v.parse().ok()) {
        config.polling.max_transport_errors = v;
        sources.env_overrides.push("WARBLER_MAX_TRANSPORT_ERRORS".to_string());
    }
}
