//! Configuration loading for warbler.
//!
//! The loaded `WarblerConfig` is an immutable value: it is validated once at
//! startup and handed to the orchestrator, which never consults the
//! environment on its own.
//!
//! # Usage
//!
//! ```rust,no_run
//! use warblerconf::WarblerConfig;
//!
//! let (config, sources) = WarblerConfig::load_with_sources_from(None).expect("config");
//! config.validate().expect("usable config");
//! println!("API: {} (from {:?})", config.api.base_url, sources.files);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/warbler/config.toml` (system)
//! 2. `~/.config/warbler/config.toml` (user)
//! 3. `./warbler.toml` or the `--config` path (local override)
//! 4. Environment variables (`WARBLER_*`, `SUNO_API_KEY`, `RUST_LOG`, ...)
//!
//! # Example Config
//!
//! ```toml
//! [api]
//! base_url = "https://gemini.mtysp.top"
//! token = "sk-..."
//!
//! [polling]
//! interval_ms = 5000
//! max_attempts = 60
//!
//! [telemetry]
//! log_level = "info"
//! otlp_endpoint = ""
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{ApiConfig, PollingConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No API token configured (set api.token, WARBLER_API_TOKEN or SUNO_API_KEY)")]
    MissingToken,

    #[error("Invalid config value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Complete warbler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WarblerConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl WarblerConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/warbler/config.toml`
    /// 3. `~/.config/warbler/config.toml`
    /// 4. `./warbler.toml`, or `config_path` when given
    /// 5. Environment variables
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = WarblerConfig::default();

        for path in loader::discover_config_files_with_override(config_path) {
            loader::load_from_file(&mut config, &path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Check the values the server cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api.has_token() {
            return Err(ConfigError::MissingToken);
        }

        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: "api.base_url",
                message: format!("expected an http(s) URL, got {:?}", self.api.base_url),
            });
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "polling.interval_ms",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.polling.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "polling.max_attempts",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.polling.max_transport_errors == 0 {
            return Err(ConfigError::Invalid {
                field: "polling.max_transport_errors",
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Serialize config to TOML string, with the token masked.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# warbler configuration\n\n");

        output.push_str("[api]\n");
        output.push_str(&format!("base_url = \"{}\"\n", self.api.base_url));
        output.push_str(&format!("token = \"{}\"\n", mask_token(&self.api.token)));
        output.push_str(&format!("submit_path = \"{}\"\n", self.api.submit_path));
        output.push_str(&format!("fetch_path = \"{}\"\n", self.api.fetch_path));

        output.push_str("\n[polling]\n");
        output.push_str(&format!("interval_ms = {}\n", self.polling.interval_ms));
        output.push_str(&format!("max_attempts = {}\n", self.polling.max_attempts));
        output.push_str(&format!(
            "max_transport_errors = {}\n",
            self.polling.max_transport_errors
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));
        output.push_str(&format!(
            "otlp_endpoint = \"{}\"\n",
            self.telemetry.otlp_endpoint
        ));

        output
    }
}

fn mask_token(token: &str) -> String {
    let token = token.trim();
    match token.chars().count() {
        0 => String::new(),
        1..=8 => "****".to_string(),
        _ => format!("{}****", token.chars().take(4).collect::<String>()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_token(token: &str) -> WarblerConfig {
        let mut config = WarblerConfig::default();
        config.api.token = token.to_string();
        config
    }

    #[test]
    fn test_default_config_needs_token() {
        let config = WarblerConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::MissingToken)));
        assert!(matches!(with_token("   ").validate(), Err(ConfigError::MissingToken)));
        assert!(with_token("sk-123").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = with_token("sk-123");
        config.api.base_url = "gemini.mtysp.top".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "api.base_url", .. })
        ));

        let mut config = with_token("sk-123");
        config.polling.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "polling.max_attempts", .. })
        ));

        let mut config = with_token("sk-123");
        config.polling.max_transport_errors = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "polling.max_transport_errors", .. })
        ));

        let mut config = with_token("sk-123");
        config.polling.max_transport_errors = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_masks_token() {
        let toml = with_token("sk-abcdefghijkl").to_toml();
        assert!(toml.contains("[api]"));
        assert!(toml.contains("[polling]"));
        assert!(toml.contains("token = \"sk-a****\""));
        assert!(!toml.contains("abcdefghijkl"));
    }

    #[test]
    fn test_to_toml_parses_back() {
        let mut config = with_token("short");
        config.polling.interval_ms = 1234;

        let mut reloaded = WarblerConfig::default();
        loader::apply_toml(&mut reloaded, &config.to_toml(), Path::new("dump.toml")).unwrap();
        assert_eq!(reloaded.polling.interval_ms, 1234);
        assert_eq!(reloaded.api.token, "****");
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[polling]\nmax_attempts = 7").unwrap();

        let (config, sources) = WarblerConfig::load_with_sources_from(Some(file.path())).unwrap();
        assert_eq!(config.polling.max_attempts, 7);
        assert_eq!(sources.files.last().map(|p| p.as_path()), Some(file.path()));
    }

    #[test]
    fn test_missing_explicit_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let err = WarblerConfig::load_with_sources_from(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
