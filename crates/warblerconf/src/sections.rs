//! Configuration sections.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream generation API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme + host of the generation API.
    /// Default: https://gemini.mtysp.top
    #[serde(default = "ApiConfig::default_base_url")]
    pub base_url: String,

    /// Bearer token. Required; there is no usable default.
    #[serde(default)]
    pub token: String,

    /// Default: /suno/submit/music
    #[serde(default = "ApiConfig::default_submit_path")]
    pub submit_path: String,

    /// Task id is appended as a path segment.
    /// Default: /suno/fetch
    #[serde(default = "ApiConfig::default_fetch_path")]
    pub fetch_path: String,
}

impl ApiConfig {
    fn default_base_url() -> String {
        "https://gemini.mtysp.top".to_string()
    }

    fn default_submit_path() -> String {
        "/suno/submit/music".to_string()
    }

    fn default_fetch_path() -> String {
        "/suno/fetch".to_string()
    }

    /// Full submit URL.
    pub fn submit_url(&self) -> String {
        join_url(&self.base_url, &self.submit_path)
    }

    /// Full fetch URL for one task.
    pub fn fetch_url(&self, task_id: &str) -> String {
        format!("{}/{}", join_url(&self.base_url, &self.fetch_path), task_id)
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            token: String::new(),
            submit_path: Self::default_submit_path(),
            fetch_path: Self::default_fetch_path(),
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/').trim_end_matches('/')
    )
}

/// Poll pacing. Fixed per process, never per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay before every fetch.
    /// Default: 5000
    #[serde(default = "PollingConfig::default_interval_ms")]
    pub interval_ms: u64,

    /// Fetches before giving up.
    /// Default: 60
    #[serde(default = "PollingConfig::default_max_attempts")]
    pub max_attempts: u32,

    /// Consecutive fetch transport failures that end the invocation
    /// with a transport error. `1` fails on the first one.
    /// Default: 3
    #[serde(default = "PollingConfig::default_max_transport_errors")]
    pub max_transport_errors: u32,
}

impl PollingConfig {
    fn default_interval_ms() -> u64 {
        5000
    }

    fn default_max_attempts() -> u32 {
        60
    }

    fn default_max_transport_errors() -> u32 {
        3
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
            max_attempts: Self::default_max_attempts(),
            max_transport_errors: Self::default_max_transport_errors(),
        }
    }
}

/// Logging and OpenTelemetry export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive string.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// OTLP gRPC endpoint; empty disables export.
    /// Default: empty
    #[serde(default)]
    pub otlp_endpoint: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    pub fn otlp_enabled(&self) -> bool {
        !self.otlp_endpoint.trim().is_empty()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            otlp_endpoint: String::new(),
        }
    }
}
