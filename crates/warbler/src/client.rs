//! Remote task API.
//!
//! [`TaskApi`] is the seam between the orchestrator and the network. The
//! HTTP implementation lives here; tests script their own.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use warblerconf::ApiConfig;

use crate::payload::SubmitPayload;

/// Envelope code for a successful call.
pub const SUCCESS_CODE: &str = "success";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Upstream answered with a non-2xx status.
    #[error("Suno API error (Status {status}): {message}")]
    Http { status: u16, message: String },

    /// 2xx response whose body was not the expected JSON.
    #[error("could not decode API response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Lifecycle status reported by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Submitted,
    InProgress,
    Complete,
    Failed,
    /// Anything we do not recognize keeps the poller waiting.
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Submitted => "SUBMITTED",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Complete => "COMPLETE",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClipMetadata {
    #[serde(default)]
    pub tags: Option<String>,
}

/// One generated audio clip.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Clip {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub metadata: Option<ClipMetadata>,
}

impl Clip {
    /// Audio URL, if playable.
    pub fn playable_url(&self) -> Option<&str> {
        self.audio_url.as_deref().filter(|url| !url.trim().is_empty())
    }

    pub fn tags(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.tags.as_deref())
    }
}

/// Task state as reported by one fetch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskSnapshot {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub fail_reason: Option<String>,
    /// Upstream sends either "42%" or a bare number.
    #[serde(default)]
    pub progress: Option<Value>,
    #[serde(default)]
    pub data: Option<Vec<Clip>>,
}

impl TaskSnapshot {
    pub fn clips(&self) -> &[Clip] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn progress_label(&self) -> Option<String> {
        match self.progress.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    pub code: String,
    pub message: Option<String>,
    /// Present only on success with a usable id.
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub code: String,
    pub message: Option<String>,
    /// Absent when the code was not success or the body held no snapshot.
    pub snapshot: Option<TaskSnapshot>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl From<Envelope> for SubmissionResult {
    fn from(envelope: Envelope) -> Self {
        let task_id = match (&envelope.data, envelope.code == SUCCESS_CODE) {
            (Some(Value::String(id)), true) if !id.trim().is_empty() => Some(id.clone()),
            _ => None,
        };
        Self {
            code: envelope.code,
            message: envelope.message,
            task_id,
        }
    }
}

impl From<Envelope> for FetchResult {
    fn from(envelope: Envelope) -> Self {
        let snapshot = if envelope.code == SUCCESS_CODE {
            envelope
                .data
                .filter(Value::is_object)
                .and_then(|data| match serde_json::from_value::<TaskSnapshot>(data) {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => {
                        tracing::warn!(error = %e, "Unreadable task snapshot");
                        None
                    }
                })
        } else {
            None
        };
        Self {
            code: envelope.code,
            message: envelope.message,
            snapshot,
        }
    }
}

/// Submit/fetch operations against the upstream task API.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmissionResult, ApiError>;

    async fn fetch(&self, task_id: &str) -> Result<FetchResult, ApiError>;
}

/// [`TaskApi`] over HTTP with bearer auth.
#[derive(Debug, Clone)]
pub struct HttpTaskClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpTaskClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|e| ApiError::Transport(format!("invalid API token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("warbler/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    async fn read_envelope(response: reqwest::Response) -> Result<Envelope, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TaskApi for HttpTaskClient {
    #[tracing::instrument(skip(self, payload), fields(mv = %payload.mv))]
    async fn submit(&self, payload: &SubmitPayload) -> Result<SubmissionResult, ApiError> {
        tracing::debug!(payload = ?payload, "Submitting generation task");

        let response = self
            .client
            .post(self.config.submit_url())
            .json(payload)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self::read_envelope(response).await?.into())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch(&self, task_id: &str) -> Result<FetchResult, ApiError> {
        let response = self
            .client
            .get(self.config.fetch_url(task_id))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self::read_envelope(response).await?.into())
    }
}

/// Best message from an error body: `message`, then `error.message`, then
/// the raw text.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            v.get("message")
                .and_then(Value::as_str)
                .or_else(|| v.pointer("/error/message").and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
