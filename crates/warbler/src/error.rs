//! Failures that reach the tool boundary, and how they are reported.

use baton::{CallToolResult, ErrorData};
use serde_json::json;
use thiserror::Error;

use crate::client::ApiError;
use crate::poller::PollFailure;
use crate::request::ValidationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Rejected before any network call.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[from] ValidationError),

    #[error("{message}")]
    SubmissionFailed { message: String, status: Option<u16> },

    #[error(transparent)]
    PollingFailed(PollFailure),

    #[error("{message}")]
    TransportError { message: String, status: Option<u16> },

    #[error("Music generation cancelled")]
    Cancelled,
}

impl From<PollFailure> for GenerationError {
    fn from(failure: PollFailure) -> Self {
        match failure {
            PollFailure::Transport { message, status } => {
                GenerationError::TransportError { message, status }
            }
            other => GenerationError::PollingFailed(other),
        }
    }
}

impl GenerationError {
    /// Submit call itself failed.
    pub fn submission(error: ApiError) -> Self {
        let message = match &error {
            ApiError::Transport(e) => format!("Could not reach the music API: {}", e),
            other => other.to_string(),
        };
        GenerationError::SubmissionFailed {
            status: error.status(),
            message,
        }
    }

    /// Submit answered without a usable task id.
    pub fn rejected(code: &str, message: Option<&str>) -> Self {
        let detail = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(code);
        GenerationError::SubmissionFailed {
            message: format!("Music generation submission failed: {}", detail),
            status: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::InvalidArguments(_) => "invalid_arguments",
            GenerationError::SubmissionFailed { .. } => "submission_failed",
            GenerationError::PollingFailed(PollFailure::TaskFailed { .. }) => "task_failed",
            GenerationError::PollingFailed(PollFailure::DataInconsistent { .. }) => {
                "data_inconsistent"
            }
            GenerationError::PollingFailed(PollFailure::Timeout { .. }) => "timeout",
            GenerationError::PollingFailed(PollFailure::Transport { .. })
            | GenerationError::TransportError { .. } => "transport_error",
            GenerationError::Cancelled => "cancelled",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GenerationError::SubmissionFailed { status, .. }
            | GenerationError::TransportError { status, .. }
            | GenerationError::PollingFailed(PollFailure::Transport { status, .. }) => *status,
            _ => None,
        }
    }

    /// Protocol faults become `Err`; API-level failures become an
    /// error-flagged result the model can read.
    pub fn into_tool_result(self) -> Result<CallToolResult, ErrorData> {
        match self {
            GenerationError::InvalidArguments(e) => Err(ErrorData::invalid_params(e.to_string())),
            GenerationError::Cancelled => Err(ErrorData::internal_error("Music generation cancelled")),
            other => {
                let mut structured = json!({ "kind": other.kind() });
                if let Some(status) = other.status() {
                    structured["status"] = json!(status);
                }
                Ok(CallToolResult::error(other.to_string()).with_structured(structured))
            }
        }
    }
}
