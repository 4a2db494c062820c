//! Progress Notification Types
//!
//! A client that wants updates on a long-running call puts a `progressToken`
//! in the request's `_meta`; the server then emits `notifications/progress`
//! messages tagged with that token until the call completes.

use serde::{Deserialize, Serialize};

/// Parameters of a `notifications/progress` message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    pub progress_token: ProgressToken,

    /// Absolute progress when `total` is set, otherwise 0.0 to 1.0.
    pub progress: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressNotification {
    /// Progress as `progress` out of `total` steps.
    pub fn absolute(
        token: ProgressToken,
        progress: f64,
        total: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            progress_token: token,
            progress,
            total: Some(total),
            message: Some(message.into()),
        }
    }
}

/// Progress token identifying a request; a string or an integer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Integer(i64),
}

impl std::fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressToken::String(s) => write!(f, "{}", s),
            ProgressToken::Integer(i) => write!(f, "{}", i),
        }
    }
}

/// The reserved `_meta` member of request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}
