//! The generate pipeline: validate, build, submit, poll.

use std::sync::Arc;

use baton::ToolContext;
use serde_json::Value;
use warblerconf::WarblerConfig;

use crate::client::{ApiError, HttpTaskClient, TaskApi};
use crate::error::GenerationError;
use crate::format::GeneratedClip;
use crate::payload::SubmitPayload;
use crate::poller::{PollLimits, Poller, Sleeper, TokioSleeper};
use crate::request;

/// Runs one generation per call. Holds no per-call state, so concurrent
/// calls share it freely.
#[derive(Clone)]
pub struct MusicGenerator {
    api: Arc<dyn TaskApi>,
    sleeper: Arc<dyn Sleeper>,
    limits: PollLimits,
}

impl MusicGenerator {
    pub fn new(api: Arc<dyn TaskApi>, limits: PollLimits) -> Self {
        Self {
            api,
            sleeper: Arc::new(TokioSleeper),
            limits,
        }
    }

    /// HTTP-backed generator for a loaded config.
    pub fn from_config(config: &WarblerConfig) -> Result<Self, ApiError> {
        let client = HttpTaskClient::new(config.api.clone())?;
        Ok(Self::new(Arc::new(client), PollLimits::from(&config.polling)))
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn limits(&self) -> &PollLimits {
        &self.limits
    }

    /// Generate one song from a raw argument bag.
    #[tracing::instrument(skip_all)]
    pub async fn generate(&self, raw: &Value, context: &ToolContext) -> Result<GeneratedClip, GenerationError> {
        let request = request::validate(raw)?;
        let payload = SubmitPayload::build(&request);

        let submitted = tokio::select! {
            biased;
            _ = context.cancellation.cancelled() => return Err(GenerationError::Cancelled),
            submitted = self.api.submit(&payload) => submitted,
        };

        let submission = submitted.map_err(|e| {
            tracing::warn!(error = %e, "Submit failed");
            GenerationError::submission(e)
        })?;

        let task_id = match submission.task_id {
            Some(task_id) => task_id,
            None => {
                tracing::warn!(code = %submission.code, message = ?submission.message, "Submit rejected");
                return Err(GenerationError::rejected(
                    &submission.code,
                    submission.message.as_deref(),
                ));
            }
        };

        tracing::info!(task_id = %task_id, "Generation task submitted");

        Poller::new(self.api.as_ref(), self.sleeper.as_ref(), self.limits)
            .run(&task_id, context)
            .await
    }
}
