//! Task polling.
//!
//! The loop is an explicit state machine: [`PollState::advance`] folds one
//! [`Observation`] into the state and knows nothing about time or I/O. The
//! [`Poller`] drives it, with the wait and the fetch injected so tests can
//! run without a timer or a network.

use std::time::Duration;

use async_trait::async_trait;
use baton::ToolContext;
use thiserror::Error;
use warblerconf::PollingConfig;

use crate::client::{ApiError, FetchResult, TaskApi, TaskSnapshot, TaskStatus, SUCCESS_CODE};
use crate::error::GenerationError;
use crate::format::GeneratedClip;

/// Terminal polling failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollFailure {
    #[error("Music generation failed: {reason}")]
    TaskFailed { reason: String },

    #[error("Music generation reported {status} but produced no audio")]
    DataInconsistent { status: TaskStatus },

    #[error("Music generation timed out after {attempts} polling attempts")]
    Timeout { attempts: u32 },

    #[error("{message}")]
    Transport { message: String, status: Option<u16> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollLimits {
    pub interval: Duration,
    pub max_attempts: u32,
    pub max_transport_errors: u32,
}

impl From<&PollingConfig> for PollLimits {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            max_attempts: config.max_attempts,
            max_transport_errors: config.max_transport_errors,
        }
    }
}

/// What one fetch told us.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    Snapshot(TaskSnapshot),
    /// Envelope code was not success, or there was no snapshot body.
    Unavailable { code: String, message: Option<String> },
    TransportFailure(ApiError),
}

impl From<Result<FetchResult, ApiError>> for Observation {
    fn from(result: Result<FetchResult, ApiError>) -> Self {
        match result {
            Ok(FetchResult {
                snapshot: Some(snapshot),
                ..
            }) => Observation::Snapshot(snapshot),
            Ok(FetchResult { code, message, .. }) => Observation::Unavailable { code, message },
            Err(e) => Observation::TransportFailure(e),
        }
    }
}

/// How a single snapshot reads.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Succeeded(GeneratedClip),
    Failed(PollFailure),
    /// Keep polling.
    Waiting,
    /// Snapshot describes some other task.
    Mismatch,
}

/// Classify one snapshot for `task_id`.
pub fn interpret(task_id: &str, snapshot: &TaskSnapshot) -> Verdict {
    if snapshot.task_id != task_id {
        return Verdict::Mismatch;
    }

    let first = snapshot
        .clips()
        .first()
        .and_then(|clip| GeneratedClip::from_clip(task_id, clip));

    match (snapshot.status, first) {
        (TaskStatus::Failed, _) => Verdict::Failed(PollFailure::TaskFailed {
            reason: snapshot
                .fail_reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .unwrap_or("Unknown reason")
                .to_string(),
        }),
        (TaskStatus::Complete | TaskStatus::InProgress, Some(clip)) => Verdict::Succeeded(clip),
        (TaskStatus::Complete, None) => Verdict::Failed(PollFailure::DataInconsistent {
            status: TaskStatus::Complete,
        }),
        _ => Verdict::Waiting,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// Task accepted, nothing fetched yet.
    Submitted,
    Polling {
        attempt: u32,
        /// Consecutive transport failures.
        transport_errors: u32,
    },
    Succeeded(GeneratedClip),
    Failed(PollFailure),
}

impl PollState {
    /// Fetches made so far.
    pub fn attempts(&self) -> u32 {
        match self {
            PollState::Polling { attempt, .. } => *attempt,
            _ => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PollState::Succeeded(_) | PollState::Failed(_))
    }

    /// Fold one fetch into the state. Terminal states absorb everything.
    pub fn advance(self, task_id: &str, observation: Observation, limits: &PollLimits) -> PollState {
        let (attempt, transport_errors) = match self {
            PollState::Submitted => (1, 0),
            PollState::Polling {
                attempt,
                transport_errors,
            } => (attempt + 1, transport_errors),
            terminal => return terminal,
        };

        let transport_errors = match observation {
            Observation::Snapshot(snapshot) => match interpret(task_id, &snapshot) {
                Verdict::Succeeded(clip) => return PollState::Succeeded(clip),
                Verdict::Failed(failure) => return PollState::Failed(failure),
                Verdict::Waiting | Verdict::Mismatch => 0,
            },
            Observation::Unavailable { .. } => 0,
            Observation::TransportFailure(error) => {
                let transport_errors = transport_errors + 1;
                if transport_errors >= limits.max_transport_errors {
                    return PollState::Failed(PollFailure::Transport {
                        status: error.status(),
                        message: error.to_string(),
                    });
                }
                transport_errors
            }
        };

        if attempt >= limits.max_attempts {
            return PollState::Failed(PollFailure::Timeout { attempts: attempt });
        }

        PollState::Polling {
            attempt,
            transport_errors,
        }
    }
}

/// The wait between fetches.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Drives [`PollState`] against a [`TaskApi`].
pub struct Poller<'a> {
    api: &'a dyn TaskApi,
    sleeper: &'a dyn Sleeper,
    limits: PollLimits,
}

impl<'a> Poller<'a> {
    pub fn new(api: &'a dyn TaskApi, sleeper: &'a dyn Sleeper, limits: PollLimits) -> Self {
        Self {
            api,
            sleeper,
            limits,
        }
    }

    /// Poll `task_id` until it succeeds, fails, or runs out of attempts.
    ///
    /// Every attempt waits the fixed interval first. Cancelling the context
    /// abandons the loop at the next wait or fetch.
    #[tracing::instrument(skip(self, context), fields(max_attempts = self.limits.max_attempts))]
    pub async fn run(&self, task_id: &str, context: &ToolContext) -> Result<GeneratedClip, GenerationError> {
        let cancel = &context.cancellation;
        let mut state = PollState::Submitted;

        loop {
            state = match state {
                PollState::Succeeded(clip) => {
                    tracing::info!(task_id, clip_id = %clip.clip_id, audio_url = %clip.audio_url, "Task produced audio");
                    return Ok(clip);
                }
                PollState::Failed(failure) => {
                    tracing::warn!(task_id, error = %failure, "Task polling failed");
                    return Err(failure.into());
                }
                polling => polling,
            };

            let attempt = state.attempts() + 1;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                _ = self.sleeper.sleep(self.limits.interval) => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
                fetched = self.api.fetch(task_id) => fetched,
            };

            let observation = Observation::from(fetched);
            self.log_attempt(task_id, attempt, &observation);
            context
                .report_progress(
                    f64::from(attempt),
                    f64::from(self.limits.max_attempts),
                    progress_message(&observation),
                )
                .await;

            state = state.advance(task_id, observation, &self.limits);
        }
    }

    fn log_attempt(&self, task_id: &str, attempt: u32, observation: &Observation) {
        let escalated = persistent_failure(observation, attempt, self.limits.max_attempts);
        match observation {
            Observation::Snapshot(snapshot) if snapshot.task_id != task_id => {
                tracing::warn!(task_id, attempt, reported = %snapshot.task_id, "Fetched snapshot for a different task");
            }
            Observation::Snapshot(snapshot) => {
                tracing::debug!(
                    task_id,
                    attempt,
                    status = %snapshot.status,
                    progress = snapshot.progress_label().as_deref().unwrap_or("N/A"),
                    "Polled task"
                );
            }
            Observation::Unavailable { code, message } if escalated => {
                tracing::error!(task_id, attempt, code = %code, message = message.as_deref().unwrap_or(""), "Task still not reporting success");
            }
            Observation::Unavailable { code, message } => {
                tracing::warn!(task_id, attempt, code = %code, message = message.as_deref().unwrap_or(""), "No task data this attempt");
            }
            Observation::TransportFailure(error) => {
                tracing::warn!(task_id, attempt, status = ?error.status(), error = %error, "Fetch failed");
            }
        }
    }
}

/// Past half the budget, a non-success envelope code is logged as an error.
fn persistent_failure(observation: &Observation, attempt: u32, max_attempts: u32) -> bool {
    match observation {
        Observation::Unavailable { code, .. } => {
            code != SUCCESS_CODE && attempt >= max_attempts / 2
        }
        _ => false,
    }
}

fn progress_message(observation: &Observation) -> String {
    match observation {
        Observation::Snapshot(snapshot) => match snapshot.progress_label() {
            Some(progress) => format!("{} ({})", snapshot.status, progress),
            None => snapshot.status.to_string(),
        },
        Observation::Unavailable { code, .. } => format!("waiting (code {})", code),
        Observation::TransportFailure(_) => "waiting (fetch failed)".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::{Clip, SubmissionResult};
    use crate::payload::SubmitPayload;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Answers fetches from a script; repeats the last entry once drained.
    pub(crate) struct ScriptedApi {
        pub submission: Result<SubmissionResult, ApiError>,
        fetches: Mutex<VecDeque<Result<FetchResult, ApiError>>>,
        last: Mutex<Option<Result<FetchResult, ApiError>>>,
        pub fetch_count: AtomicUsize,
        pub submitted: Mutex<Vec<SubmitPayload>>,
    }

    impl ScriptedApi {
        pub(crate) fn new(fetches: Vec<Result<FetchResult, ApiError>>) -> Self {
            Self {
                submission: Ok(SubmissionResult {
                    code: "success".into(),
                    message: None,
                    task_id: Some("task-123".into()),
                }),
                fetches: Mutex::new(fetches.into()),
                last: Mutex::new(None),
                fetch_count: AtomicUsize::new(0),
                submitted: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn fetches(&self) -> usize {
            self.fetch_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskApi for ScriptedApi {
        async fn submit(&self, payload: &SubmitPayload) -> Result<SubmissionResult, ApiError> {
            self.submitted.lock().unwrap().push(payload.clone());
            self.submission.clone()
        }

        async fn fetch(&self, _task_id: &str) -> Result<FetchResult, ApiError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            let next = self.fetches.lock().unwrap().pop_front();
            let mut last = self.last.lock().unwrap();
            match next {
                Some(result) => {
                    *last = Some(result.clone());
                    result
                }
                None => last
                    .clone()
                    .unwrap_or_else(|| Err(ApiError::Transport("script exhausted".into()))),
            }
        }
    }

    #[derive(Default)]
    pub(crate) struct CountingSleeper {
        pub sleeps: AtomicUsize,
    }

    #[async_trait]
    impl Sleeper for CountingSleeper {
        async fn sleep(&self, _duration: Duration) {
            self.sleeps.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn snapshot(status: &str, audio_url: Option<&str>) -> Result<FetchResult, ApiError> {
        let clips = match audio_url {
            Some(url) => json!([{"id": "clip-1", "title": "Song", "audio_url": url}]),
            None => json!([]),
        };
        let snapshot: TaskSnapshot = serde_json::from_value(json!({
            "task_id": "task-123",
            "status": status,
            "data": clips,
        }))
        .unwrap();
        Ok(FetchResult {
            code: "success".into(),
            message: None,
            snapshot: Some(snapshot),
        })
    }

    fn limits(max_attempts: u32) -> PollLimits {
        PollLimits {
            interval: Duration::from_millis(5000),
            max_attempts,
            max_transport_errors: 3,
        }
    }

    async fn run(api: &ScriptedApi, max_attempts: u32) -> (Result<GeneratedClip, GenerationError>, usize) {
        let sleeper = CountingSleeper::default();
        let poller = Poller::new(api, &sleeper, limits(max_attempts));
        let result = poller.run("task-123", &ToolContext::default()).await;
        (result, sleeper.sleeps.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_success_after_three_fetches() {
        let api = ScriptedApi::new(vec![
            snapshot("IN_PROGRESS", None),
            snapshot("IN_PROGRESS", None),
            snapshot("COMPLETE", Some("https://x/a.mp3")),
        ]);

        let (result, sleeps) = run(&api, 60).await;
        let clip = result.unwrap();
        assert_eq!(clip.audio_url, "https://x/a.mp3");
        assert_eq!(clip.title.as_deref(), Some("Song"));
        assert_eq!(api.fetches(), 3);
        assert_eq!(sleeps, 3, "every fetch is preceded by a wait");
    }

    #[tokio::test]
    async fn test_in_progress_with_audio_is_success() {
        let api = ScriptedApi::new(vec![snapshot("IN_PROGRESS", Some("https://x/early.mp3"))]);
        let (result, _) = run(&api, 60).await;
        assert_eq!(result.unwrap().audio_url, "https://x/early.mp3");
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test]
    async fn test_pending_forever_times_out() {
        let api = ScriptedApi::new(vec![snapshot("PENDING", None)]);
        let (result, sleeps) = run(&api, 7).await;
        assert_eq!(
            result.unwrap_err(),
            GenerationError::PollingFailed(PollFailure::Timeout { attempts: 7 })
        );
        assert_eq!(api.fetches(), 7);
        assert_eq!(sleeps, 7);
    }

    #[tokio::test]
    async fn test_failed_stops_immediately() {
        let failed: TaskSnapshot = serde_json::from_value(json!({
            "task_id": "task-123",
            "status": "FAILED",
            "fail_reason": "nsfw content",
        }))
        .unwrap();
        let api = ScriptedApi::new(vec![Ok(FetchResult {
            code: "success".into(),
            message: None,
            snapshot: Some(failed),
        })]);

        let (result, _) = run(&api, 60).await;
        assert_eq!(
            result.unwrap_err(),
            GenerationError::PollingFailed(PollFailure::TaskFailed {
                reason: "nsfw content".into()
            })
        );
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test]
    async fn test_complete_without_clips_is_inconsistent() {
        let api = ScriptedApi::new(vec![snapshot("COMPLETE", None)]);
        let (result, _) = run(&api, 60).await;
        assert_eq!(
            result.unwrap_err(),
            GenerationError::PollingFailed(PollFailure::DataInconsistent {
                status: TaskStatus::Complete
            })
        );
        assert_eq!(api.fetches(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_and_mismatch_consume_attempts() {
        let mut other = snapshot("COMPLETE", Some("https://x/other.mp3")).unwrap();
        if let Some(s) = other.snapshot.as_mut() {
            s.task_id = "task-999".into();
        }
        let api = ScriptedApi::new(vec![
            Ok(FetchResult {
                code: "not_ready".into(),
                message: Some("hold on".into()),
                snapshot: None,
            }),
            Ok(other),
            snapshot("COMPLETE", Some("https://x/a.mp3")),
        ]);

        let (result, _) = run(&api, 60).await;
        assert_eq!(result.unwrap().audio_url, "https://x/a.mp3");
        assert_eq!(api.fetches(), 3);
    }

    #[tokio::test]
    async fn test_transient_transport_errors_are_retried() {
        let api = ScriptedApi::new(vec![
            Err(ApiError::Transport("connection reset".into())),
            Err(ApiError::Transport("connection reset".into())),
            snapshot("COMPLETE", Some("https://x/a.mp3")),
        ]);
        let (result, _) = run(&api, 60).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_persistent_transport_errors_surface() {
        let api = ScriptedApi::new(vec![Err(ApiError::Http {
            status: 502,
            message: "Bad Gateway".into(),
        })]);
        let (result, _) = run(&api, 60).await;
        assert_eq!(
            result.unwrap_err(),
            GenerationError::TransportError {
                message: "Suno API error (Status 502): Bad Gateway".into(),
                status: Some(502),
            }
        );
        assert_eq!(api.fetches(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_polling() {
        struct NeverWakes;

        #[async_trait]
        impl Sleeper for NeverWakes {
            async fn sleep(&self, _duration: Duration) {
                std::future::pending::<()>().await;
            }
        }

        let api = ScriptedApi::new(vec![snapshot("PENDING", None)]);
        let context = ToolContext {
            cancellation: CancellationToken::new(),
            ..Default::default()
        };
        let poller = Poller::new(&api, &NeverWakes, limits(60));

        let cancel = context.cancellation.clone();
        let handle = async { poller.run("task-123", &context).await };
        let (result, _) = tokio::join!(handle, async move { cancel.cancel() });

        assert_eq!(result.unwrap_err(), GenerationError::Cancelled);
        assert_eq!(api.fetches(), 0);
    }

    #[test]
    fn test_advance_is_pure() {
        let limits = limits(2);
        let pending = match snapshot("PENDING", None).unwrap().snapshot {
            Some(s) => s,
            None => unreachable!(),
        };

        let state = PollState::Submitted.advance("task-123", Observation::Snapshot(pending.clone()), &limits);
        assert_eq!(
            state,
            PollState::Polling {
                attempt: 1,
                transport_errors: 0
            }
        );

        let state = state.advance("task-123", Observation::Snapshot(pending), &limits);
        assert_eq!(state, PollState::Failed(PollFailure::Timeout { attempts: 2 }));
        assert!(state.is_terminal());

        // Terminal states absorb further observations.
        let again = state.clone().advance(
            "task-123",
            Observation::TransportFailure(ApiError::Transport("x".into())),
            &limits,
        );
        assert_eq!(again, state);
    }

    #[test]
    fn test_transport_streak_resets_on_response() {
        let limits = limits(60);
        let error = || Observation::TransportFailure(ApiError::Transport("reset".into()));
        let unavailable = Observation::Unavailable {
            code: "busy".into(),
            message: None,
        };

        let state = PollState::Submitted
            .advance("t", error(), &limits)
            .advance("t", error(), &limits)
            .advance("t", unavailable, &limits)
            .advance("t", error(), &limits);

        assert_eq!(
            state,
            PollState::Polling {
                attempt: 4,
                transport_errors: 1
            }
        );
    }

    #[test]
    fn test_transport_budget_counts_the_failing_fetch() {
        let limits = PollLimits {
            max_transport_errors: 1,
            ..limits(60)
        };
        let state = PollState::Submitted.advance(
            "t",
            Observation::TransportFailure(ApiError::Transport("reset".into())),
            &limits,
        );
        assert!(matches!(state, PollState::Failed(PollFailure::Transport { .. })));
    }

    #[test]
    fn test_escalation_needs_failure_code() {
        let unavailable = |code: &str| Observation::Unavailable {
            code: code.into(),
            message: None,
        };

        assert!(persistent_failure(&unavailable("busy"), 30, 60));
        assert!(!persistent_failure(&unavailable("busy"), 29, 60));
        // Success envelope with no task body yet stays a warning.
        assert!(!persistent_failure(&unavailable(SUCCESS_CODE), 59, 60));
        assert!(!persistent_failure(&Observation::from(snapshot("PENDING", None)), 59, 60));
    }

    #[test]
    fn test_interpret_first_clip_only() {
        let snapshot = TaskSnapshot {
            task_id: "t".into(),
            status: TaskStatus::Complete,
            data: Some(vec![
                Clip::default(),
                Clip {
                    audio_url: Some("https://x/second.mp3".into()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        assert!(matches!(
            interpret("t", &snapshot),
            Verdict::Failed(PollFailure::DataInconsistent { .. })
        ));

        let unknown = TaskSnapshot {
            task_id: "t".into(),
            status: TaskStatus::Unknown,
            ..Default::default()
        };
        assert_eq!(interpret("t", &unknown), Verdict::Waiting);
        assert_eq!(interpret("other", &unknown), Verdict::Mismatch);
    }

    #[test]
    fn test_failed_without_reason() {
        let snapshot = TaskSnapshot {
            task_id: "t".into(),
            status: TaskStatus::Failed,
            ..Default::default()
        };
        assert_eq!(
            interpret("t", &snapshot),
            Verdict::Failed(PollFailure::TaskFailed {
                reason: "Unknown reason".into()
            })
        );
    }
}
