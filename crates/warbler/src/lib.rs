//! warbler - music generation over MCP
//!
//! One tool, `generate_music`, backed by an upstream submit/poll task API:
//!
//! 1. [`request::validate`] turns the raw argument bag into a [`GenerationRequest`]
//! 2. [`SubmitPayload::build`] maps it onto the upstream body
//! 3. [`TaskApi::submit`] starts the task
//! 4. [`Poller`] waits for a playable clip
//! 5. [`GeneratedClip::to_text`] renders the answer
//!
//! [`WarblerHandler`] wires this into a `baton::Handler`.

pub mod client;
pub mod error;
pub mod format;
pub mod generator;
pub mod handler;
pub mod payload;
pub mod poller;
pub mod request;
pub mod telemetry;

pub use client::{ApiError, HttpTaskClient, TaskApi, TaskSnapshot, TaskStatus};
pub use error::GenerationError;
pub use format::GeneratedClip;
pub use generator::MusicGenerator;
pub use handler::{WarblerHandler, TOOL_NAME};
pub use payload::SubmitPayload;
pub use poller::{PollFailure, PollLimits, PollState, Poller, Sleeper, TokioSleeper};
pub use request::{GenerationMode, GenerationRequest, ModelVersion, ValidationError};
