//! Generation-provider integration: submission, polling, and the merge
//! service.
//!
//! The orchestration core talks to providers exclusively through the
//! [`GenerationProvider`] and [`MergeService`] traits; the [`api`] and
//! [`merge`] modules provide reqwest-backed implementations of those traits
//! for an HTTP provider. [`submit`] and [`poll`] implement the per-item job
//! lifecycle halves: fire the request, then watch the handle until a
//! terminal state, a cancellation signal, or a timeout.

pub mod api;
pub mod merge;
pub mod poll;
pub mod submit;
pub mod traits;

pub use api::GenerationApi;
pub use merge::MergeApi;
pub use poll::{poll_job, PollConfig, IMAGE_POLL, VIDEO_POLL};
pub use submit::submit_task;
pub use traits::{
    GenerationProvider, GenerationRequest, JobResult, JobState, MergeService, SubmitOutcome,
};
