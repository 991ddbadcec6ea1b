//! Domain error taxonomy.
//!
//! Every failure mode the orchestration core distinguishes, from provider
//! rejections to optimistic-concurrency exhaustion. Item-level errors are
//! recorded on the item and never propagate to sibling items; document- and
//! operation-level errors surface as one of these variants.

/// Domain-level error for the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The generation provider rejected a submission (non-2xx or malformed
    /// response).
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Polling attempts were exhausted before the job reached a terminal
    /// state.
    #[error("Polling timed out after {attempts} attempts")]
    PollingTimeout { attempts: u32 },

    /// The provider reported a terminal failure for a job.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Optimistic-concurrency retries were exhausted; the caller should
    /// retry the whole operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Bad input: out-of-range index, missing required field, invalid state
    /// for the requested operation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A stop signal was observed mid-operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// An unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the core crates.
pub type CoreResult<T> = Result<T, CoreError>;
