//! Bounded fixed-interval polling of an asynchronous job handle.
//!
//! Each iteration first evaluates the cooperative continue predicate, then
//! queries the provider. Transient fetch failures and unknown statuses
//! consume an attempt and sleep one interval; exhausting the attempts is a
//! `PollingTimeout`. Cancellation returns without touching the item; the
//! caller decides the resulting item status.

use std::time::Duration;

use reelflow_core::error::CoreError;

use crate::traits::GenerationProvider;

/// Poll cadence for image jobs: 3s interval, ~5 minutes total.
pub const IMAGE_POLL: PollConfig = PollConfig {
    interval: Duration::from_secs(3),
    max_attempts: 100,
};

/// Poll cadence for video jobs: 5s interval, ~10 minutes total.
pub const VIDEO_POLL: PollConfig = PollConfig {
    interval: Duration::from_secs(5),
    max_attempts: 120,
};

/// Fixed interval and attempt bound for one job's polling loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Poll `job_handle` until a terminal state, cancellation, or timeout.
///
/// Returns the output url on success. `should_continue` is evaluated before
/// every iteration; once it reports false the loop stops with
/// [`CoreError::Cancelled`] and issues no further provider calls.
pub async fn poll_job<F>(
    provider: &dyn GenerationProvider,
    job_handle: &str,
    config: PollConfig,
    should_continue: F,
) -> Result<String, CoreError>
where
    F: Fn() -> bool,
{
    for attempt in 1..=config.max_attempts {
        if !should_continue() {
            tracing::debug!(job_handle, attempt, "Polling cancelled");
            return Err(CoreError::Cancelled);
        }

        match provider.get_job_result(job_handle).await {
            Ok(result) if result.status.is_success() => {
                return result.output_url.ok_or_else(|| {
                    CoreError::Provider(format!(
                        "Job {job_handle} succeeded without an output url"
                    ))
                });
            }
            Ok(result) if result.status.is_failure() => {
                let message = result
                    .error
                    .unwrap_or_else(|| "provider reported failure without detail".to_string());
                return Err(CoreError::Provider(message));
            }
            Ok(result) => {
                tracing::trace!(job_handle, attempt, status = ?result.status, "Job still running");
            }
            Err(e) => {
                // Transient fetch failure still consumes an attempt.
                tracing::warn!(job_handle, attempt, error = %e, "Poll iteration failed");
            }
        }

        tokio::time::sleep(config.interval).await;
    }

    Err(CoreError::PollingTimeout {
        attempts: config.max_attempts,
    })
}
