//! Batch execution policies.
//!
//! Two policies coexist:
//! - unbounded fan-out: every task runs concurrently (the staged workflow);
//! - capped batching: fixed-size groups run sequentially, items within a
//!   group concurrently, with a cancellation check before each group (the
//!   flat bulk-generation feature).
//!
//! Failure isolation is the caller's concern: task futures are expected to
//! record their own outcome and never abort siblings.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

/// Group size for capped batching.
pub const BULK_BATCH_SIZE: usize = 5;

/// Run every task concurrently and wait for all of them.
pub async fn run_unbounded<T, F, Fut>(tasks: Vec<T>, f: F) -> Vec<Fut::Output>
where
    F: Fn(T) -> Fut,
    Fut: std::future::Future,
{
    join_all(tasks.into_iter().map(f)).await
}

/// Run tasks in sequential groups of `cap`, items within a group
/// concurrently.
///
/// Before each group starts, the cancellation token is checked; once it is
/// cancelled the remaining groups never start and their slots are `None`.
/// Results are returned in input order.
pub async fn run_capped<T, F, Fut>(
    tasks: Vec<T>,
    cap: usize,
    cancel: &CancellationToken,
    f: F,
) -> Vec<Option<Fut::Output>>
where
    F: Fn(T) -> Fut,
    Fut: std::future::Future,
{
    let cap = cap.max(1);
    let total = tasks.len();
    let mut results: Vec<Option<Fut::Output>> = Vec::with_capacity(total);

    let mut remaining = tasks.into_iter();
    let mut started = 0;
    while started < total {
        if cancel.is_cancelled() {
            tracing::info!(
                completed = started,
                total,
                "Capped batch aborted before next group",
            );
            break;
        }
        let group: Vec<T> = remaining.by_ref().take(cap).collect();
        started += group.len();
        let outputs = join_all(group.into_iter().map(&f)).await;
        results.extend(outputs.into_iter().map(Some));
    }

    results.resize_with(total, || None);
    results
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    /// Tracks the highest number of tasks alive at once.
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        async fn run(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn unbounded_runs_everything_at_once() {
        let probe = ConcurrencyProbe::new();
        let results = run_unbounded((0..7).collect(), |i: usize| {
            let probe = Arc::clone(&probe);
            async move {
                probe.run().await;
                i
            }
        })
        .await;
        assert_eq!(results, (0..7).collect::<Vec<_>>());
        assert_eq!(probe.peak(), 7);
    }

    #[tokio::test]
    async fn capped_seven_items_cap_five_runs_two_groups() {
        let probe = ConcurrencyProbe::new();
        let cancel = CancellationToken::new();
        let results = run_capped((0..7).collect(), 5, &cancel, |i: usize| {
            let probe = Arc::clone(&probe);
            async move {
                probe.run().await;
                i
            }
        })
        .await;

        // Items 1-5 then 6-7: never all seven at once.
        assert_eq!(probe.peak(), 5);
        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| r.is_some()));
    }

    #[tokio::test]
    async fn capped_aborts_remaining_groups_on_cancel() {
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let results = run_capped((0..7).collect(), 5, &cancel, |i: usize| {
            let cancel = cancel.clone();
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // The first group trips the stop flag; the second group
                // must never start.
                cancel.cancel();
                i
            }
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 5);
        assert_eq!(results.iter().filter(|r| r.is_none()).count(), 2);
    }

    #[tokio::test]
    async fn capped_with_precancelled_token_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let results =
            run_capped((0..3).collect(), 5, &cancel, |i: usize| async move { i }).await;
        assert!(results.iter().all(|r| r.is_none()));
    }

    #[tokio::test]
    async fn empty_batch_is_fine() {
        let cancel = CancellationToken::new();
        let results: Vec<Option<usize>> =
            run_capped(Vec::new(), 5, &cancel, |i: usize| async move { i }).await;
        assert!(results.is_empty());
        let results: Vec<usize> = run_unbounded(Vec::new(), |i: usize| async move { i }).await;
        assert!(results.is_empty());
    }
}
