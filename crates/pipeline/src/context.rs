//! Per-document runtime state: cancellation and outstanding-operation
//! accounting.
//!
//! Replaces ambient "is something generating" globals with an explicit
//! per-document object passed through the call chain. The cancellation
//! token is cooperative: polling loops and batch-group boundaries check it,
//! in-flight provider HTTP calls are not retracted. A stop or completion
//! signal is only final once the outstanding-operation counter drains to
//! zero.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reelflow_core::types::DocId;
use tokio_util::sync::CancellationToken;

/// Runtime state for one document.
pub struct DocRuntime {
    /// Current cancellation token; replaced on renew after a stop.
    cancel: Mutex<CancellationToken>,
    /// Number of pipelines (stage runs, retries, resumes) in flight.
    active_ops: Arc<AtomicUsize>,
    /// Guard against overlapping resume calls for the same document.
    resume_in_flight: AtomicBool,
}

impl Default for DocRuntime {
    fn default() -> Self {
        Self {
            cancel: Mutex::new(CancellationToken::new()),
            active_ops: Arc::new(AtomicUsize::new(0)),
            resume_in_flight: AtomicBool::new(false),
        }
    }
}

impl DocRuntime {
    /// Clone of the current cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().expect("runtime mutex poisoned").clone()
    }

    /// Cancel every operation attached to the current token.
    pub fn cancel_all(&self) {
        self.cancel.lock().expect("runtime mutex poisoned").cancel();
    }

    /// Token for a fresh run: reuses the current token unless it was already
    /// cancelled by a previous stop, in which case a new one is installed so
    /// the next run is not stillborn.
    pub fn renewed_token(&self) -> CancellationToken {
        let mut guard = self.cancel.lock().expect("runtime mutex poisoned");
        if guard.is_cancelled() {
            *guard = CancellationToken::new();
        }
        guard.clone()
    }

    /// Register one in-flight pipeline; the guard decrements on drop.
    pub fn begin_op(&self) -> OpGuard {
        self.active_ops.fetch_add(1, Ordering::SeqCst);
        OpGuard {
            counter: Arc::clone(&self.active_ops),
        }
    }

    /// Number of pipelines currently in flight for this document.
    pub fn active_ops(&self) -> usize {
        self.active_ops.load(Ordering::SeqCst)
    }

    /// Attempt to become the single in-flight resume for this document.
    /// Returns `None` when a resume is already running.
    pub fn try_begin_resume(self: &Arc<Self>) -> Option<ResumeGuard> {
        if self
            .resume_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(ResumeGuard {
                runtime: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

/// RAII handle for one outstanding operation.
pub struct OpGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for OpGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// RAII handle for the single in-flight resume.
pub struct ResumeGuard {
    runtime: Arc<DocRuntime>,
}

impl Drop for ResumeGuard {
    fn drop(&mut self) {
        self.runtime.resume_in_flight.store(false, Ordering::SeqCst);
    }
}

/// Shared map of document id to runtime state.
#[derive(Default)]
pub struct RuntimeRegistry {
    runtimes: Mutex<HashMap<DocId, Arc<DocRuntime>>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the runtime for a document.
    pub fn runtime(&self, id: DocId) -> Arc<DocRuntime> {
        let mut runtimes = self.runtimes.lock().expect("registry mutex poisoned");
        Arc::clone(runtimes.entry(id).or_default())
    }
}
