//! Domain model and pure decision logic for the reelflow orchestration core.
//!
//! This crate has no I/O: it defines the workflow document, the stage state
//! machine decisions, item planning, progress computation, and the retry
//! policy used by the optimistic-concurrency document updater. Everything
//! here is deterministic and unit-tested in place.

pub mod document;
pub mod error;
pub mod planning;
pub mod progress;
pub mod retry;
pub mod stage;
pub mod types;
