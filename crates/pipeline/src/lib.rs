//! The pipeline orchestrator: stage control, batching, resume, and the
//! single server-owned facade external callers go through.
//!
//! External callers only issue commands (`start`, `continue`, `stop`,
//! `retry`) and observe document state; all stage-transition rules live
//! here, behind [`Orchestrator`].

pub mod batch;
pub mod bulk;
pub mod context;
pub mod controller;
pub mod item;
pub mod orchestrator;
pub mod resume;

pub use bulk::BulkItemResult;
pub use context::{DocRuntime, RuntimeRegistry};
pub use orchestrator::{Orchestrator, StartWorkflowInput};
