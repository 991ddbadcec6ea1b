//! Document persistence with optimistic concurrency.
//!
//! [`DocumentStore`] is the single persistence boundary: read a document
//! with its version token, write it back conditioned on that token being
//! unchanged. Two backends are provided: an in-memory store (tests, local
//! development) and a Postgres store (JSONB column, version counter).
//!
//! [`updater`] layers the retry-with-backoff discipline on top: every
//! document mutation in the system goes through its single
//! apply-with-optimistic-retry combinator.

pub mod memory;
pub mod postgres;
pub mod store;
pub mod updater;

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;
pub use store::{DocumentStore, StoreError, Version, Versioned, WriteOutcome};
pub use updater::DocumentUpdater;
