//! Durable job queue backed by an outbox table
//!
//! Jobs are inserted inside the caller's database transaction, so a job
//! exists if and only if the state change that requested it committed.
//! Workers claim rows by kind and mark them done or failed.

pub mod queue;

pub use queue::*;

// Re-export core job types for convenience
pub use hostline_core::Job;
