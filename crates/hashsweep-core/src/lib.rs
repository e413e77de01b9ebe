//! Core types and traits for hashsweep.
//!
//! This crate provides the data structures shared by the sweep engine and
//! the CLI: configuration, errors, digests, task outcomes, run counters and
//! the classification policy trait.

mod classify;
mod config;
mod digest;
mod error;
mod report;
mod task;

pub use classify::{Classifier, PLACEHOLDER_REASON, PlaceholderClassifier, Verdict};
pub use config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DEBUG_LOG, DEFAULT_FLUSH_EVERY, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_MILESTONE_EVERY, DEFAULT_OUTPUT, DEFAULT_STALL_TIMEOUT, DEFAULT_SUBMIT_BATCH,
    DEFAULT_SUBMIT_TRACE_EVERY, SweepConfig, SweepConfigBuilder,
};
pub use digest::ContentDigest;
pub use error::SweepError;
pub use report::{OutputRecord, RunCounters, RunReport};
pub use task::{SkipReason, Task, TaskId, TaskOutcome, TaskResult};
