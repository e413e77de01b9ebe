//! Sweep engine for hashsweep.
//!
//! This crate walks a directory tree, skips pseudo-filesystem mounts and
//! non-regular files, and hashes every remaining file on a supervised pool of
//! worker threads.
//!
//! # Overview
//!
//! - **Mount exclusion** from `/proc/self/mountinfo` or `/proc/mounts`
//! - **Bounded submission**: in-flight tasks are drained in halves
//! - **Isolated workers**: panics and stalls cost one task, not the run
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use hashsweep_scan::{PlaceholderClassifier, ResultSink, Scheduler, SweepConfig};
//!
//! let config = SweepConfig::new("/srv", "hashes.txt");
//! let scheduler = Scheduler::new(config.clone()).unwrap();
//! let mut sink = ResultSink::from_config(&config, Box::new(PlaceholderClassifier)).unwrap();
//! let report = scheduler.run(&mut sink).unwrap();
//!
//! println!("{} files hashed", report.counters.succeeded());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use hashsweep_scan::{Scheduler, SweepConfig};
//!
//! let scheduler = Scheduler::new(SweepConfig::default()).unwrap();
//! let mut progress_rx = scheduler.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         eprintln!("{progress}");
//!     }
//! });
//! ```

mod diag;
mod digest;
pub mod mounts;
mod pool;
mod probe;
mod progress;
mod scheduler;
mod sink;

pub use diag::DiagnosticLog;
pub use digest::{DigestWorker, hash_file, hash_file_with};
pub use mounts::{ExcludedMounts, MountRecord, MountTableFormat, is_excluded, load_excluded_mounts};
pub use pool::{Completion, Job, WorkerContext, WorkerPool};
pub use probe::{Eligibility, is_eligible, probe};
pub use progress::{ProgressKind, ProgressReporter, SweepProgress};
pub use scheduler::{Scheduler, load_exclusions};
pub use sink::ResultSink;

// Re-export core types for convenience
pub use hashsweep_core::{
    Classifier, ContentDigest, OutputRecord, PlaceholderClassifier, RunCounters, RunReport,
    SkipReason, SweepConfig, SweepError, Task, TaskId, TaskOutcome, TaskResult, Verdict,
};
