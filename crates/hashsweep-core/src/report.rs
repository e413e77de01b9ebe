//! Run counters, output records and the end-of-run report.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::Verdict;
use crate::digest::ContentDigest;

/// Counters for a sweep, owned by the coordinating thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Tasks handed to the worker pool.
    pub submitted: u64,
    /// Tasks drained, whatever their outcome.
    pub done: u64,
    /// Drained tasks without a digest (skips and failures).
    pub errors: u64,
    /// Subset of `errors` rejected by the worker's eligibility re-check.
    pub skipped: u64,
    /// Bytes read by successful digests.
    pub bytes_hashed: u64,
}

impl RunCounters {
    /// Create new zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drained tasks that produced a digest.
    pub fn succeeded(&self) -> u64 {
        self.done - self.errors
    }
}

/// One line of durable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub digest: ContentDigest,
    pub flagged: bool,
    pub reason: String,
}

impl OutputRecord {
    /// Build a record from a digest and its verdict.
    pub fn new(digest: ContentDigest, verdict: Verdict) -> Self {
        Self {
            digest,
            flagged: verdict.flagged,
            reason: verdict.reason,
        }
    }
}

/// Renders `<hex-digest> <TRUE|FALSE> <reason>` without the newline.
impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = if self.flagged { "TRUE" } else { "FALSE" };
        write!(f, "{} {} {}", self.digest, flag, self.reason)
    }
}

/// Summary returned by a completed sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Root that was swept.
    pub root: PathBuf,
    /// Final counters.
    pub counters: RunCounters,
    /// Highest number of simultaneously in-flight tasks.
    pub peak_inflight: usize,
    /// Worker threads replaced after a crash or stall.
    pub worker_restarts: u64,
    /// Directory entries the walker could not read.
    pub walk_errors: u64,
    /// Mountpoints excluded from the sweep.
    pub excluded_mounts: Vec<PathBuf>,
    /// Wall-clock duration of the sweep.
    pub elapsed: Duration,
}

impl RunReport {
    /// Check if every submitted task was drained.
    pub fn is_complete(&self) -> bool {
        self.counters.submitted == self.counters.done
    }
}
