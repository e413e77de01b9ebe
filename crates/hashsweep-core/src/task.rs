//! Task identity and outcomes.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;

/// Identifier assigned by the scheduler to each submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A file handed to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub path: PathBuf,
}

impl Task {
    pub fn new(id: TaskId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

/// Why a worker declined to hash a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Path lies on an excluded mount.
    ExcludedMount,
    /// Path is not a regular file (or could not be stat'ed).
    NotRegular,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ExcludedMount => f.write_str("skipped fs mount"),
            SkipReason::NotRegular => f.write_str("not regular"),
        }
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Re-check inside the worker rejected the path.
    Skipped(SkipReason),
    /// Digest computed over `bytes` bytes.
    Digest { digest: ContentDigest, bytes: u64 },
    /// Open/read failed, the worker panicked, or it stalled.
    Failed(String),
}

impl TaskOutcome {
    /// Check if this outcome counts as an error.
    pub fn is_error(&self) -> bool {
        !matches!(self, TaskOutcome::Digest { .. })
    }
}

/// A drained task: path plus outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub id: TaskId,
    pub path: PathBuf,
    pub outcome: TaskOutcome,
}
