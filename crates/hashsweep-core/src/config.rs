//! Sweep configuration types.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Bytes read per `read` call while hashing.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;
/// Submissions between forced drains.
pub const DEFAULT_SUBMIT_BATCH: usize = 5000;
/// Drained results between output flushes.
pub const DEFAULT_FLUSH_EVERY: u64 = 200;
/// Drained results between milestone progress lines.
pub const DEFAULT_MILESTONE_EVERY: u64 = 200;
/// Submissions between `[INFO] submitted` trace lines in the diagnostic log.
pub const DEFAULT_SUBMIT_TRACE_EVERY: u64 = 500;
/// Minimum wall-clock gap between heartbeat lines.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// A worker with no read progress for this long is abandoned.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(120);
/// Default output file name.
pub const DEFAULT_OUTPUT: &str = "hashes.txt";
/// Default diagnostic log file name.
pub const DEFAULT_DEBUG_LOG: &str = "debug_output.log";

/// Configuration for a hashing sweep.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SweepConfig {
    /// Root directory to sweep.
    pub root: PathBuf,

    /// Append-only output file for digest records.
    #[builder(default = "PathBuf::from(DEFAULT_OUTPUT)")]
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Diagnostic log file (None = no diagnostic log).
    #[builder(default)]
    #[serde(default)]
    pub debug_log: Option<PathBuf>,

    /// Number of worker threads (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub workers: usize,

    /// Read chunk size for hashing.
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Drain threshold for in-flight tasks.
    #[builder(default = "DEFAULT_SUBMIT_BATCH")]
    #[serde(default = "default_submit_batch")]
    pub submit_batch: usize,

    /// Flush output after this many drained results.
    #[builder(default = "DEFAULT_FLUSH_EVERY")]
    #[serde(default = "default_flush_every")]
    pub flush_every: u64,

    /// Emit a milestone after this many drained results.
    #[builder(default = "DEFAULT_MILESTONE_EVERY")]
    #[serde(default = "default_milestone_every")]
    pub milestone_every: u64,

    /// Write a submission trace line after this many submissions.
    #[builder(default = "DEFAULT_SUBMIT_TRACE_EVERY")]
    #[serde(default = "default_submit_trace_every")]
    pub submit_trace_every: u64,

    /// Minimum interval between heartbeats.
    #[builder(default = "DEFAULT_HEARTBEAT_INTERVAL")]
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    /// Abandon a worker after this long without read progress (None = never).
    #[builder(default = "Some(DEFAULT_STALL_TIMEOUT)")]
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout: Option<Duration>,

    /// Mount table to read instead of the live one.
    #[builder(default)]
    #[serde(default)]
    pub mount_table: Option<PathBuf>,

    /// Fail on unreadable or malformed mount table data.
    #[builder(default = "false")]
    #[serde(default)]
    pub strict_mount_table: bool,
}

fn default_output() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT)
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_submit_batch() -> usize {
    DEFAULT_SUBMIT_BATCH
}

fn default_flush_every() -> u64 {
    DEFAULT_FLUSH_EVERY
}

fn default_milestone_every() -> u64 {
    DEFAULT_MILESTONE_EVERY
}

fn default_submit_trace_every() -> u64 {
    DEFAULT_SUBMIT_TRACE_EVERY
}

fn default_heartbeat_interval() -> Duration {
    DEFAULT_HEARTBEAT_INTERVAL
}

fn default_stall_timeout() -> Option<Duration> {
    Some(DEFAULT_STALL_TIMEOUT)
}

impl SweepConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be non-zero".to_string());
        }
        if self.submit_batch == Some(0) {
            return Err("Submit batch must be non-zero".to_string());
        }
        if self.flush_every == Some(0) || self.milestone_every == Some(0) {
            return Err("Flush and milestone intervals must be non-zero".to_string());
        }
        Ok(())
    }
}

impl SweepConfig {
    /// Create a new sweep config builder.
    pub fn builder() -> SweepConfigBuilder {
        SweepConfigBuilder::default()
    }

    /// Create a config with defaults for the given root and output.
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
            debug_log: None,
            workers: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            submit_batch: DEFAULT_SUBMIT_BATCH,
            flush_every: DEFAULT_FLUSH_EVERY,
            milestone_every: DEFAULT_MILESTONE_EVERY,
            submit_trace_every: DEFAULT_SUBMIT_TRACE_EVERY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            stall_timeout: Some(DEFAULT_STALL_TIMEOUT),
            mount_table: None,
            strict_mount_table: false,
        }
    }

    /// Worker count with `0` resolved to `max(4, available cores)`.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                .max(4),
            n => n,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::new("/", DEFAULT_OUTPUT)
    }
}
