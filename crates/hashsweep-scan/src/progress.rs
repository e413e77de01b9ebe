//! Sweep progress reporting.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use hashsweep_core::RunCounters;

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Periodic status while submitting.
    Heartbeat,
    /// Every N drained results.
    Milestone,
    /// Traversal finished, final drain starting.
    DrainStarted,
    /// Run finished.
    Finished,
}

/// Progress information during a sweep.
#[derive(Debug, Clone)]
pub struct SweepProgress {
    pub kind: ProgressKind,
    /// Results drained so far.
    pub done: u64,
    /// Drained results without a digest.
    pub errors: u64,
    /// Tasks submitted so far.
    pub submitted: u64,
    /// Tasks submitted but not yet drained.
    pub inflight: usize,
    /// Time elapsed since the sweep started.
    pub elapsed: Duration,
}

impl fmt::Display for SweepProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ProgressKind::Heartbeat => write!(
                f,
                "[PROGRESS] done={} errors={} submitted={} inflight={}",
                self.done, self.errors, self.submitted, self.inflight
            ),
            ProgressKind::Milestone => write!(
                f,
                "[PROGRESS] {} done ({} errors, {} submitted)",
                self.done, self.errors, self.submitted
            ),
            ProgressKind::DrainStarted => write!(
                f,
                "[INFO] submission complete. draining remaining {} tasks",
                self.inflight
            ),
            ProgressKind::Finished => write!(
                f,
                "[DONE] submitted={} ok={} errors={}",
                self.submitted,
                self.done - self.errors,
                self.errors
            ),
        }
    }
}

/// Best-effort heartbeat and milestone emitter.
///
/// The scheduler calls into this at convenient points; nothing here runs on
/// its own timer, so heartbeats can lag during long uninterrupted bursts.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: broadcast::Sender<SweepProgress>,
    heartbeat_interval: Duration,
    milestone_every: u64,
    started: Instant,
    last_heartbeat: Instant,
}

impl ProgressReporter {
    pub fn new(
        tx: broadcast::Sender<SweepProgress>,
        heartbeat_interval: Duration,
        milestone_every: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            tx,
            heartbeat_interval,
            milestone_every: milestone_every.max(1),
            started: now,
            last_heartbeat: now,
        }
    }

    /// Emit a heartbeat if the minimum interval has passed.
    pub fn maybe_heartbeat(&mut self, counters: &RunCounters, inflight: usize) -> bool {
        if self.last_heartbeat.elapsed() < self.heartbeat_interval {
            return false;
        }
        self.last_heartbeat = Instant::now();
        self.emit(ProgressKind::Heartbeat, counters, inflight);
        true
    }

    /// Called after each drained result; emits a milestone every N.
    pub fn on_recorded(&mut self, counters: &RunCounters, inflight: usize) -> bool {
        if counters.done == 0 || counters.done % self.milestone_every != 0 {
            return false;
        }
        self.emit(ProgressKind::Milestone, counters, inflight);
        true
    }

    pub fn drain_started(&self, counters: &RunCounters, inflight: usize) {
        self.emit(ProgressKind::DrainStarted, counters, inflight);
    }

    pub fn finished(&self, counters: &RunCounters) {
        self.emit(ProgressKind::Finished, counters, 0);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn emit(&self, kind: ProgressKind, counters: &RunCounters, inflight: usize) {
        let progress = SweepProgress {
            kind,
            done: counters.done,
            errors: counters.errors,
            submitted: counters.submitted,
            inflight,
            elapsed: self.started.elapsed(),
        };
        tracing::info!(target: "hashsweep::progress", "{progress}");
        // No subscribers is fine.
        let _ = self.tx.send(progress);
    }
}
