//! Walk-and-submit scheduler.
//!
//! A single coordinating thread walks the tree with jwalk (serially, never
//! following symlinks), submits every eligible file to the worker pool and
//! periodically drains completions so the number of in-flight tasks stays
//! bounded no matter how large the tree is.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jwalk::{Parallelism, WalkDir};
use tokio::sync::broadcast;

use hashsweep_core::{RunReport, SweepConfig, SweepError, Task, TaskId, TaskResult};

use crate::diag::DiagnosticLog;
use crate::digest::DigestWorker;
use crate::mounts::{ExcludedMounts, absolutize};
use crate::pool::{Completion, Job, WorkerPool};
use crate::probe::{Eligibility, probe};
use crate::progress::{ProgressReporter, SweepProgress};
use crate::sink::ResultSink;

/// How long running jobs may finish after a run fails.
const ABORT_GRACE: Duration = Duration::from_secs(5);

/// Build the exclusion set a config asks for.
///
/// An explicit `mount_table` replaces the live table. Outside strict mode any
/// failure degrades to an empty set.
pub fn load_exclusions(config: &SweepConfig) -> Result<ExcludedMounts, SweepError> {
    let Some(table) = &config.mount_table else {
        return ExcludedMounts::load_live(config.strict_mount_table);
    };
    match ExcludedMounts::from_table_file(table, config.strict_mount_table) {
        Ok(set) => Ok(set),
        Err(err) if config.strict_mount_table => Err(err),
        Err(err) => {
            tracing::warn!(%err, "mount table unavailable, nothing will be excluded");
            Ok(ExcludedMounts::empty())
        }
    }
}

/// Drives a sweep: traversal, submission, draining and accounting.
pub struct Scheduler {
    config: SweepConfig,
    excluded: Arc<ExcludedMounts>,
    diag: DiagnosticLog,
    job: Option<Job>,
    progress_tx: broadcast::Sender<SweepProgress>,
}

impl Scheduler {
    /// Create a scheduler, reading the mount table the config points at.
    pub fn new(config: SweepConfig) -> Result<Self, SweepError> {
        let excluded = load_exclusions(&config)?;
        Ok(Self::with_exclusions(config, excluded))
    }

    /// Create a scheduler with a precomputed exclusion set.
    pub fn with_exclusions(config: SweepConfig, excluded: ExcludedMounts) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            config,
            excluded: Arc::new(excluded),
            diag: DiagnosticLog::disabled(),
            job: None,
            progress_tx,
        }
    }

    /// Send worker and traversal trace lines to `diag`.
    pub fn with_diagnostics(mut self, diag: DiagnosticLog) -> Self {
        self.diag = diag;
        self
    }

    /// Run `job` in the workers instead of the digest worker.
    pub fn with_job(mut self, job: Job) -> Self {
        self.job = Some(job);
        self
    }

    /// Subscribe to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<SweepProgress> {
        self.progress_tx.subscribe()
    }

    pub fn excluded(&self) -> &ExcludedMounts {
        &self.excluded
    }

    /// Sweep the configured root, recording every result into `sink`.
    pub fn run<W: Write>(&self, sink: &mut ResultSink<W>) -> Result<RunReport, SweepError> {
        let root = absolutize(&self.config.root);
        let meta = std::fs::metadata(&root).map_err(|e| SweepError::io(&root, e))?;
        if !meta.is_dir() {
            return Err(SweepError::NotADirectory { path: root });
        }

        let workers = self.config.effective_workers();
        let job = self.job.clone().unwrap_or_else(|| {
            DigestWorker::new(Arc::clone(&self.excluded), self.config.chunk_size).into_job()
        });
        let pool = WorkerPool::new(workers, job, self.diag.clone(), self.config.stall_timeout)?;

        self.diag.line(format_args!(
            "[START] root={} workers={workers}",
            root.display()
        ));
        for mount in self.excluded.mounts() {
            self.diag.line(format_args!("[SKIP] mountpoint: {}", mount.display()));
        }

        let mut run = Run {
            config: &self.config,
            diag: &self.diag,
            pool,
            sink,
            reporter: ProgressReporter::new(
                self.progress_tx.clone(),
                self.config.heartbeat_interval,
                self.config.milestone_every,
            ),
            inflight: HashMap::new(),
            next_id: 0,
            since_drain: 0,
            peak_inflight: 0,
            walk_errors: 0,
        };

        let walked = match self.excluded.mount_for(&root) {
            Some(mount) => {
                let fs_type = self.excluded.fs_type(mount).unwrap_or("unknown");
                tracing::warn!(
                    root = %root.display(),
                    mount = %mount.display(),
                    fs_type,
                    "root is on an excluded {fs_type} mount, nothing to sweep"
                );
                self.diag.line(format_args!(
                    "[SKIP] root {} is on excluded mount {} ({fs_type})",
                    root.display(),
                    mount.display()
                ));
                Ok(())
            }
            None => self.walk(&root, &mut run),
        };

        let result = match walked {
            Ok(()) => run.finish(root, &self.excluded),
            Err(err) => Err(run.abort(err)),
        };
        if let Err(err) = self.diag.flush() {
            tracing::warn!(%err, "failed to flush diagnostic log");
        }
        result
    }

    fn walk<W: Write>(&self, root: &Path, run: &mut Run<'_, W>) -> Result<(), SweepError> {
        let excluded = Arc::clone(&self.excluded);
        let walker = WalkDir::new(root)
            .parallelism(Parallelism::Serial)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .process_read_dir(move |_depth, _path, _state, children| {
                // Never descend into excluded mounts.
                for entry in children.iter_mut().flatten() {
                    if entry.file_type().is_dir() && excluded.contains(&entry.path()) {
                        entry.read_children_path = None;
                    }
                }
            });

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    run.walk_errors += 1;
                    tracing::debug!(%err, "walk error");
                    self.diag.line(format_args!("[WARN] walk error: {err}"));
                    continue;
                }
            };

            let path = entry.path();
            if entry.file_type().is_dir() {
                if entry.depth() > 0 && self.excluded.contains(&path) {
                    self.diag.line(format_args!(
                        "[SKIP] excluded mount: {}",
                        path.display()
                    ));
                } else {
                    self.diag.line(format_args!("[SCAN] dir: {}", path.display()));
                }
            } else {
                match probe(&path, &self.excluded) {
                    Eligibility::Eligible => run.submit(path)?,
                    other => tracing::trace!(path = %path.display(), ?other, "not submitted"),
                }
            }

            run.heartbeat();
        }
        Ok(())
    }
}

/// State owned by the coordinator for the duration of one sweep.
struct Run<'a, W: Write> {
    config: &'a SweepConfig,
    diag: &'a DiagnosticLog,
    pool: WorkerPool,
    sink: &'a mut ResultSink<W>,
    reporter: ProgressReporter,
    inflight: HashMap<TaskId, PathBuf>,
    next_id: u64,
    since_drain: usize,
    peak_inflight: usize,
    walk_errors: u64,
}

impl<W: Write> Run<'_, W> {
    fn submit(&mut self, path: PathBuf) -> Result<(), SweepError> {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;

        self.inflight.insert(id, path.clone());
        self.pool.submit(Task::new(id, path))?;
        self.sink.mark_submitted();
        self.since_drain += 1;
        self.peak_inflight = self.peak_inflight.max(self.inflight.len());

        let submitted = self.sink.counters().submitted;
        if submitted % self.config.submit_trace_every.max(1) == 0 {
            self.diag.line(format_args!(
                "[INFO] submitted {submitted} files; inflight={}",
                self.inflight.len()
            ));
        }

        let batch = self.config.submit_batch.max(1);
        if self.since_drain >= batch || self.inflight.len() >= batch {
            let count = self.inflight.len() - self.inflight.len() / 2;
            self.diag.line(format_args!(
                "[INFO] submitted {submitted}; draining {count} of {} in flight",
                self.inflight.len()
            ));
            self.drain(count)?;
            self.since_drain = 0;
        }
        Ok(())
    }

    /// Wait for `count` completions, in completion order.
    fn drain(&mut self, count: usize) -> Result<(), SweepError> {
        let mut drained = 0;
        while drained < count && !self.inflight.is_empty() {
            let Completion { id, outcome } = self.pool.recv()?;
            let Some(path) = self.inflight.remove(&id) else {
                tracing::warn!(task = %id, "completion for a task not in flight, ignored");
                continue;
            };
            self.sink.record(&TaskResult { id, path, outcome })?;
            drained += 1;
            self.reporter
                .on_recorded(self.sink.counters(), self.inflight.len());
        }
        Ok(())
    }

    fn heartbeat(&mut self) {
        self.reporter
            .maybe_heartbeat(self.sink.counters(), self.inflight.len());
    }

    fn finish(mut self, root: PathBuf, excluded: &ExcludedMounts) -> Result<RunReport, SweepError> {
        self.reporter
            .drain_started(self.sink.counters(), self.inflight.len());
        self.diag.line(format_args!(
            "[INFO] submission complete. draining remaining {} tasks",
            self.inflight.len()
        ));
        let remaining = self.inflight.len();
        if let Err(err) = self.drain(remaining).and_then(|()| self.sink.flush()) {
            return Err(self.abort(err));
        }

        let worker_restarts = self.pool.restarts();
        self.pool.shutdown();

        let counters = *self.sink.counters();
        self.reporter.finished(&counters);
        self.diag.line(format_args!(
            "[DONE] submitted={} ok={} errors={}",
            counters.submitted,
            counters.succeeded(),
            counters.errors
        ));

        Ok(RunReport {
            root,
            counters,
            peak_inflight: self.peak_inflight,
            worker_restarts,
            walk_errors: self.walk_errors,
            excluded_mounts: excluded.mounts().to_vec(),
            elapsed: self.reporter.elapsed(),
        })
    }

    /// Tear the pool down after a failure, returning the error unchanged.
    fn abort(self, err: SweepError) -> SweepError {
        let counters = *self.sink.counters();
        let discarded = self.pool.abort(ABORT_GRACE);
        tracing::warn!(%err, discarded, "sweep aborted");
        self.diag.line(format_args!(
            "[ERROR] sweep aborted after {} of {} results, {discarded} queued tasks discarded: {err}",
            counters.done, counters.submitted
        ));
        err
    }
}
