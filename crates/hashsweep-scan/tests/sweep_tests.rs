//! End-to-end sweeps over temporary trees.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use hashsweep_scan::{
    DiagnosticLog, DigestWorker, ExcludedMounts, Job, PlaceholderClassifier, ProgressKind,
    ResultSink, RunReport, Scheduler, SweepConfig, SweepError, Task, TaskOutcome, WorkerContext,
};

fn config(root: &Path) -> SweepConfig {
    SweepConfig::builder()
        .root(root)
        .output("unused")
        .workers(2usize)
        .build()
        .unwrap()
}

/// Run a sweep into a file outside the swept tree, returning the report and
/// the output lines.
fn sweep(scheduler: &Scheduler) -> (RunReport, Vec<String>) {
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("hashes.txt");
    let mut sink = ResultSink::open_append(&output, Box::new(PlaceholderClassifier)).unwrap();
    let report = scheduler.run(&mut sink).unwrap();
    sink.finish().unwrap();

    let text = fs::read_to_string(&output).unwrap();
    (report, text.lines().map(str::to_string).collect())
}

fn hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[test]
fn test_small_tree_with_symlink() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("a.txt"), "hello").unwrap();
    fs::write(root.join("b.txt"), "hello").unwrap();
    std::os::unix::fs::symlink(root.join("a.txt"), root.join("link")).unwrap();
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/c.txt"), "world").unwrap();

    let scheduler = Scheduler::with_exclusions(config(root), ExcludedMounts::empty());
    let (report, lines) = sweep(&scheduler);

    assert_eq!(report.counters.submitted, 3);
    assert_eq!(report.counters.done, 3);
    assert_eq!(report.counters.errors, 0);
    assert_eq!(report.counters.bytes_hashed, 15);
    assert_eq!(lines.len(), 3);

    let hello = format!("{} FALSE DUMMY_REASON", hex(b"hello"));
    let world = format!("{} FALSE DUMMY_REASON", hex(b"world"));
    assert_eq!(lines.iter().filter(|l| **l == hello).count(), 2);
    assert_eq!(lines.iter().filter(|l| **l == world).count(), 1);
}

#[test]
fn test_zero_byte_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("empty"), "").unwrap();

    let scheduler = Scheduler::with_exclusions(config(temp.path()), ExcludedMounts::empty());
    let (report, lines) = sweep(&scheduler);

    assert_eq!(report.counters.errors, 0);
    assert_eq!(lines, vec![format!("{} FALSE DUMMY_REASON", hex(b""))]);
}

#[test]
fn test_mount_table_file_excludes_subtree() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    fs::create_dir_all(root.join("fakeproc/1")).unwrap();
    fs::create_dir_all(root.join("my mount")).unwrap();
    fs::write(root.join("fakeproc/1/status"), "pseudo").unwrap();
    fs::write(root.join("my mount/x"), "pseudo").unwrap();
    fs::write(root.join("real.txt"), "real").unwrap();

    let escaped = format!("{}/my\\040mount", root.display());
    let table = temp.path().join("mounts");
    fs::write(
        &table,
        format!(
            "proc {}/fakeproc proc rw 0 0\ntmpfs {escaped} tmpfs rw 0 0\n/dev/sda1 / ext4 rw 0 0\n",
            root.display()
        ),
    )
    .unwrap();

    let mut config = config(&root);
    config.mount_table = Some(table);
    let scheduler = Scheduler::new(config).unwrap();
    assert_eq!(scheduler.excluded().len(), 2);

    let (report, lines) = sweep(&scheduler);
    assert_eq!(report.counters.submitted, 1);
    assert_eq!(lines, vec![format!("{} FALSE DUMMY_REASON", hex(b"real"))]);
    assert_eq!(report.excluded_mounts.len(), 2);
}

#[test]
fn test_special_files_never_submitted() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("regular"), "data").unwrap();
    let _listener = std::os::unix::net::UnixListener::bind(temp.path().join("sock")).unwrap();
    std::os::unix::fs::symlink("/nonexistent", temp.path().join("dangling")).unwrap();

    let scheduler = Scheduler::with_exclusions(config(temp.path()), ExcludedMounts::empty());
    let (report, lines) = sweep(&scheduler);

    assert_eq!(report.counters.submitted, 1);
    assert_eq!(report.counters.errors, 0);
    assert_eq!(lines.len(), 1);
}

#[test]
fn test_unreadable_file_counts_as_error() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let locked = temp.path().join("locked");
    fs::write(&locked, "secret").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores permission bits.
    let readable_anyway = fs::File::open(&locked).is_ok();

    let scheduler = Scheduler::with_exclusions(config(temp.path()), ExcludedMounts::empty());
    let (report, lines) = sweep(&scheduler);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(report.counters.submitted, 1);
    assert_eq!(report.counters.done, 1);
    if readable_anyway {
        assert_eq!(report.counters.errors, 0);
        assert_eq!(lines.len(), 1);
    } else {
        assert_eq!(report.counters.errors, 1);
        assert!(lines.is_empty());
    }
}

#[test]
fn test_batch_bound_holds_on_large_tree() {
    let temp = TempDir::new().unwrap();
    for d in 0..5 {
        let dir = temp.path().join(format!("d{d}"));
        fs::create_dir(&dir).unwrap();
        for f in 0..40 {
            fs::write(dir.join(format!("f{f}")), format!("{d}-{f}")).unwrap();
        }
    }

    let mut config = config(temp.path());
    config.submit_batch = 16;
    config.workers = 3;
    let scheduler = Scheduler::with_exclusions(config, ExcludedMounts::empty());
    let (report, lines) = sweep(&scheduler);

    assert_eq!(report.counters.submitted, 200);
    assert_eq!(report.counters.done, 200);
    assert_eq!(lines.len(), 200);
    assert!(report.peak_inflight <= 16 + 3);
}

#[test]
fn test_panicking_job_fails_one_task() {
    let temp = TempDir::new().unwrap();
    for name in ["one", "boom", "three", "four"] {
        fs::write(temp.path().join(name), name).unwrap();
    }

    let inner = DigestWorker::new(Arc::new(ExcludedMounts::empty()), 64 * 1024);
    let job: Job = Arc::new(move |task: &Task, ctx: &WorkerContext| {
        if task.path.ends_with("boom") {
            panic!("decoder exploded");
        }
        inner.hash_one(task, ctx)
    });

    let scheduler =
        Scheduler::with_exclusions(config(temp.path()), ExcludedMounts::empty()).with_job(job);
    let (report, lines) = sweep(&scheduler);

    assert_eq!(report.counters.submitted, 4);
    assert_eq!(report.counters.done, 4);
    assert_eq!(report.counters.errors, 1);
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_stalled_job_is_abandoned() {
    let temp = TempDir::new().unwrap();
    for name in ["a", "b", "slow", "c"] {
        fs::write(temp.path().join(name), name).unwrap();
    }

    let job: Job = Arc::new(|task: &Task, _ctx: &WorkerContext| {
        if task.path.ends_with("slow") {
            thread::sleep(Duration::from_secs(3));
        }
        TaskOutcome::Failed("not hashed".to_string())
    });

    let mut config = config(temp.path());
    config.stall_timeout = Some(Duration::from_millis(300));
    let scheduler = Scheduler::with_exclusions(config, ExcludedMounts::empty()).with_job(job);
    let (report, _) = sweep(&scheduler);

    assert_eq!(report.counters.done, 4);
    assert_eq!(report.counters.errors, 4);
    assert!(report.worker_restarts >= 1);
}

#[test]
fn test_diagnostic_log_and_milestones() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    fs::create_dir_all(root.join("sub")).unwrap();
    for i in 0..6 {
        fs::write(root.join("sub").join(format!("f{i}")), format!("{i}")).unwrap();
    }
    let log_path = temp.path().join("debug_output.log");

    let mut config = config(&root);
    config.milestone_every = 2;
    let scheduler = Scheduler::with_exclusions(config, ExcludedMounts::empty())
        .with_diagnostics(DiagnosticLog::create(&log_path).unwrap());
    let mut progress_rx = scheduler.subscribe();

    let (report, _) = sweep(&scheduler);
    assert_eq!(report.counters.done, 6);

    let mut milestones = 0;
    let mut finished = false;
    while let Ok(progress) = progress_rx.try_recv() {
        match progress.kind {
            ProgressKind::Milestone => milestones += 1,
            ProgressKind::Finished => finished = true,
            _ => {}
        }
    }
    assert_eq!(milestones, 3);
    assert!(finished);

    let log = fs::read_to_string(&log_path).unwrap();
    let sub: PathBuf = root.join("sub");
    assert!(log.contains(&format!("[SCAN] dir: {}", sub.display())));
    assert!(log.contains("] START "));
    assert!(log.contains("[DONE] submitted=6 ok=6 errors=0"));
}

#[test]
fn test_file_vanishing_before_hash_counts_as_error() {
    let temp = TempDir::new().unwrap();
    for name in ["keep1", "gone", "keep2"] {
        fs::write(temp.path().join(name), name).unwrap();
    }

    let inner = DigestWorker::new(Arc::new(ExcludedMounts::empty()), 64 * 1024);
    let job: Job = Arc::new(move |task: &Task, ctx: &WorkerContext| {
        if task.path.ends_with("gone") {
            fs::remove_file(&task.path).unwrap();
        }
        inner.hash_one(task, ctx)
    });

    let scheduler =
        Scheduler::with_exclusions(config(temp.path()), ExcludedMounts::empty()).with_job(job);
    let (report, lines) = sweep(&scheduler);

    assert_eq!(report.counters.submitted, 3);
    assert_eq!(report.counters.done, report.counters.submitted);
    assert_eq!(report.counters.errors, 1);
    assert_eq!(lines.len(), 2);
    let gone = hex(b"gone");
    assert!(lines.iter().all(|line| !line.starts_with(&gone)));
}

struct BrokenOutput;

impl Write for BrokenOutput {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::other("disk full"))
    }
}

#[test]
fn test_failed_run_still_flushes_diagnostic_log() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("tree");
    fs::create_dir(&root).unwrap();
    for i in 0..3 {
        fs::write(root.join(format!("f{i}")), format!("{i}")).unwrap();
    }

    // Batch 1 fails while walking, the default batch fails in the final drain.
    for batch in [1usize, 5000] {
        let log_path = temp.path().join(format!("debug_{batch}.log"));
        let mut config = config(&root);
        config.submit_batch = batch;
        let scheduler = Scheduler::with_exclusions(config, ExcludedMounts::empty())
            .with_diagnostics(DiagnosticLog::create(&log_path).unwrap());
        let mut sink = ResultSink::new(BrokenOutput, "broken", Box::new(PlaceholderClassifier));

        let err = scheduler.run(&mut sink).unwrap_err();
        assert!(matches!(err, SweepError::Io { .. }));

        // The scheduler still holds a log handle, so nothing was flushed by drop.
        let log = fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("[START] root="), "batch {batch}: {log}");
        assert!(log.contains("[ERROR] sweep aborted"), "batch {batch}: {log}");
        assert!(log.contains("] START "), "batch {batch}: {log}");
        drop(scheduler);
    }
}
