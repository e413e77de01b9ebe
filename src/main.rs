//! hashsweep - Bulk file hashing that skips pseudo-filesystem mounts.
//!
//! Usage:
//!   hashsweep [ROOT] [OUTPUT]       Hash every regular file under ROOT
//!   hashsweep / hashes.txt --json   Print the run report as JSON
//!   hashsweep --help                Show help

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use hashsweep_core::{DEFAULT_DEBUG_LOG, DEFAULT_OUTPUT, RunReport, SweepConfig};
use hashsweep_scan::{DiagnosticLog, PlaceholderClassifier, ResultSink, Scheduler};

#[derive(Parser)]
#[command(
    name = "hashsweep",
    version,
    about = "Hash every regular file under a directory",
    long_about = "hashsweep walks a directory tree, skips pseudo-filesystem mounts \
                  such as /proc and /sys, and appends one BLAKE3 digest line per \
                  regular file to OUTPUT."
)]
struct Cli {
    /// Directory to sweep
    #[arg(default_value = "/")]
    root: PathBuf,

    /// Output file, appended to
    #[arg(default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Worker threads (0 = max(4, cores))
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Submissions between batch drains
    #[arg(short, long, default_value = "5000")]
    batch: usize,

    /// Read size while hashing, in bytes
    #[arg(long, default_value = "1048576")]
    chunk_size: usize,

    /// Flush the output after this many results
    #[arg(long, default_value = "200")]
    flush_every: u64,

    /// Abandon a worker silent for this many seconds (0 disables)
    #[arg(long, default_value = "120")]
    stall_timeout: u64,

    /// Read mount points from this file instead of /proc
    #[arg(long)]
    mount_table: Option<PathBuf>,

    /// Fail when the mount table is unreadable or malformed
    #[arg(long)]
    strict_mounts: bool,

    /// Diagnostic log file, overwritten on start
    #[arg(long, default_value = DEFAULT_DEBUG_LOG)]
    debug_log: PathBuf,

    /// Do not write a diagnostic log
    #[arg(long, conflicts_with = "debug_log")]
    no_debug_log: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Suppress progress lines
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn to_config(&self) -> Result<SweepConfig> {
        let stall_timeout = match self.stall_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let debug_log = (!self.no_debug_log).then(|| self.debug_log.clone());

        SweepConfig::builder()
            .root(self.root.clone())
            .output(self.output.clone())
            .debug_log(debug_log)
            .workers(self.workers)
            .submit_batch(self.batch)
            .chunk_size(self.chunk_size)
            .flush_every(self.flush_every)
            .stall_timeout(stall_timeout)
            .mount_table(self.mount_table.clone())
            .strict_mount_table(self.strict_mounts)
            .build()
            .wrap_err("Invalid configuration")
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();
    let config = cli.to_config()?;

    let diag = match &config.debug_log {
        Some(path) => DiagnosticLog::create(path)
            .wrap_err_with(|| format!("Failed to create diagnostic log {}", path.display()))?,
        None => DiagnosticLog::disabled(),
    };

    let scheduler = Scheduler::new(config.clone())
        .wrap_err("Failed to load mount table")?
        .with_diagnostics(diag);

    if !cli.quiet {
        eprintln!(
            "[INFO] sweeping {} with {} workers, {} mounts excluded",
            config.root.display(),
            config.effective_workers(),
            scheduler.excluded().len()
        );
    }

    let printer = (!cli.quiet).then(|| {
        let mut progress_rx = scheduler.subscribe();
        thread::spawn(move || {
            loop {
                match progress_rx.blocking_recv() {
                    Ok(progress) => eprintln!("{progress}"),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let mut sink = ResultSink::from_config(&config, Box::new(PlaceholderClassifier))
        .wrap_err_with(|| format!("Failed to open output {}", config.output.display()))?;

    let report = scheduler
        .run(&mut sink)
        .wrap_err_with(|| format!("Sweep of {} failed", config.root.display()))?;
    sink.finish().wrap_err("Failed to flush output")?;

    // Closes the progress channel.
    drop(scheduler);
    if let Some(printer) = printer {
        let _ = printer.join();
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, &config.output, config.debug_log.as_deref(), cli.quiet);
    }

    Ok(())
}

/// Install the stderr subscriber, filtered by `HASHSWEEP_LOG`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("HASHSWEEP_LOG").unwrap_or_else(|_| EnvFilter::new("hashsweep=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn print_summary(report: &RunReport, output: &Path, debug_log: Option<&Path>, quiet: bool) {
    let counters = &report.counters;
    if quiet {
        println!(
            "[DONE] submitted={} ok={} errors={}",
            counters.submitted,
            counters.succeeded(),
            counters.errors
        );
    }
    println!(
        "[INFO] hashed {} in {:.2}s ({} skipped, {} walk errors, {} worker restarts)",
        format_size(counters.bytes_hashed),
        report.elapsed.as_secs_f64(),
        counters.skipped,
        report.walk_errors,
        report.worker_restarts
    );
    println!("[INFO] Hashes: {}", output.display());
    if let Some(path) = debug_log {
        println!("[INFO] Detailed logs: {}", path.display());
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
