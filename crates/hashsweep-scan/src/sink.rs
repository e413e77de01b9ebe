//! Result recording.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use hashsweep_core::{
    Classifier, DEFAULT_FLUSH_EVERY, OutputRecord, RunCounters, SweepConfig, SweepError,
    TaskOutcome, TaskResult,
};

/// Consumes drained results, classifies digests and appends output records.
///
/// Owns the run counters and the output writer; only the coordinating
/// thread touches it.
pub struct ResultSink<W: Write> {
    writer: W,
    target: PathBuf,
    classifier: Box<dyn Classifier>,
    counters: RunCounters,
    flush_every: u64,
}

impl ResultSink<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed.
    pub fn open_append(path: &Path, classifier: Box<dyn Classifier>) -> Result<Self, SweepError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SweepError::io(path, e))?;
        Ok(Self::new(BufWriter::new(file), path, classifier))
    }

    /// Open the configured output with the configured flush cadence.
    pub fn from_config(config: &SweepConfig, classifier: Box<dyn Classifier>) -> Result<Self, SweepError> {
        Ok(Self::open_append(&config.output, classifier)?.with_flush_every(config.flush_every))
    }
}

impl<W: Write> ResultSink<W> {
    /// Record into an arbitrary writer; `target` is only used in errors.
    pub fn new(writer: W, target: impl Into<PathBuf>, classifier: Box<dyn Classifier>) -> Self {
        Self {
            writer,
            target: target.into(),
            classifier,
            counters: RunCounters::new(),
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }

    /// Flush after this many drained results.
    pub fn with_flush_every(mut self, flush_every: u64) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Count a task handed to the pool.
    pub fn mark_submitted(&mut self) {
        self.counters.submitted += 1;
    }

    /// Record one drained result.
    pub fn record(&mut self, result: &TaskResult) -> Result<(), SweepError> {
        match &result.outcome {
            TaskOutcome::Digest { digest, bytes } => {
                let verdict = self.classifier.classify(&digest.to_hex());
                let record = OutputRecord::new(*digest, verdict);
                writeln!(self.writer, "{record}").map_err(|e| SweepError::io(&self.target, e))?;
                self.counters.bytes_hashed += bytes;
            }
            TaskOutcome::Skipped(_) => self.counters.skipped += 1,
            TaskOutcome::Failed(_) => {}
        }
        if result.outcome.is_error() {
            self.counters.errors += 1;
        }
        self.counters.done += 1;

        if self.counters.done % self.flush_every == 0 {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SweepError> {
        self.writer
            .flush()
            .map_err(|e| SweepError::io(&self.target, e))
    }

    /// Flush and hand back the counters and writer.
    pub fn finish(mut self) -> Result<(RunCounters, W), SweepError> {
        self.flush()?;
        Ok((self.counters, self.writer))
    }
}
