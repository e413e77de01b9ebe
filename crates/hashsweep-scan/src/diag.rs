//! Diagnostic log handle.
//!
//! The diagnostic log is a plain text file receiving worker lifecycle lines
//! and directory trace lines. It is an explicit handle: the coordinator owns
//! one and each worker gets a clone. The file is flushed when the last clone
//! is dropped.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;

use hashsweep_core::SweepError;

struct Sink {
    writer: Box<dyn Write + Send>,
}

impl Drop for Sink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

/// Cloneable, thread-safe diagnostic log writer.
#[derive(Clone, Default)]
pub struct DiagnosticLog {
    sink: Option<Arc<Mutex<Sink>>>,
}

impl DiagnosticLog {
    /// A log that discards everything.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Create (truncating) a diagnostic log file.
    pub fn create(path: &Path) -> Result<Self, SweepError> {
        let file = File::create(path).map_err(|e| SweepError::io(path, e))?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }

    /// Log into an arbitrary writer.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Arc::new(Mutex::new(Sink {
                writer: Box::new(writer),
            }))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Append one timestamped line.
    pub fn line(&self, args: fmt::Arguments<'_>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut sink = sink.lock();
        if let Err(err) = writeln!(sink.writer, "{stamp} {args}") {
            tracing::debug!(%err, "diagnostic log write failed");
        }
    }

    pub fn flush(&self) -> io::Result<()> {
        match &self.sink {
            Some(sink) => sink.lock().writer.flush(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// In-memory writer whose contents stay readable after being handed off.
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

#[cfg(test)]
impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lines_are_timestamped() {
        let buffer = SharedBuffer::default();
        let log = DiagnosticLog::from_writer(buffer.clone());

        log.line(format_args!("[SCAN] dir: {}", "/tmp"));
        log.line(format_args!("[INFO] second"));

        let contents = buffer.contents();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" [SCAN] dir: /tmp"));
        assert!(lines[0].contains('T'));
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let log = DiagnosticLog::disabled();
        assert!(!log.is_enabled());
        log.line(format_args!("nothing"));
        assert!(log.flush().is_ok());
    }

    #[test]
    fn test_file_flushed_when_last_clone_drops() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("debug.log");

        let log = DiagnosticLog::create(&path).unwrap();
        let worker_copy = log.clone();
        worker_copy.line(format_args!("[WORKER w0] START /x"));
        drop(log);
        drop(worker_copy);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[WORKER w0] START /x"));
    }
}
