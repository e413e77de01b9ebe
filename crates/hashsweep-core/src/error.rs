//! Error types for sweep operations.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors on the coordinating side of a sweep.
///
/// Per-file problems never surface here; they become failed task outcomes.
#[derive(Debug, Error)]
pub enum SweepError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Mount table could not be read or parsed (strict mode only).
    #[error("Mount table {path}: {message}")]
    MountTable { path: PathBuf, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Worker pool could not be started or lost its result channel.
    #[error("Worker pool failure: {message}")]
    WorkerPool { message: String },
}

impl SweepError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a mount table error.
    pub fn mount_table(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MountTable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a worker pool error.
    pub fn worker_pool(message: impl Into<String>) -> Self {
        Self::WorkerPool {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_error_io() {
        let err = SweepError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, SweepError::PermissionDenied { .. }));

        let err = SweepError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, SweepError::NotFound { .. }));

        let err = SweepError::io("/test/path", std::io::Error::other("disk on fire"));
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_mount_table_message() {
        let err = SweepError::mount_table("/proc/self/mountinfo", "line 3: missing separator");
        assert_eq!(
            err.to_string(),
            "Mount table /proc/self/mountinfo: line 3: missing separator"
        );
    }
}
