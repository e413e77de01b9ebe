//! Streaming content digests.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use blake3::Hasher;

use hashsweep_core::{ContentDigest, DEFAULT_CHUNK_SIZE, Task, TaskOutcome};

use crate::mounts::ExcludedMounts;
use crate::pool::{Job, WorkerContext};
use crate::probe::probe;

/// Smallest read buffer handed to a file, so tiny files don't get a full chunk.
const MIN_BUFFER: usize = 8 * 1024;

/// Compute the BLAKE3 digest of a file, `None` on any I/O error.
pub fn hash_file(path: &Path) -> Option<ContentDigest> {
    hash_file_with(path, DEFAULT_CHUNK_SIZE, |_| {})
        .ok()
        .map(|(digest, _)| digest)
}

/// Hash a file in `chunk_size` reads, reporting the running byte count
/// after each chunk. Returns the digest and the number of bytes read.
pub fn hash_file_with(
    path: &Path,
    chunk_size: usize,
    mut on_chunk: impl FnMut(u64),
) -> io::Result<(ContentDigest, u64)> {
    let mut file = File::open(path)?;
    let size_hint = file.metadata().map(|m| m.len()).unwrap_or(0);
    let mut buffer = vec![0u8; buffer_len(size_hint, chunk_size)];

    let mut hasher = Hasher::new();
    let mut total = 0u64;
    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
        on_chunk(total);
    }

    Ok((ContentDigest::new(*hasher.finalize().as_bytes()), total))
}

fn buffer_len(size_hint: u64, chunk_size: usize) -> usize {
    let chunk_size = chunk_size.max(1);
    usize::try_from(size_hint)
        .unwrap_or(usize::MAX)
        .clamp(MIN_BUFFER.min(chunk_size), chunk_size)
}

/// Hashes one task inside a worker thread.
///
/// Eligibility is checked again here: the file may have changed between
/// discovery and the moment a worker picks it up.
#[derive(Debug, Clone)]
pub struct DigestWorker {
    excluded: Arc<ExcludedMounts>,
    chunk_size: usize,
}

impl DigestWorker {
    pub fn new(excluded: Arc<ExcludedMounts>, chunk_size: usize) -> Self {
        Self {
            excluded,
            chunk_size,
        }
    }

    /// Re-check, then hash one task.
    pub fn hash_one(&self, task: &Task, ctx: &WorkerContext) -> TaskOutcome {
        let diag = ctx.diag();
        let path = task.path.as_path();
        diag.line(format_args!("[WORKER {}] START {}", ctx.name(), path.display()));

        if let Some(reason) = probe(path, &self.excluded).skip_reason() {
            diag.line(format_args!(
                "[WORKER {}] SKIP ({reason}): {}",
                ctx.name(),
                path.display()
            ));
            return TaskOutcome::Skipped(reason);
        }

        diag.line(format_args!("[WORKER {}] OPENING: {}", ctx.name(), path.display()));
        match hash_file_with(path, self.chunk_size, |_| ctx.beat()) {
            Ok((digest, bytes)) => {
                diag.line(format_args!(
                    "[WORKER {}] DONE: {} read={bytes} bytes",
                    ctx.name(),
                    path.display()
                ));
                TaskOutcome::Digest { digest, bytes }
            }
            Err(err) => {
                diag.line(format_args!(
                    "[WORKER {}] ERROR {}: {err}",
                    ctx.name(),
                    path.display()
                ));
                tracing::debug!(path = %path.display(), %err, "hash failed");
                TaskOutcome::Failed(err.to_string())
            }
        }
    }

    /// Wrap this worker as a pool job.
    pub fn into_job(self) -> Job {
        Arc::new(move |task: &Task, ctx: &WorkerContext| self.hash_one(task, ctx))
    }
}
