use crate::destination::{Destination, FileDestination, StdoutDestination};
use crate::error::SinkError;
use crate::record::AccessRecord;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// In-memory buffer of access log lines in front of a [`Destination`].
///
/// Request handlers call [`append`](Self::append), which only pushes onto
/// the pending buffer and never touches the destination. A background
/// scheduler calls [`flush`](Self::flush) to move the whole batch out in one
/// go, which keeps write syscalls proportional to flush ticks rather than to
/// request volume.
///
/// Two locks are involved:
/// - the pending buffer sits behind a short-lived `std` mutex held only for a
///   push or a swap;
/// - the destination sits behind an async mutex that serializes `flush` and
///   `close`.
///
/// `flush` swaps the buffer out while holding the destination lock, so lines
/// appended during a write land in the next batch and nothing is written
/// twice.
pub struct BufferedSink {
    pending: Mutex<Vec<String>>,
    destination: tokio::sync::Mutex<Box<dyn Destination>>,
    closed: AtomicBool,
    appended: Notify,
    stats: SinkStats,
}

/// Counters maintained by a [`BufferedSink`].
#[derive(Debug, Default)]
pub struct SinkStats {
    /// Lines accepted by `append`.
    pub appended_lines: AtomicU64,
    /// Lines successfully handed to the destination.
    pub written_lines: AtomicU64,
    /// Lines discarded because the write failed or the sink was closed.
    pub dropped_lines: AtomicU64,
}

impl BufferedSink {
    /// Adopt an already opened destination.
    pub fn new(destination: impl Destination + 'static) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            destination: tokio::sync::Mutex::new(Box::new(destination)),
            closed: AtomicBool::new(false),
            appended: Notify::new(),
            stats: SinkStats::default(),
        }
    }

    /// Open the destination named by `path`: an empty path means standard
    /// output, anything else is opened as an append-only file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            debug!("access log writing to stdout");
            return Ok(Self::new(StdoutDestination::new()));
        }

        let file = FileDestination::open(path).await.map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "access log file opened");
        Ok(Self::new(file))
    }

    /// Queue one line for the next flush.
    pub fn append(&self, line: impl Into<String>) {
        self.lock_pending().push(line.into());
        self.stats.appended_lines.fetch_add(1, Ordering::Relaxed);
        self.appended.notify_one();
    }

    pub fn append_record(&self, record: &AccessRecord) {
        self.append(record.to_string());
    }

    /// Write every pending line to the destination, in append order, and
    /// leave the buffer empty.
    ///
    /// Returns the number of lines written. A line whose write fails is
    /// dropped and the rest of the batch is still attempted; such failures
    /// are logged, never returned. Flushing a non-empty buffer after
    /// [`close`](Self::close) discards it and returns [`SinkError::Closed`].
    pub async fn flush(&self) -> Result<usize, SinkError> {
        let mut destination = self.destination.lock().await;
        let batch = std::mem::take(&mut *self.lock_pending());
        if batch.is_empty() {
            return Ok(0);
        }

        if self.closed.load(Ordering::Acquire) {
            self.stats
                .dropped_lines
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            debug!(lines = batch.len(), "discarding access log lines appended after close");
            return Err(SinkError::Closed);
        }

        let mut written = 0usize;
        let mut last_error = None;
        for line in &batch {
            match destination.write_line(line).await {
                Ok(()) => written += 1,
                Err(e) => last_error = Some(e),
            }
        }
        if let Err(e) = destination.flush().await {
            last_error = Some(e);
        }

        let failed = batch.len() - written;
        self.stats
            .written_lines
            .fetch_add(written as u64, Ordering::Relaxed);
        self.stats
            .dropped_lines
            .fetch_add(failed as u64, Ordering::Relaxed);
        if let Some(e) = last_error {
            warn!(error = %e, failed, written, "access log write failed, lines dropped");
        }

        Ok(written)
    }

    /// Release the destination. Only the first call can succeed.
    pub async fn close(&self) -> Result<(), SinkError> {
        let mut destination = self.destination.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SinkError::Closed);
        }
        destination.close().await?;
        debug!("access log destination closed");
        Ok(())
    }

    /// Number of lines waiting for the next flush.
    pub fn len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_pending().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> &SinkStats {
        &self.stats
    }

    /// Resolves after the next `append`, or immediately if one happened
    /// since the last wait.
    pub(crate) async fn appended(&self) {
        self.appended.notified().await;
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<String>> {
        // A push or a swap cannot leave the Vec half-updated.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
