use crate::interval::FlushInterval;
use crate::sink::BufferedSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Longest a polling scheduler waits without an append notification before it
/// rechecks the buffer.
pub const POLL_IDLE: Duration = Duration::from_millis(5);

/// When the background task flushes a [`BufferedSink`]. Chosen once at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStrategy {
    /// Flush on every tick of a fixed period.
    Ticker(Duration),
    /// Flush as soon as the buffer is non-empty.
    Poll,
}

impl From<&FlushInterval> for FlushStrategy {
    fn from(interval: &FlushInterval) -> Self {
        match interval.period() {
            Some(period) => FlushStrategy::Ticker(period),
            None => FlushStrategy::Poll,
        }
    }
}

/// Spawn the flush loop for `sink` onto the current Tokio runtime.
///
/// The task runs until `cancel` fires, then flushes one last time, closes
/// the sink's destination and exits.
pub fn spawn(
    sink: Arc<BufferedSink>,
    strategy: FlushStrategy,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(sink, strategy, cancel))
}

/// The flush loop itself. See [`spawn`].
pub async fn run(sink: Arc<BufferedSink>, strategy: FlushStrategy, cancel: CancellationToken) {
    debug!(?strategy, "access log scheduler started");

    match strategy {
        FlushStrategy::Ticker(period) => run_ticker(&sink, period, &cancel).await,
        FlushStrategy::Poll => run_poll(&sink, &cancel).await,
    }

    flush(&sink).await;
    match sink.close().await {
        Ok(()) => {}
        Err(e) if e.is_closed() => debug!("access log destination was closed before shutdown"),
        Err(e) => error!(error = %e, "failed to close access log destination"),
    }
    debug!("access log scheduler stopped");
}

async fn run_ticker(sink: &BufferedSink, period: Duration, cancel: &CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => flush(sink).await,
        }
    }
}

async fn run_poll(sink: &BufferedSink, cancel: &CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sink.appended() => {}
            _ = sleep(POLL_IDLE) => {}
        }
        if !sink.is_empty() {
            flush(sink).await;
        }
    }
}

async fn flush(sink: &BufferedSink) {
    if let Err(e) = sink.flush().await {
        warn!(error = %e, "access log flush failed");
    }
}
