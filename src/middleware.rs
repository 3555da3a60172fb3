//! Tower middleware that records one access log line per request.
//!
//! ```no_run
//! use buffered_access_log::config::Config;
//! use buffered_access_log::middleware::RequestLogger;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), buffered_access_log::error::SinkError> {
//! let cancel = CancellationToken::new();
//! let handler = tower::service_fn(|_req: http::Request<String>| async {
//!     Ok::<_, std::convert::Infallible>(http::Response::new(String::new()))
//! });
//! let logged = RequestLogger::new(cancel.clone(), handler, &Config::new("access.log", "1s"), "api").await?;
//! // ... serve requests through `logged` ...
//! cancel.cancel();
//! # drop(logged);
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::SinkError;
use crate::interval::FlushInterval;
use crate::record::AccessRecord;
use crate::scheduler::{self, FlushStrategy};
use crate::sink::BufferedSink;
use chrono::{DateTime, FixedOffset, Local};
use http::{header, Request};
use std::future::Future;
use std::mem;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Peer address of the connection a request arrived on.
///
/// The server inserts this into the request extensions; requests without it
/// are logged with `-` as the client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// State shared by every clone of one middleware instance.
struct AccessLog {
    name: String,
    sink: Arc<BufferedSink>,
    cancel: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

/// [`Layer`] producing [`RequestLogger`] services that share one sink and
/// one flush scheduler.
#[derive(Clone)]
pub struct RequestLoggerLayer {
    log: Arc<AccessLog>,
}

impl RequestLoggerLayer {
    /// Open the configured destination and start the flush scheduler.
    ///
    /// Fails with [`SinkError::Open`] when the destination cannot be opened,
    /// in which case no scheduler is started. The scheduler stops, flushes
    /// and closes the destination once `cancel` fires.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn new(
        cancel: CancellationToken,
        config: &Config,
        name: &str,
    ) -> Result<Self, SinkError> {
        let sink = BufferedSink::open(&config.path).await?;
        let interval = config.flush_interval();
        if let FlushInterval::Invalid(e) = &interval {
            warn!(
                instance = name,
                interval = %config.interval,
                error = %e,
                "invalid access log interval, flushing whenever lines are buffered"
            );
        }
        Ok(Self::with_sink(Arc::new(sink), &interval, cancel, name))
    }

    /// Build around an existing sink, e.g. one writing to a
    /// [`MemoryDestination`](crate::memory_destination::MemoryDestination).
    pub fn with_sink(
        sink: Arc<BufferedSink>,
        interval: &FlushInterval,
        cancel: CancellationToken,
        name: &str,
    ) -> Self {
        let strategy = FlushStrategy::from(interval);
        let handle = scheduler::spawn(Arc::clone(&sink), strategy, cancel.clone());
        debug!(instance = name, %interval, "access log middleware started");

        Self {
            log: Arc::new(AccessLog {
                name: name.to_string(),
                sink,
                cancel,
                scheduler: Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.log.name
    }

    pub fn sink(&self) -> &Arc<BufferedSink> {
        &self.log.sink
    }

    /// Flush buffered lines now instead of waiting for the scheduler.
    pub async fn flush(&self) -> Result<usize, SinkError> {
        self.log.sink.flush().await
    }

    /// Release the destination directly, without stopping the scheduler.
    pub async fn close(&self) -> Result<(), SinkError> {
        self.log.sink.close().await
    }

    /// Cancel the scheduler and wait for its final flush and close.
    ///
    /// Only the first call waits; later calls return immediately.
    pub async fn shutdown(&self) {
        self.log.cancel.cancel();
        let handle = self
            .log
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(instance = %self.log.name, error = %e, "access log scheduler task failed");
            }
        }
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLogger<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogger {
            inner,
            layer: self.clone(),
        }
    }
}

/// Service wrapper that appends an access log line after the inner service
/// completes. Requests and responses pass through untouched.
#[derive(Clone)]
pub struct RequestLogger<S> {
    inner: S,
    layer: RequestLoggerLayer,
}

impl<S> RequestLogger<S> {
    /// Wrap `inner`, opening the configured destination and starting the
    /// flush scheduler. See [`RequestLoggerLayer::new`].
    pub async fn new(
        cancel: CancellationToken,
        inner: S,
        config: &Config,
        name: &str,
    ) -> Result<Self, SinkError> {
        let layer = RequestLoggerLayer::new(cancel, config, name).await?;
        Ok(layer.layer(inner))
    }

    pub fn layer(&self) -> &RequestLoggerLayer {
        &self.layer
    }

    pub fn sink(&self) -> &Arc<BufferedSink> {
        self.layer.sink()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub async fn flush(&self) -> Result<usize, SinkError> {
        self.layer.flush().await
    }

    pub async fn close(&self) -> Result<(), SinkError> {
        self.layer.close().await
    }

    pub async fn shutdown(&self) {
        self.layer.shutdown().await
    }
}

impl<S, B> Service<Request<B>> for RequestLogger<S>
where
    S: Service<Request<B>> + 'static,
    S::Future: Send + 'static,
    B: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<S::Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let entry = PendingEntry::start(&req, Arc::clone(self.layer.sink()));
        let response = self.inner.call(req);

        Box::pin(async move {
            let result = response.await;
            drop(entry);
            result
        })
    }
}

/// Everything known about a request when it starts. Appends the finished
/// line to the sink when dropped, which also covers a downstream future that
/// panics or is abandoned mid-flight.
struct PendingEntry {
    sink: Arc<BufferedSink>,
    started: Instant,
    timestamp: DateTime<FixedOffset>,
    client_addr: String,
    method: String,
    host: String,
    path: String,
}

impl PendingEntry {
    fn start<B>(req: &Request<B>, sink: Arc<BufferedSink>) -> Self {
        Self {
            sink,
            started: Instant::now(),
            timestamp: DateTime::<FixedOffset>::from(Local::now()),
            client_addr: client_addr(req),
            method: req.method().to_string(),
            host: host(req),
            path: req.uri().path().to_string(),
        }
    }
}

impl Drop for PendingEntry {
    fn drop(&mut self) {
        let record = AccessRecord {
            client_addr: mem::take(&mut self.client_addr),
            timestamp: self.timestamp,
            method: mem::take(&mut self.method),
            host: mem::take(&mut self.host),
            path: mem::take(&mut self.path),
            elapsed: self.started.elapsed(),
        };
        self.sink.append_record(&record);
    }
}

fn client_addr<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<ClientAddr>()
        .map(|ClientAddr(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Host as the client addressed it: the absolute-form authority if present,
/// otherwise the `Host` header.
fn host<B>(req: &Request<B>) -> String {
    if let Some(authority) = req.uri().authority() {
        let authority = authority.as_str();
        // drop any userinfo
        return authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host)
            .to_string();
    }
    req.headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
