use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use http::{Request, Response};
use tokio_util::sync::CancellationToken;
use tower::{service_fn, Layer, ServiceExt};

use buffered_access_log::init::init_diagnostics;
use buffered_access_log::interval::FlushInterval;
use buffered_access_log::memory_destination::MemoryDestination;
use buffered_access_log::{BufferedSink, ClientAddr, RequestLoggerLayer};

/// Push requests through the middleware with an in-memory destination to
/// measure per-request overhead. Set `REQUEST_LOAD_INTERVAL` to compare
/// ticker and polling modes (e.g. `100ms` vs `invalid`).
#[tokio::main]
async fn main() {
    if let Err(e) = init_diagnostics() {
        eprintln!("diagnostics disabled: {e}");
    }

    let interval = std::env::var("REQUEST_LOAD_INTERVAL").unwrap_or_else(|_| "100ms".to_string());
    let out = MemoryDestination::new();
    let sink = Arc::new(BufferedSink::new(out.clone()));
    let cancel = CancellationToken::new();
    let layer = RequestLoggerLayer::with_sink(
        Arc::clone(&sink),
        &FlushInterval::parse(&interval),
        cancel.clone(),
        "load",
    );

    let service = layer.layer(service_fn(|_req: Request<()>| async {
        Ok::<_, Infallible>(Response::new(()))
    }));

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        let mut req = Request::builder()
            .uri(format!("http://example.com/items/{}", i % 100))
            .body(())
            .expect("valid request");
        req.extensions_mut()
            .insert(ClientAddr(([10, 0, 0, 1], 40_000 + (i % 1000) as u16).into()));
        let _ = service.clone().oneshot(req).await;
    }

    let elapsed = start.elapsed();
    println!("interval {:?}: served {} requests in {:?} (~{:.0} req/s)",
        interval,
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    layer.shutdown().await;
    println!("written {} lines, dropped {}",
        out.len(),
        sink.stats().dropped_lines.load(Ordering::Relaxed),
    );
}
