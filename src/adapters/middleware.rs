use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Log start/end of a request including latency at `debug`. The `TraceLayer`
/// span already reports every request at `info`.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    tracing::debug!("Started processing {} {} {:?}", method, uri, version);

    let response = next.run(req).await;
    let duration = start.elapsed();

    tracing::debug!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        latency_ms = duration.as_millis() as u64,
        "Completed {} {} {:?} - {} in {:?}",
        method,
        uri,
        version,
        response.status(),
        duration
    );

    response
}
