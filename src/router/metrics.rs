//! Per-request observation for route metrics.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::{Response, StatusCode};

/// What one dispatch produced.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RouteMetrics {
    pub written: usize,
    pub duration: Duration,
    pub code: StatusCode,
}

/// Await `dispatch` and measure it. The response is returned untouched.
pub(crate) async fn capture<F>(dispatch: F) -> (Response, RouteMetrics)
where
    F: Future<Output = Response>,
{
    let start = Instant::now();
    let response = dispatch.await;
    let metrics = RouteMetrics {
        written: response.body_len(),
        duration: start.elapsed(),
        code: response.status(),
    };
    (response, metrics)
}
