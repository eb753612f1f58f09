//! Pieces shared by the gateway and proxy routers.

use axum::{extract::Request, middleware::Next, response::Response};
use std::{future::Future, io, time::Instant};
use tower_http::cors::{Any, CorsLayer};

/// Logs one line per request with its status and latency.
pub async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_server_error() {
        log::warn!("{method} {uri} -> {} in {:.2?}", status.as_u16(), start.elapsed());
    } else {
        log::info!("{method} {uri} -> {} in {:.2?}", status.as_u16(), start.elapsed());
    }
    response
}

/// Browsers may call either service from any origin.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Resolves once `signal` fires. If the signal cannot be installed the error
/// is logged and this never resolves, so the server keeps running.
pub async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => log::info!("Shutdown requested"),
        Err(e) => {
            log::error!("Cannot listen for Ctrl+C, serving until killed: {e}");
            std::future::pending::<()>().await;
        }
    }
}

/// Waits for Ctrl+C.
pub async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_resolves_shutdown() {
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            wait_for_shutdown(async { Ok(()) }),
        )
        .await;
        assert!(waited.is_ok());
    }

    #[tokio::test]
    async fn failed_signal_keeps_serving() {
        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            wait_for_shutdown(async { Err(io::Error::other("no signal handler")) }),
        )
        .await;
        assert!(waited.is_err());
    }
}
