//! The web proxy: serves the browser UI and relays its calls to the gateway.

mod error;
pub mod handlers;

pub use error::ProxyError;

use crate::{
    config::ProxyConfig,
    http,
    validation::{MAX_IMAGE_SIZE, MULTIPART_OVERHEAD},
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tower_http::services::ServeFile;

#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(format!("infernum-proxy/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

pub fn router(state: ProxyState) -> Router {
    let index = ServeFile::new(state.config.web_dir.join("index.html"));

    Router::new()
        .route_service("/", index)
        .route(
            "/api/analyze-image",
            post(handlers::analyze_image)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE + MULTIPART_OVERHEAD)),
        )
        .route("/api/health", get(handlers::health))
        .layer(middleware::from_fn(http::log_request))
        .layer(http::cors())
        .with_state(state)
}

/// Serves the proxy until `shutdown` resolves.
pub async fn run<S>(listener: TcpListener, state: ProxyState, shutdown: S) -> std::io::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
