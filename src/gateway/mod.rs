//! The analysis gateway: validates uploads and fronts the inference engine.

pub mod handlers;

use crate::{
    backends::BackendError,
    config::GatewayConfig,
    engine::{EngineState, InferenceEngine},
    http,
    validation::MULTIPART_OVERHEAD,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use std::{
    future::{Future, IntoFuture},
    sync::{Arc, OnceLock},
};
use tokio::net::TcpListener;

struct Shared {
    config: GatewayConfig,
    engine: OnceLock<InferenceEngine>,
}

/// State shared by every gateway handler.
///
/// The engine slot is filled exactly once when the backend finishes loading
/// and is only read afterwards.
#[derive(Clone)]
pub struct GatewayState {
    shared: Arc<Shared>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                engine: OnceLock::new(),
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.shared.config
    }

    /// Installs the loaded engine. Returns the engine back if one is
    /// already installed.
    pub fn install(&self, engine: InferenceEngine) -> Result<(), InferenceEngine> {
        self.shared.engine.set(engine)
    }

    pub fn engine(&self) -> Option<&InferenceEngine> {
        self.shared.engine.get()
    }

    pub fn model_loaded(&self) -> bool {
        self.engine()
            .is_some_and(|engine| engine.state() != EngineState::Stopped)
    }

    /// Stops the engine, if any. Blocks until the backend is released.
    pub fn shutdown(&self) {
        if let Some(engine) = self.engine() {
            engine.stop();
        }
    }
}

pub fn router(state: GatewayState) -> Router {
    let body_limit = state.config().max_image_size + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/info", get(handlers::info))
        .route(
            "/analyze-image",
            post(handlers::analyze_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(middleware::from_fn(http::log_request))
        .layer(http::cors())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayServeError {
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("backend loader task failed: {0}")]
    Loader(#[from] tokio::task::JoinError),
}

/// Serves the gateway until `shutdown` resolves.
///
/// The listener accepts requests right away while `loader` brings the
/// backend up on a blocking thread; until it finishes `/health` reports
/// `initializing` and analysis requests get a 503. A failing loader ends the
/// whole server with its error. After `shutdown` resolves, in-flight requests
/// drain and the engine is stopped once.
pub async fn run<L, S>(
    listener: TcpListener,
    state: GatewayState,
    loader: L,
    shutdown: S,
) -> Result<(), GatewayServeError>
where
    L: FnOnce() -> Result<InferenceEngine, BackendError> + Send + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    let loading = tokio::task::spawn_blocking({
        let state = state.clone();
        move || -> Result<(), BackendError> {
            let engine = loader()?;
            if state.install(engine).is_err() {
                log::warn!("An engine was already installed, discarding the new one");
            }
            Ok(())
        }
    });
    let load_failed = async move {
        match loading.await {
            Ok(Ok(())) => std::future::pending().await,
            Ok(Err(e)) => GatewayServeError::Backend(e),
            Err(e) => GatewayServeError::Loader(e),
        }
    };

    let server = axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown)
        .into_future();

    tokio::select! {
        served = server => served?,
        err = load_failed => {
            log::error!("Startup error: {err}");
            return Err(err);
        }
    }

    log::info!("Server stopped, releasing the inference backend");
    tokio::task::spawn_blocking(move || state.shutdown()).await?;
    Ok(())
}
