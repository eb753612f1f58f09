use crate::model::{BackendConfig, Device, GenerationRequest, InferenceBackend};
use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

/// Represents the current state of the inference engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineState {
    /// The worker is waiting for the next request.
    Idle,
    /// The worker is currently running a generation.
    Processing,
    /// The engine has been stopped and accepts no more requests.
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Processing => "processing",
            EngineState::Stopped => "stopped",
        }
    }
}

/// Errors surfaced to callers of [`InferenceEngine::infer`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The backend itself failed; carries the backend's message.
    #[error("{0}")]
    Backend(String),
    #[error("inference engine is stopped")]
    Stopped,
    #[error("inference worker exited before replying")]
    WorkerGone,
}

/// Response returned by the engine: the generated text plus telemetry.
#[derive(Debug)]
pub struct EngineResponse {
    /// Identifier assigned when the request was scheduled.
    pub id: u64,
    /// When the worker picked the request up.
    pub start_time: Instant,
    /// Time spent inside the backend.
    pub duration: Duration,
    pub text: String,
}

struct EngineRequest {
    id: u64,
    request: GenerationRequest,
    reply: oneshot::Sender<Result<EngineResponse, EngineError>>,
}

/// Owns one loaded backend and runs it on a dedicated worker thread.
///
/// Requests are queued over a channel and answered through a oneshot, so async
/// callers never block the runtime while generation runs. Because there is a
/// single worker, concurrent requests are served one after another in arrival
/// order.
pub struct InferenceEngine {
    state: Arc<Mutex<EngineState>>,
    device: Device,
    req_tx: Mutex<Option<mpsc::Sender<EngineRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    id_counter: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InferenceEngine {
    /// Initializes a backend of type `B` and starts an engine around it.
    ///
    /// This blocks for as long as the backend takes to load, so async callers
    /// should run it on a blocking task.
    pub fn load<B: InferenceBackend>(config: &BackendConfig) -> Result<Self, B::Error> {
        log::info!("Loading model: {}", config.model_id);
        let backend = B::initialize(config)?;
        log::info!("Model loaded on {}", backend.device());
        Ok(Self::new(backend))
    }

    /// Creates a new engine around an already initialized backend.
    ///
    /// The backend is moved to the worker thread and released there once the
    /// engine is stopped.
    pub fn new<B: InferenceBackend>(mut backend: B) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<EngineRequest>();
        let state = Arc::new(Mutex::new(EngineState::Idle));
        let device = backend.device();

        let worker = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Running inference #{}", req.id);

                    *lock(&state) = EngineState::Processing;
                    let start_time = Instant::now();

                    let result = backend
                        .generate(req.request)
                        .map(|text| EngineResponse {
                            id: req.id,
                            start_time,
                            duration: start_time.elapsed(),
                            text,
                        })
                        .map_err(|e| EngineError::Backend(e.to_string()));

                    match &result {
                        Ok(response) => log::debug!(
                            "Inference #{} completed in {:.2?}",
                            req.id,
                            response.duration
                        ),
                        Err(e) => log::error!("Inference #{} failed: {e}", req.id),
                    }

                    // the caller may have gone away, the result is simply dropped then
                    let _ = req.reply.send(result);

                    *lock(&state) = EngineState::Idle;
                }

                backend.release();
                *lock(&state) = EngineState::Stopped;
                log::info!("Inference backend released");
            }
        });

        Self {
            state,
            device,
            req_tx: Mutex::new(Some(req_tx)),
            worker: Mutex::new(Some(worker)),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    /// The device reported by the backend at load time.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Queues a request and waits for the worker to answer it.
    pub async fn infer(&self, request: GenerationRequest) -> Result<EngineResponse, EngineError> {
        let (reply, rx) = oneshot::channel();
        {
            let guard = lock(&self.req_tx);
            let tx = guard.as_ref().ok_or(EngineError::Stopped)?;
            let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
            tx.send(EngineRequest { id, request, reply })
                .map_err(|_| EngineError::Stopped)?;
        }
        rx.await.map_err(|_| EngineError::WorkerGone)?
    }

    /// Stops the engine and waits for the worker thread to finish.
    ///
    /// Requests already queued are still served before the backend is
    /// released. Calling this more than once is a no-op.
    pub fn stop(&self) {
        lock(&self.req_tx).take();
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Inference worker panicked");
            }
        }
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
