// Helpers shared by the integration tests
#![allow(dead_code)]

use axum::{Router, body::Body, http::Request};
use image::{ImageFormat, Rgb, RgbImage};
use infernum_gateway::{
    BackendConfig, Device, GenerationRequest, InferenceBackend, InferenceEngine,
    config::{Env, GatewayConfig},
    gateway::GatewayState,
};
use std::{
    io::{Cursor, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::net::TcpListener;

pub const BOUNDARY: &str = "infernum-test-boundary";

/// Encodes a small solid image in `format`.
pub fn encode_image(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encode_image(ImageFormat::Png, width, height)
}

/// Builds a `multipart/form-data` body with an optional `prompt` field and
/// a `file` field. Returns the content type and the body.
pub fn multipart_body(filename: &str, bytes: &[u8], prompt: Option<&str>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    if let Some(prompt) = prompt {
        write!(
            body,
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"prompt\"\r\n\r\n{prompt}\r\n"
        )
        .unwrap();
    }
    write!(
        body,
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .unwrap();
    body.extend_from_slice(bytes);
    write!(body, "\r\n--{BOUNDARY}--\r\n").unwrap();
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

pub fn upload_request(uri: &str, filename: &str, bytes: &[u8], prompt: Option<&str>) -> Request<Body> {
    let (content_type, body) = multipart_body(filename, bytes, prompt);
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// What a [`ScriptedBackend`] saw and did, shared with the test.
#[derive(Clone, Default)]
pub struct Probe {
    pub calls: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    pub instructions: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn last_instruction(&self) -> Option<String> {
        self.instructions.lock().unwrap().last().cloned()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ScriptedError(String);

/// Backend that answers with a fixed text, or fails with a fixed message.
pub struct ScriptedBackend {
    pub probe: Probe,
    pub failure: Option<String>,
}

impl ScriptedBackend {
    pub fn ok(probe: &Probe) -> Self {
        Self {
            probe: probe.clone(),
            failure: None,
        }
    }

    pub fn failing(probe: &Probe, message: &str) -> Self {
        Self {
            probe: probe.clone(),
            failure: Some(message.to_string()),
        }
    }
}

impl InferenceBackend for ScriptedBackend {
    type Error = ScriptedError;

    fn initialize(_config: &BackendConfig) -> Result<Self, Self::Error> {
        Ok(Self::ok(&Probe::default()))
    }

    fn generate(&mut self, request: GenerationRequest) -> Result<String, Self::Error> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        self.probe
            .instructions
            .lock()
            .unwrap()
            .push(request.instruction.clone());
        if let Some(message) = &self.failure {
            return Err(ScriptedError(message.clone()));
        }
        // make the measured latency clearly non-zero
        std::thread::sleep(std::time::Duration::from_millis(2));
        let (width, height) = request.image.dimensions();
        Ok(format!("a {width}x{height} picture"))
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn release(&mut self) {
        self.probe.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Gateway configuration with every default and no environment involved.
pub fn gateway_config() -> GatewayConfig {
    GatewayConfig::from_env(&Env::new(|_| None)).unwrap()
}

pub fn gateway_with_engine(engine: InferenceEngine) -> GatewayState {
    let state = GatewayState::new(gateway_config());
    assert!(state.install(engine).is_ok());
    state
}

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A URL nothing is listening on.
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
