use super::GatewayState;
use crate::{
    engine::{EngineError, EngineState},
    error::GatewayError,
    gpu::{self, GpuProbeError},
    messages::{AnalysisResult, GatewayInfo, GpuInfo, HealthState, HealthStatus, ServiceInfo},
    model::GenerationRequest,
    validation,
};
use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::StatusCode,
};
use chrono::Utc;

pub const SERVICE_NAME: &str = "Infernum Vision API";

/// Instruction used when the caller does not supply a prompt.
pub const DEFAULT_PROMPT: &str = "Describe this image in detail.";

pub async fn root(State(state): State<GatewayState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "running".to_string(),
        model: state.config().model_name().to_string(),
    })
}

pub async fn health(State(state): State<GatewayState>) -> Json<HealthStatus> {
    Json(health_status(state.model_loaded(), gpu::probe().await))
}

/// Builds the health report from the engine flag and a fresh GPU probe.
pub fn health_status(model_loaded: bool, probe: Result<GpuInfo, GpuProbeError>) -> HealthStatus {
    match probe {
        Ok(gpu) => HealthStatus {
            status: if model_loaded {
                HealthState::Healthy
            } else {
                HealthState::Initializing
            },
            model_loaded,
            gpu_available: gpu.available,
            vram_used_mb: gpu.memory_used_mb,
            timestamp: Utc::now(),
        },
        Err(e) => {
            log::error!("Health check error: {e}");
            HealthStatus::error()
        }
    }
}

pub async fn info(State(state): State<GatewayState>) -> Json<GatewayInfo> {
    let gpu_info = gpu::probe().await.unwrap_or_else(|e| {
        log::error!("GPU info error: {e}");
        GpuInfo::default()
    });
    let config = state.config();

    Json(GatewayInfo {
        model: config.model_name().to_string(),
        device: state.engine().map(|engine| engine.device().to_string()),
        cuda_available: gpu_info.available,
        gpu_info,
        model_loaded: state.model_loaded(),
        max_image_size_mb: config.max_image_size_mb(),
        supported_formats: config
            .supported_formats
            .iter()
            .map(|format| format.to_string())
            .collect(),
    })
}

/// Query pairs in arrival order. Repeated keys are allowed; the last
/// `prompt` wins.
type QueryPairs = Vec<(String, String)>;

fn query_prompt(pairs: QueryPairs) -> Option<String> {
    pairs
        .into_iter()
        .rev()
        .find_map(|(key, value)| (key == "prompt").then_some(value))
}

/// The parts of an analysis upload the handler cares about.
struct Upload {
    filename: String,
    bytes: Bytes,
    prompt: Option<String>,
}

fn multipart_error(e: MultipartError, max_mb: f64) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge { max_mb }
    } else {
        GatewayError::BadRequest(format!("Invalid multipart payload: {}", e.body_text()))
    }
}

/// Pulls `file` (and an optional `prompt` field) out of the form, rejecting
/// unsupported extensions before the file body is read.
async fn read_upload(
    state: &GatewayState,
    mut multipart: Multipart,
) -> Result<Upload, GatewayError> {
    let config = state.config();
    let max_mb = config.max_image_size_mb();
    let mut file = None;
    let mut prompt = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_mb))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if !validation::is_supported_format(&filename, config.supported_formats) {
                    return Err(GatewayError::BadRequest(format!(
                        "Unsupported format. Accepted: {}",
                        config.supported_formats.join(", ")
                    )));
                }
                let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_mb))?;
                file = Some((filename, bytes));
            }
            "prompt" => {
                let text = field.text().await.map_err(|e| multipart_error(e, max_mb))?;
                prompt = Some(text);
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| GatewayError::BadRequest("No file provided".to_string()))?;
    Ok(Upload {
        filename,
        bytes,
        prompt,
    })
}

/// Analyzes an image with an optional custom prompt.
///
/// The prompt is handed to the backend exactly as received, in any language.
/// A `prompt` query parameter takes precedence over a `prompt` form field.
pub async fn analyze_image(
    State(state): State<GatewayState>,
    query: Result<Query<QueryPairs>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResult>, GatewayError> {
    let Some(engine) = state.engine().filter(|e| e.state() != EngineState::Stopped) else {
        return Err(GatewayError::ServiceUnavailable("Model not loaded".to_string()));
    };

    let Query(pairs) = query.map_err(|e| GatewayError::BadRequest(e.body_text()))?;

    let multipart = multipart.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let upload = read_upload(&state, multipart).await?;

    let config = state.config();
    if upload.bytes.len() > config.max_image_size {
        return Err(GatewayError::PayloadTooLarge {
            max_mb: config.max_image_size_mb(),
        });
    }

    let bytes = upload.bytes;
    let image = tokio::task::spawn_blocking(move || validation::decode_image(&bytes))
        .await
        .map_err(|e| GatewayError::ServerError(e.to_string()))?
        .map_err(|e| {
            log::error!("Image load error: {e}");
            GatewayError::BadRequest("Invalid or corrupted image".to_string())
        })?;

    let instruction = query_prompt(pairs)
        .or(upload.prompt)
        .filter(|prompt| !prompt.is_empty())
        .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

    log::info!("Analyzing image: {}", upload.filename);
    log::info!("Prompt: {instruction}");

    let response = engine
        .infer(GenerationRequest {
            image,
            instruction,
            params: config.generation.clone(),
        })
        .await
        .map_err(|e| match e {
            EngineError::Backend(msg) => {
                log::error!("Analysis error: {msg}");
                GatewayError::ServerError(msg)
            }
            other => GatewayError::ServiceUnavailable(other.to_string()),
        })?;

    let inference_time = response.duration.as_secs_f64();
    log::info!("Analysis completed in {inference_time:.2}s");

    Ok(Json(AnalysisResult::completed(
        config.model_name(),
        response.text,
        inference_time,
    )))
}
