use image::RgbImage;
use std::{fmt, str::FromStr};

/// Where the backend should place its weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    /// Use an accelerator when one is present, otherwise the CPU.
    Auto,
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Auto => "auto",
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Device::Auto),
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device '{other}', expected auto, cpu or cuda")),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric precision requested for the model weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precision {
    Float16,
    BFloat16,
    Float32,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Float16 => "float16",
            Precision::BFloat16 => "bfloat16",
            Precision::Float32 => "float32",
        }
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "float16" | "fp16" | "f16" => Ok(Precision::Float16),
            "bfloat16" | "bf16" => Ok(Precision::BFloat16),
            "float32" | "fp32" | "f32" => Ok(Precision::Float32),
            other => Err(format!(
                "unknown precision '{other}', expected float16, bfloat16 or float32"
            )),
        }
    }
}

/// Sampling parameters forwarded to every generation call.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 1024,
            temperature: 0.7,
            top_p: 0.8,
            top_k: 20,
        }
    }
}

/// Everything a backend needs to load itself.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub model_id: String,
    pub device: Device,
    pub precision: Precision,
}

/// A single-turn request: one decoded image plus the instruction text.
pub struct GenerationRequest {
    pub image: RgbImage,
    pub instruction: String,
    pub params: GenerationParams,
}

/// Trait for implementing image-to-text backends that can be driven by the
/// [`InferenceEngine`](crate::engine::InferenceEngine).
///
/// A backend is loaded once, moved onto the engine's worker thread and only
/// ever touched from there, so implementations need `Send` but not `Sync`.
pub trait InferenceBackend: Sized + Send + 'static {
    /// The error type that can be returned while loading or generating.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the model and whatever processor state it needs.
    fn initialize(config: &BackendConfig) -> Result<Self, Self::Error>;

    /// Runs generation for one image and instruction, returning the text.
    fn generate(&mut self, request: GenerationRequest) -> Result<String, Self::Error>;

    /// The device the backend actually settled on after initialization.
    fn device(&self) -> Device;

    /// Frees model resources. Called exactly once, on the worker thread,
    /// after the last request has been served.
    fn release(&mut self) {}
}
