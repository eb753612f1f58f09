//! JSON shapes exchanged between the gateway, the proxy and the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one image analysis.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    /// Backend latency in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<f64>,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

impl AnalysisResult {
    /// A successful analysis always carries both the text and its latency.
    pub fn completed(model: impl Into<String>, analysis: String, inference_time: f64) -> Self {
        Self {
            success: true,
            message: "Analysis completed successfully".to_string(),
            analysis: Some(analysis),
            inference_time: Some(inference_time),
            model: model.into(),
            timestamp: Utc::now(),
        }
    }

    /// A failed analysis never carries generated text.
    pub fn failed(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            analysis: None,
            inference_time: None,
            model: model.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Initializing,
    Error,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub model_loaded: bool,
    pub gpu_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vram_used_mb: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
    /// The status reported when the health check itself failed.
    pub fn error() -> Self {
        Self {
            status: HealthState::Error,
            model_loaded: false,
            gpu_available: false,
            vram_used_mb: None,
            timestamp: Utc::now(),
        }
    }
}

/// Body of `GET /` on the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub status: String,
    pub model: String,
}

/// Accelerator details as reported by `/info`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct GpuInfo {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_memory_mb: Option<f64>,
}

/// Body of `GET /info` on the gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayInfo {
    pub model: String,
    /// `None` until the backend has finished loading.
    pub device: Option<String>,
    pub cuda_available: bool,
    pub gpu_info: GpuInfo,
    pub model_loaded: bool,
    pub max_image_size_mb: f64,
    pub supported_formats: Vec<String>,
}

/// Error body returned by the gateway for every failed request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
}

/// One successful item of a batch run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BatchRecord {
    /// Where the image came from, usually its path.
    pub image: String,
    pub result: AnalysisResult,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_omits_analysis_fields() {
        let value = serde_json::to_value(AnalysisResult::failed("m", "nope")).unwrap();
        assert_eq!(value["success"], false);
        assert!(value.get("analysis").is_none());
        assert!(value.get("inference_time").is_none());
    }

    #[test]
    fn completed_result_carries_text_and_time() {
        let result = AnalysisResult::completed("m", "a cat".to_string(), 0.25);
        assert!(result.success);
        assert_eq!(result.analysis.as_deref(), Some("a cat"));
        assert_eq!(result.inference_time, Some(0.25));
    }

    #[test]
    fn health_state_is_lowercase_on_the_wire() {
        let value = serde_json::to_value(HealthStatus::error()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["model_loaded"], false);
    }
}
