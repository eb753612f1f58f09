use crate::messages::ErrorEnvelope;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;

/// Failure kinds the gateway reports to its callers.
///
/// Every internal failure is mapped onto one of these before a response is
/// written; [`IntoResponse`] is the only place that knows the status codes.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Unsupported format, missing file or undecodable image.
    #[error("{0}")]
    BadRequest(String),
    #[error("File too large (max {max_mb:.0}MB)")]
    PayloadTooLarge { max_mb: f64 },
    /// The backend has not finished loading, or has been stopped.
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            error: self.to_string(),
            status_code: status.as_u16(),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}
