use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Ways a proxied call can fail. None of these ever escape as a transport
/// error; each becomes a JSON body with a matching status.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// The browser sent something that could not be forwarded.
    #[error("{0}")]
    BadRequest(String),
    /// The gateway answered with a non-200 status.
    #[error("API error ({0})")]
    Upstream(StatusCode),
    #[error("Request timeout")]
    GatewayTimeout,
    #[error("{0}")]
    Server(String),
}

impl From<reqwest::Error> for ProxyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProxyError::GatewayTimeout
        } else {
            ProxyError::Server(e.to_string())
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            ProxyError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ProxyError::Upstream(status) => (
                status,
                Json(json!({ "error": "API error", "status": status.as_u16() })),
            )
                .into_response(),
            ProxyError::GatewayTimeout => (
                StatusCode::GATEWAY_TIMEOUT,
                Json(json!({ "error": "Request timeout" })),
            )
                .into_response(),
            ProxyError::Server(msg) => {
                log::error!("Proxy error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": msg })),
                )
                    .into_response()
            }
        }
    }
}
