use super::{ProxyError, ProxyState};
use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

/// Forwards a browser upload to the gateway's `/analyze-image`.
///
/// A 200 from the gateway is passed through byte for byte; anything else is
/// rewritten into a proxy error envelope.
pub async fn analyze_image(
    State(state): State<ProxyState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ProxyError> {
    let mut multipart = multipart.map_err(|e| ProxyError::BadRequest(e.body_text()))?;

    let mut file = None;
    let mut prompt = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::BadRequest(e.body_text()))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ProxyError::BadRequest(e.body_text()))?;
                file = Some((filename, bytes));
            }
            "prompt" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ProxyError::BadRequest(e.body_text()))?;
                prompt = Some(text).filter(|p| !p.is_empty());
            }
            _ => {}
        }
    }
    let (filename, bytes) =
        file.ok_or_else(|| ProxyError::BadRequest("No file provided".to_string()))?;

    let mut form = Form::new().part("file", Part::bytes(bytes.to_vec()).file_name(filename));
    let mut request = state
        .client
        .post(format!("{}/analyze-image", state.config.api_url))
        .timeout(state.config.analyze_timeout);
    if let Some(prompt) = prompt {
        request = request.query(&[("prompt", prompt.as_str())]);
        form = form.text("prompt", prompt);
    }

    let response = request.multipart(form).send().await?;
    let status = response.status();
    if status != StatusCode::OK {
        log::warn!("Gateway answered {status}");
        return Err(ProxyError::Upstream(status));
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    let body: Bytes = response.bytes().await?;

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Relays the gateway's `/health`. Never fails: an unreachable gateway is
/// reported as `{"status": "error", "detail": ...}` with a 200.
pub async fn health(State(state): State<ProxyState>) -> Json<Value> {
    let result = async {
        let response = state
            .client
            .get(format!("{}/health", state.config.api_url))
            .timeout(state.config.health_timeout)
            .send()
            .await?;
        response.json::<Value>().await
    }
    .await;

    match result {
        Ok(body) => Json(body),
        Err(e) => {
            log::warn!("Gateway health check failed: {e}");
            Json(json!({ "status": "error", "detail": e.to_string() }))
        }
    }
}
