//! Retrying client for the analysis gateway, with batch runs and exports.

mod export;
mod pacing;
mod retry;

pub use export::{CSV_HEADER, MISSING_TIME, write_csv, write_json};
pub use pacing::{FixedDelay, NoPacing, Pacing};
pub use retry::RetryPolicy;

use crate::{
    config::{ClientConfig, trim_url},
    messages::{AnalysisResult, BatchRecord},
};
use chrono::Utc;
use reqwest::{
    StatusCode,
    multipart::{Form, Part},
};
use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot reach the gateway: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("failed to write JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl ClientError {
    /// Whether trying again later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Decode(_) => true,
            ClientError::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ClientError::Io { .. } | ClientError::Json(_) | ClientError::Csv(_) => false,
        }
    }
}

/// Client for the gateway's `/analyze-image` endpoint.
pub struct VisionClient {
    http: reqwest::Client,
    api_url: String,
    retry: RetryPolicy,
    pacing: Box<dyn Pacing>,
    results: Vec<BatchRecord>,
}

impl VisionClient {
    /// Builds a client for `api_url` with a per-request `timeout`, the
    /// default retry policy and a half second pause between batch items.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("infernum-client/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_url: trim_url(api_url.into()),
            retry: RetryPolicy::default(),
            pacing: Box::new(FixedDelay::default()),
            results: Vec::new(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(config.api_url.clone(), config.timeout)?
            .with_retry(RetryPolicy::with_max_attempts(config.max_retries)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pacing(mut self, pacing: impl Pacing + 'static) -> Self {
        self.pacing = Box::new(pacing);
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Records kept from the last batch run.
    pub fn results(&self) -> &[BatchRecord] {
        &self.results
    }

    /// Submits an image once, without retrying.
    pub async fn try_analyze(
        &self,
        image_path: &Path,
        prompt: Option<&str>,
    ) -> Result<AnalysisResult, ClientError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|source| ClientError::Io {
                path: image_path.to_path_buf(),
                source,
            })?;
        let filename = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut request = self
            .http
            .post(format!("{}/analyze-image", self.api_url))
            .multipart(Form::new().part("file", Part::bytes(bytes).file_name(filename)));
        if let Some(prompt) = prompt {
            request = request.query(&[("prompt", prompt)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        response
            .json::<AnalysisResult>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Submits an image, retrying failures with exponential backoff.
    ///
    /// Returns `None` once every attempt has failed; the individual failures
    /// are logged.
    pub async fn analyze(&self, image_path: &Path, prompt: Option<&str>) -> Option<AnalysisResult> {
        for attempt in 0..self.retry.max_attempts {
            match self.try_analyze(image_path, prompt).await {
                Ok(result) => return Some(result),
                Err(e) => {
                    log::warn!(
                        "Attempt {}/{} for {} failed: {e}",
                        attempt + 1,
                        self.retry.max_attempts,
                        image_path.display()
                    );
                    if !self.retry.should_retry(&e) {
                        break;
                    }
                    if attempt + 1 < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    }
                }
            }
        }
        log::error!("Giving up on {}", image_path.display());
        None
    }

    /// Analyzes `image_paths` one after another, in order.
    ///
    /// Items that fail every attempt are left out; the run itself never
    /// aborts. The pacing policy is applied after every item. The records
    /// replace those of any previous run.
    pub async fn batch_analyze<P: AsRef<Path>>(
        &mut self,
        image_paths: &[P],
        prompt: Option<&str>,
    ) -> &[BatchRecord] {
        log::info!("Processing {} images...", image_paths.len());
        let mut records = Vec::with_capacity(image_paths.len());

        for (index, path) in image_paths.iter().enumerate() {
            let path = path.as_ref();
            log::info!("[{}/{}] {}", index + 1, image_paths.len(), path.display());

            if let Some(result) = self.analyze(path, prompt).await {
                records.push(BatchRecord {
                    image: path.display().to_string(),
                    result,
                    timestamp: Utc::now(),
                });
            }

            let pause = self.pacing.after_item();
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        self.results = records;
        &self.results
    }

    /// Writes the last batch run to `path` as JSON. Returns how many records
    /// were written; with no records nothing is written.
    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<usize, ClientError> {
        let path = path.as_ref();
        if self.results.is_empty() {
            log::warn!("No results to export");
            return Ok(0);
        }
        write_json(&self.results, path)?;
        log::info!("Exported: {}", path.display());
        Ok(self.results.len())
    }

    /// Writes the last batch run to `path` as CSV. Returns how many records
    /// were written; with no records nothing is written.
    pub fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize, ClientError> {
        let path = path.as_ref();
        if self.results.is_empty() {
            log::warn!("No results to export");
            return Ok(0);
        }
        write_csv(&self.results, path)?;
        log::info!("Exported: {}", path.display());
        Ok(self.results.len())
    }
}
