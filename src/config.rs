//! Environment-driven configuration for the gateway, the proxy and the client.
//!
//! Every component reads its settings once at startup. Unset variables fall
//! back to defaults; set but malformed variables are reported as errors
//! rather than silently ignored.

use crate::{
    backends::BackendKind,
    model::{BackendConfig, Device, GenerationParams, Precision},
    validation::{MAX_IMAGE_SIZE, SUPPORTED_FORMATS},
};
use log::LevelFilter;
use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_API_HOST: &str = "0.0.0.0";
pub const DEFAULT_API_PORT: u16 = 8000;
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_WEB_HOST: &str = "0.0.0.0";
pub const DEFAULT_WEB_PORT: u16 = 8080;
pub const DEFAULT_WEB_DIR: &str = "web";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Proxy deadline for forwarded analysis requests.
pub const PROXY_ANALYZE_TIMEOUT: Duration = Duration::from_secs(120);
/// Proxy deadline for forwarded health checks.
pub const PROXY_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
#[error("invalid value for {key}: '{value}' ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Reads typed values from a key/value source, normally the process
/// environment.
pub struct Env<F> {
    lookup: F,
}

impl Env<fn(&str) -> Option<String>> {
    pub fn process() -> Self {
        Self {
            lookup: |key| std::env::var(key).ok(),
        }
    }
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    pub fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    pub fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.raw(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }
}

/// Log level and optional file sink.
#[derive(Clone, Debug)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub file: Option<PathBuf>,
}

impl LogConfig {
    pub fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        let level = match env.raw("LOG_LEVEL") {
            None => LevelFilter::Warn,
            Some(value) => parse_level(&value).ok_or_else(|| ConfigError {
                key: "LOG_LEVEL",
                reason: "expected off, error, warn, info, debug or trace".to_string(),
                value,
            })?,
        };
        Ok(Self {
            level,
            file: env.raw("LOG_FILE").map(PathBuf::from),
        })
    }
}

/// Accepts the `log` level names plus the `WARNING`/`CRITICAL` spellings.
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(LevelFilter::Warn),
        "critical" | "fatal" => Some(LevelFilter::Error),
        other => other.parse().ok(),
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub backend_config: BackendConfig,
    pub generation: GenerationParams,
    pub max_image_size: usize,
    pub supported_formats: &'static [&'static str],
    pub log: LogConfig,
}

impl GatewayConfig {
    pub fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        let defaults = GenerationParams::default();
        let backend: BackendKind = env.parse("GATEWAY_BACKEND", BackendKind::default())?;
        let max_new_tokens = env.parse("MAX_NEW_TOKENS", defaults.max_new_tokens)?;
        if max_new_tokens == 0 {
            return Err(ConfigError {
                key: "MAX_NEW_TOKENS",
                value: max_new_tokens.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: env.string("API_HOST", DEFAULT_API_HOST),
            port: env.parse("API_PORT", DEFAULT_API_PORT)?,
            backend,
            backend_config: BackendConfig {
                model_id: env.string("MODEL_NAME", backend.default_model_id()),
                device: env.parse("DEVICE", Device::Auto)?,
                precision: env.parse("PRECISION", Precision::Float16)?,
            },
            generation: GenerationParams {
                max_new_tokens,
                temperature: env.parse("TEMPERATURE", defaults.temperature)?,
                top_p: env.parse("TOP_P", defaults.top_p)?,
                top_k: env.parse("TOP_K", defaults.top_k)?,
            },
            max_image_size: MAX_IMAGE_SIZE,
            supported_formats: &SUPPORTED_FORMATS,
            log: LogConfig::from_env(env)?,
        })
    }

    /// Switches the backend. A model id that was only the old backend's
    /// default follows the switch; an explicit `MODEL_NAME` is kept.
    pub fn select_backend(&mut self, backend: BackendKind) {
        if self.backend_config.model_id == self.backend.default_model_id() {
            self.backend_config.model_id = backend.default_model_id().to_string();
        }
        self.backend = backend;
    }

    pub fn model_name(&self) -> &str {
        &self.backend_config.model_id
    }

    pub fn max_image_size_mb(&self) -> f64 {
        self.max_image_size as f64 / 1024.0 / 1024.0
    }
}

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the analysis gateway.
    pub api_url: String,
    /// Directory holding `index.html`.
    pub web_dir: PathBuf,
    pub analyze_timeout: Duration,
    pub health_timeout: Duration,
    pub log: LogConfig,
}

impl ProxyConfig {
    pub fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: env.string("WEB_HOST", DEFAULT_WEB_HOST),
            port: env.parse("WEB_PORT", DEFAULT_WEB_PORT)?,
            api_url: trim_url(env.string("API_URL", DEFAULT_API_URL)),
            web_dir: PathBuf::from(env.string("WEB_DIR", DEFAULT_WEB_DIR)),
            analyze_timeout: PROXY_ANALYZE_TIMEOUT,
            health_timeout: PROXY_HEALTH_TIMEOUT,
            log: LogConfig::from_env(env)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub log: LogConfig,
}

impl ClientConfig {
    pub fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: trim_url(env.string("API_URL", DEFAULT_API_URL)),
            timeout: Duration::from_secs(env.parse("API_TIMEOUT", DEFAULT_API_TIMEOUT_SECS)?),
            max_retries: env.parse("API_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            log: LogConfig::from_env(env)?,
        })
    }
}

pub(crate) fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
