//! Concrete [`InferenceBackend`](crate::model::InferenceBackend) implementations.

#[cfg(feature = "paligemma")]
mod paligemma;
mod stats;

#[cfg(feature = "paligemma")]
pub use paligemma::{PaligemmaBackend, PaligemmaBackendError};
pub use stats::{StatsBackend, StatsError};

use crate::{engine::InferenceEngine, model::BackendConfig};
use std::{fmt, str::FromStr};

/// Error raised when a backend cannot be brought up.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend '{0}' is not available in this build")]
    Unavailable(BackendKind),
    #[error("failed to initialize backend: {0}")]
    Initialize(String),
}

/// Selects which backend the gateway loads at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stats,
    Paligemma,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "paligemma") {
            BackendKind::Paligemma
        } else {
            BackendKind::Stats
        }
    }
}

impl BackendKind {
    /// Model identifier reported when `MODEL_NAME` is not set.
    pub fn default_model_id(self) -> &'static str {
        match self {
            BackendKind::Stats => "infernum/stats",
            BackendKind::Paligemma => "google/paligemma-3b-mix-224",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stats" => Ok(BackendKind::Stats),
            "paligemma" => Ok(BackendKind::Paligemma),
            other => Err(format!("unknown backend '{other}', expected stats or paligemma")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Stats => f.write_str("stats"),
            BackendKind::Paligemma => f.write_str("paligemma"),
        }
    }
}

/// Loads the selected backend and wraps it in an engine. Blocking.
pub fn load_engine(
    kind: BackendKind,
    config: &BackendConfig,
) -> Result<InferenceEngine, BackendError> {
    match kind {
        BackendKind::Stats => InferenceEngine::load::<StatsBackend>(config)
            .map_err(|e| BackendError::Initialize(e.to_string())),
        #[cfg(feature = "paligemma")]
        BackendKind::Paligemma => InferenceEngine::load::<PaligemmaBackend>(config)
            .map_err(|e| BackendError::Initialize(e.to_string())),
        #[cfg(not(feature = "paligemma"))]
        BackendKind::Paligemma => Err(BackendError::Unavailable(kind)),
    }
}
