//! Infernum gateway: an HTTP front door for image-to-text models.
//!
//! Three services share this crate:
//!
//! - the analysis [`gateway`], which validates uploads and forwards them to an
//!   [`InferenceEngine`] wrapping a loaded [`InferenceBackend`],
//! - the web [`proxy`], which serves the browser UI and relays its calls to
//!   the gateway,
//! - the retrying [`client`], which submits single images or whole batches
//!   and exports the results.

pub mod backends;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod gpu;
mod http;
pub mod logging;
pub mod messages;
pub mod model;
pub mod proxy;
pub mod validation;

pub use engine::{EngineError, EngineResponse, EngineState, InferenceEngine};
pub use error::GatewayError;
pub use http::shutdown_signal;
pub use model::{BackendConfig, Device, GenerationParams, GenerationRequest, InferenceBackend};
