//! Generation backends.
//!
//! - [`ServerBackend`]: llama.cpp HTTP server with grammar-constrained choices
//! - `LlamaCppBackend`: in-process GGUF model (`llm` feature)
//! - [`MockBackend`]: keyword matching, for tests and offline runs

pub mod mock;
pub mod server;

#[cfg(feature = "llm")]
pub mod llama;

pub use mock::{Finding, MockBackend, SubstanceTerms};
pub use server::ServerBackend;

#[cfg(feature = "llm")]
pub use llama::LlamaCppBackend;

use drug_detector_core::{BackendResult, GenerationBackend};
use tracing::info;

use crate::config::{BackendKind, DetectorConfig};

/// Select and load the backend described by `config`.
pub fn load_backend(config: &DetectorConfig) -> BackendResult<Box<dyn GenerationBackend>> {
    match config.backend {
        BackendKind::Mock => Ok(Box::new(MockBackend::new())),
        BackendKind::Server => {
            let backend = ServerBackend::with_timeout(&config.endpoint, config.request_timeout())?;
            backend.check_health()?;
            info!(endpoint = %backend.base_url(), model = %config.model, "Connected to llama.cpp server");
            Ok(Box::new(backend))
        }
        BackendKind::Local => load_local(config),
    }
}

#[cfg(feature = "llm")]
fn load_local(config: &DetectorConfig) -> BackendResult<Box<dyn GenerationBackend>> {
    let backend = LlamaCppBackend::load(
        &config.model_path(),
        config.device.gpu_layers(),
        config.context_size,
    )?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "llm"))]
fn load_local(config: &DetectorConfig) -> BackendResult<Box<dyn GenerationBackend>> {
    Err(drug_detector_core::BackendError::Load(format!(
        "cannot load {}: local models require the `llm` feature",
        config.model_path().display()
    )))
}
