//! LLM-backed substance-use detection for medical notes.
//!
//! [`DrugDetector`] builds an annotation prompt from a label set, lets a
//! generation backend fill one `True`/`False` choice (and optionally a short
//! explanation) per label, and returns a flat [`DetectionResult`].
//!
//! Backends: a llama.cpp HTTP server, an in-process llama.cpp model (`llm`
//! feature), or a keyword mock for tests.

pub mod backends;
pub mod config;
pub mod detector;
pub mod prompts;

pub use backends::{load_backend, MockBackend, ServerBackend};
pub use config::{BackendKind, ConfigError, DetectorConfig, DeviceHint};
pub use detector::{DetectOptions, DrugDetector};
pub use drug_detector_core::{
    AnnotationError, Decision, DetectionResult, Example, GenerationBackend, LabelSet,
};
