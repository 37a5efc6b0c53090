//! Error types.

use thiserror::Error;

/// Generation backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generation error: {0}")]
    Generation(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Annotation failure. Everything that can go wrong inside a detection call.
#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Malformed example ({reason}): {text}")]
    MalformedExample { text: String, reason: String },

    #[error("Invalid label name '{name}': {reason}")]
    InvalidLabel { name: String, reason: String },

    #[error("Missing capture for slot: {0}")]
    MissingCapture(String),
}

pub type AnnotationResult<T> = Result<T, AnnotationError>;
