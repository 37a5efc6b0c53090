//! Drug Detector Core Library
//!
//! Domain types for classifying substance use in free-text medical notes with a
//! constrained-generation language model.
//!
//! # Flow
//!
//! ```text
//! LabelSet + note (+ persona, examples)
//!          │
//!          ▼
//!   Program (text │ gen slot │ select slot ...)
//!          │
//!          ▼   execute() against a GenerationBackend
//!   Captures (slot name → text)
//!          │
//!          ▼   str_to_bool normalization
//!   DetectionResult (label → Decision, medical_text, time_taken)
//! ```
//!
//! # Modules
//!
//! - [`labels`]: Ordered label sets and the default substances
//! - [`decision`]: Decisions and boolean normalization
//! - [`example`]: Few-shot examples
//! - [`program`]: Annotation programs and chat templates
//! - [`backend`]: Backend trait and program execution
//! - [`result`]: Detection results and their flat view
//! - [`error`]: Error types

pub mod backend;
pub mod decision;
pub mod error;
pub mod example;
pub mod labels;
pub mod program;
pub mod result;

// Re-export commonly used types
pub use backend::{execute, truncate_at_stop, Captures, GenerationBackend};
pub use decision::{convert_bools, str_to_bool, Decision};
pub use error::{AnnotationError, AnnotationResult, BackendError, BackendResult};
pub use example::Example;
pub use labels::{Label, LabelSet, DEFAULT_SUBSTANCES};
pub use program::{ChatTemplate, Program, Role, Segment};
pub use result::{explanation_key, DetectionResult, LabelDecision};
