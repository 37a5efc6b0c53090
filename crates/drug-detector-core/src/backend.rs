//! Generation backend abstraction and program execution.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{BackendError, BackendResult};
use crate::program::{ChatTemplate, Program, Segment};

/// A language model that can continue a prompt under constraints.
///
/// Implementations are synchronous: each call blocks until the model is done.
pub trait GenerationBackend: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Continue `prompt` with free text.
    ///
    /// Output must stop before the first occurrence of any `stop` string and
    /// must not include it. At most `max_tokens` tokens are produced.
    fn generate(&self, prompt: &str, stop: &[String], max_tokens: usize) -> BackendResult<String>;

    /// Continue `prompt` with exactly one of `options`, returning its index.
    fn select(&self, prompt: &str, options: &[String]) -> BackendResult<usize>;
}

impl<B: GenerationBackend + ?Sized> GenerationBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn generate(&self, prompt: &str, stop: &[String], max_tokens: usize) -> BackendResult<String> {
        (**self).generate(prompt, stop, max_tokens)
    }

    fn select(&self, prompt: &str, options: &[String]) -> BackendResult<usize> {
        (**self).select(prompt, options)
    }
}

/// Slot values captured while running a program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    values: HashMap<String, String>,
    /// Full rendered transcript including generated text
    pub transcript: String,
}

impl Captures {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Cut `text` at the earliest stop string.
pub fn truncate_at_stop<'a>(text: &'a str, stop: &[String]) -> &'a str {
    let cut = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min();
    match cut {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Run a program against a backend, filling every slot in order.
///
/// Each slot sees the prompt rendered so far, including earlier slot output.
pub fn execute<B: GenerationBackend + ?Sized>(
    program: &Program,
    template: ChatTemplate,
    backend: &B,
) -> BackendResult<Captures> {
    let mut captures = Captures::default();
    let prompt = &mut captures.transcript;

    for segment in program.segments() {
        match segment {
            Segment::RoleStart(role) => prompt.push_str(&template.role_start(*role)),
            Segment::RoleEnd(role) => prompt.push_str(template.role_end(*role)),
            Segment::Text(text) => prompt.push_str(text),
            Segment::Gen {
                name,
                stop,
                max_tokens,
            } => {
                let raw = backend.generate(prompt, stop, *max_tokens)?;
                // Backends should already honor stop strings
                let output = truncate_at_stop(&raw, stop).to_string();
                trace!(slot = %name, output = %output, "gen slot filled");
                prompt.push_str(&output);
                captures.values.insert(name.clone(), output);
            }
            Segment::Select { name, options } => {
                let idx = backend.select(prompt, options)?;
                let chosen = options.get(idx).ok_or_else(|| {
                    BackendError::InvalidResponse(format!(
                        "option index {} out of range for slot '{}' ({} options)",
                        idx,
                        name,
                        options.len()
                    ))
                })?;
                trace!(slot = %name, chosen = %chosen, "select slot filled");
                prompt.push_str(chosen);
                captures.values.insert(name.clone(), chosen.clone());
            }
        }
    }

    Ok(captures)
}
