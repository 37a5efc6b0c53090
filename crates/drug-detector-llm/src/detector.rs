//! The substance-use annotator.

use std::error::Error as _;
use std::time::Instant;

use drug_detector_core::{
    convert_bools, execute, AnnotationError, AnnotationResult, ChatTemplate, Decision,
    DetectionResult, Example, GenerationBackend, LabelDecision, LabelSet,
};
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use crate::backends::load_backend;
use crate::config::DetectorConfig;
use crate::prompts::{
    build_annotation_program, decision_slot, explanation_slot, PromptRequest,
    DEFAULT_EXPLANATION_TOKENS,
};

/// Per-call options for [`DrugDetector::detect`].
#[derive(Debug, Clone, Default)]
pub struct DetectOptions {
    /// Replaces the detector's active label set (and stays active afterwards)
    pub labels: Option<LabelSet>,
    /// System preamble
    pub persona: Option<String>,
    pub examples: Vec<Example>,
    /// Generate an explanation before each decision
    pub explain: bool,
}

impl DetectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(mut self, labels: LabelSet) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn examples(mut self, examples: Vec<Example>) -> Self {
        self.examples = examples;
        self
    }

    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }
}

/// Classifies substance use in medical notes with a generation backend.
///
/// `detect` takes `&mut self` because a per-call label set replaces the active
/// one. A detector serves one request at a time; share it across threads only
/// behind a lock.
pub struct DrugDetector {
    backend: Box<dyn GenerationBackend>,
    labels: LabelSet,
    initial_labels: LabelSet,
    template: ChatTemplate,
    explanation_tokens: usize,
    verbose: bool,
}

impl DrugDetector {
    /// Create a detector over the default substances.
    pub fn new(backend: Box<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            labels: LabelSet::default(),
            initial_labels: LabelSet::default(),
            template: ChatTemplate::default(),
            explanation_tokens: DEFAULT_EXPLANATION_TOKENS,
            verbose: false,
        }
    }

    /// Load the configured backend and build a detector around it.
    pub fn from_config(config: &DetectorConfig) -> AnnotationResult<Self> {
        let backend = load_backend(config)?;
        Ok(Self::new(backend)
            .with_labels(config.label_set())
            .with_template(config.template)
            .with_explanation_tokens(config.explanation_tokens)
            .with_verbose(config.verbose))
    }

    /// Set the label set used at construction (and restored by [`Self::reset_labels`]).
    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.initial_labels = labels.clone();
        self.labels = labels;
        self
    }

    pub fn with_template(mut self, template: ChatTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_explanation_tokens(mut self, tokens: usize) -> Self {
        self.explanation_tokens = tokens;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Currently active labels.
    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn set_labels(&mut self, labels: LabelSet) {
        self.labels = labels;
    }

    /// Restore the label set the detector was built with.
    pub fn reset_labels(&mut self) {
        self.labels = self.initial_labels.clone();
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Annotate a note. Returns `None` on any failure; the error is logged.
    pub fn detect(&mut self, medical_text: &str, options: DetectOptions) -> Option<DetectionResult> {
        match self.try_detect(medical_text, options) {
            Ok(result) => Some(result),
            Err(e) => {
                let mut causes = Vec::new();
                let mut source = e.source();
                while let Some(cause) = source {
                    causes.push(cause.to_string());
                    source = cause.source();
                }
                error!(error = %e, causes = ?causes, "An error occurred during annotation");
                None
            }
        }
    }

    /// Annotate a note, returning the failure instead of logging it.
    pub fn try_detect(
        &mut self,
        medical_text: &str,
        options: DetectOptions,
    ) -> AnnotationResult<DetectionResult> {
        let DetectOptions {
            labels,
            persona,
            examples,
            explain,
        } = options;

        if let Some(labels) = labels {
            self.labels = labels;
        }

        let request_id = Uuid::new_v4();
        let span = info_span!(
            "detect",
            %request_id,
            backend = self.backend.name(),
            labels = self.labels.len(),
            explain
        );
        let _guard = span.enter();

        let program = build_annotation_program(&PromptRequest {
            labels: &self.labels,
            medical_text,
            persona: persona.as_deref(),
            examples: &examples,
            explain,
            explanation_tokens: self.explanation_tokens,
        })?;

        let prompt = program.render_prefix(self.template);
        if self.verbose {
            info!(prompt = %prompt, "Annotation prompt");
        } else {
            debug!(prompt_chars = prompt.len(), "Annotation prompt built");
        }

        let start = Instant::now();
        let captures = execute(&program, self.template, self.backend.as_ref())?;
        let time_taken = start.elapsed().as_secs_f64();

        let mut raw = Vec::with_capacity(self.labels.len());
        for label in &self.labels {
            let slot = decision_slot(&label.name);
            let value = captures
                .get(&slot)
                .ok_or_else(|| AnnotationError::MissingCapture(slot.clone()))?;
            raw.push((label.name.clone(), Decision::from(value)));
        }

        let mut decisions = Vec::with_capacity(raw.len());
        for (label, decision) in convert_bools(raw) {
            let explanation = if explain {
                let slot = explanation_slot(&label);
                let text = captures
                    .get(&slot)
                    .ok_or_else(|| AnnotationError::MissingCapture(slot.clone()))?;
                // The period was consumed as a stop sequence
                Some(format!("{}.", text.trim()))
            } else {
                None
            };
            decisions.push(LabelDecision {
                label,
                decision,
                explanation,
            });
        }

        let result = DetectionResult {
            medical_text: medical_text.to_string(),
            time_taken,
            decisions,
        };

        if self.verbose {
            info!(present = ?result.present_labels(), time_taken, "Annotation complete");
        } else {
            debug!(present = ?result.present_labels(), time_taken, "Annotation complete");
        }

        Ok(result)
    }
}
