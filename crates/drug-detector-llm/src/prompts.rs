//! Annotation prompts for substance-use detection.
//!
//! The prompt is built as a [`Program`]: static text plus one optional
//! explanation slot and one `True`/`False` choice per label.

use drug_detector_core::result::{MEDICAL_TEXT_KEY, TIME_TAKEN_KEY};
use drug_detector_core::{
    explanation_key, AnnotationError, AnnotationResult, Example, LabelSet, Program, Role,
};

/// Literal choices offered for every label.
pub const CHOICES: &[&str] = &["True", "False"];

/// Explanations end at the first newline or period.
pub const EXPLANATION_STOP: &[&str] = &["\n", "."];

/// Default token cap for one explanation.
pub const DEFAULT_EXPLANATION_TOKENS: usize = 64;

/// Header preceding the note under evaluation.
pub const TARGET_TEXT_HEADER: &str = "### The medical text to evaluate:\n";

/// Header opening the assistant's answers.
pub const FEEDBACK_HEADER: &str = "### Feedback:\n";

/// Task description shown before the label list.
pub const TASK_DESCRIPTION: &str = "### Task Description:
Please carefully review the following medical note for any mentions of drug use.
Specifically look for mentions of the following drugs:
";

/// Disambiguation rules shown after the label list.
pub const DISAMBIGUATION_NOTES: &str = "NOTE:
- If the patient denies using a particular drug, do not mark that drug as being present. For example, if the note says \"patient denied using heroin\", then set \"Heroin\" to false.
- If a regulated substance is only mentioned (for example, prescribed and taken as directed) with no indication of misuse or illicit use, do not mark it as being present.
- If there are no mentions of any drug use whatsoever, do not mark any of the substances as true.
";

/// Capture name for a label's choice slot.
pub fn decision_slot(label: &str) -> String {
    format!("decision:{}", label)
}

/// Capture name for a label's explanation slot.
pub fn explanation_slot(label: &str) -> String {
    format!("explanation:{}", label)
}

/// Line introducing a label's answer; the choice follows directly.
pub fn answer_line_prefix(label: &str) -> String {
    format!("{} Use: ", label)
}

/// Line introducing a label's explanation.
pub fn explanation_line_prefix(label: &str) -> String {
    format!("Explanation for {} Use:\n ", label)
}

/// Everything needed to build one annotation prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub labels: &'a LabelSet,
    pub medical_text: &'a str,
    pub persona: Option<&'a str>,
    pub examples: &'a [Example],
    pub explain: bool,
    pub explanation_tokens: usize,
}

/// Render the label list, one `name: description` per line.
pub fn format_label_list(labels: &LabelSet) -> String {
    labels
        .iter()
        .map(|l| format!("{}: {}", l.name, l.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the few-shot block. Each example is followed by its own answers.
pub fn format_examples(examples: &[Example], labels: &LabelSet) -> AnnotationResult<String> {
    let mut out = String::from("\n### Examples:\n");
    for example in examples {
        out.push_str(&format!("\nExample Medical Note: {}\n\nFeedback:\n", example.text));
        for label in labels {
            let answer = if example.answer_for(&label.name)? { "True" } else { "False" };
            out.push_str(&format!("{}{}\n", answer_line_prefix(&label.name), answer));
        }
    }
    Ok(out)
}

/// Check label names before they are rendered into a prompt.
pub fn validate_labels(labels: &LabelSet) -> AnnotationResult<()> {
    for label in labels {
        let reason = if label.name.trim().is_empty() {
            Some("name is empty")
        } else if label.name.contains('\n') {
            Some("name contains a newline")
        } else if label.name == MEDICAL_TEXT_KEY || label.name == TIME_TAKEN_KEY {
            Some("name is reserved for result metadata")
        } else if labels.names().any(|other| explanation_key(other) == label.name) {
            Some("name collides with another label's explanation key")
        } else {
            None
        };

        if let Some(reason) = reason {
            return Err(AnnotationError::InvalidLabel {
                name: label.name.clone(),
                reason: reason.into(),
            });
        }
    }
    Ok(())
}

/// Build the full annotation program.
pub fn build_annotation_program(request: &PromptRequest<'_>) -> AnnotationResult<Program> {
    validate_labels(request.labels)?;

    let mut program = Program::new();

    // Persona
    if let Some(persona) = request.persona.filter(|p| !p.is_empty()) {
        program
            .role_start(Role::System)
            .text(persona)
            .role_end(Role::System);
    }

    // Task, rules, examples and the note itself
    program
        .role_start(Role::User)
        .text(TASK_DESCRIPTION)
        .text(format_label_list(request.labels))
        .text("\n\n")
        .text(DISAMBIGUATION_NOTES);

    if !request.examples.is_empty() {
        program.text(format_examples(request.examples, request.labels)?);
    }

    program
        .text("\n")
        .text(TARGET_TEXT_HEADER)
        .text(request.medical_text)
        .text("\n")
        .role_end(Role::User);

    // Constrained answers
    program.role_start(Role::Assistant).text(FEEDBACK_HEADER);
    for label in request.labels {
        if request.explain {
            program
                .text(explanation_line_prefix(&label.name))
                .gen(
                    explanation_slot(&label.name),
                    EXPLANATION_STOP,
                    request.explanation_tokens,
                )
                .text("\n");
        }
        program
            .text(answer_line_prefix(&label.name))
            .select(decision_slot(&label.name), CHOICES)
            .text("\n");
    }
    program.role_end(Role::Assistant);

    Ok(program)
}

/// GBNF grammar that admits exactly one of `options`.
pub fn choice_grammar(options: &[String]) -> String {
    let alternatives = options
        .iter()
        .map(|o| format!("\"{}\"", escape_gbnf(o)))
        .collect::<Vec<_>>()
        .join(" | ");
    format!("root ::= {}", alternatives)
}

fn escape_gbnf(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}
