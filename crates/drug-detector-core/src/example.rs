//! Few-shot demonstration examples.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::error::{AnnotationError, AnnotationResult};

/// A demonstration note with its ground-truth answer per label.
///
/// Deserializes from a flat object: `{"text": "...", "Heroin": true, "Cocaine": "False"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    #[serde(flatten)]
    pub answers: BTreeMap<String, Decision>,
}

impl Example {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            answers: BTreeMap::new(),
        }
    }

    /// Builder-style answer setter.
    pub fn with_answer(mut self, label: impl Into<String>, answer: impl Into<Decision>) -> Self {
        self.answers.insert(label.into(), answer.into());
        self
    }

    /// Ground-truth boolean for a label.
    ///
    /// Fails when the label is missing or its value does not normalize to a boolean.
    pub fn answer_for(&self, label: &str) -> AnnotationResult<bool> {
        let answer = self
            .answers
            .get(label)
            .ok_or_else(|| AnnotationError::MalformedExample {
                text: self.text.clone(),
                reason: format!("missing answer for label '{}'", label),
            })?;

        answer
            .clone()
            .normalize()
            .as_bool()
            .ok_or_else(|| AnnotationError::MalformedExample {
                text: self.text.clone(),
                reason: format!("answer for '{}' is not boolean-like: {}", label, answer),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_flat() {
        let json = r#"{"text": "Pt smokes marijuana daily", "Cannabis": true, "Heroin": "no"}"#;
        let example: Example = serde_json::from_str(json).unwrap();

        assert_eq!(example.text, "Pt smokes marijuana daily");
        assert!(example.answer_for("Cannabis").unwrap());
        assert!(!example.answer_for("Heroin").unwrap());
    }

    #[test]
    fn test_missing_label_is_malformed() {
        let example = Example::new("note").with_answer("Cannabis", true);
        let err = example.answer_for("Heroin").unwrap_err();
        assert!(matches!(err, AnnotationError::MalformedExample { .. }));
    }

    #[test]
    fn test_unrecognized_answer_is_malformed() {
        let example = Example::new("note").with_answer("Cannabis", "sometimes");
        assert!(example.answer_for("Cannabis").is_err());
    }
}
