//! Detection results.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::decision::Decision;

/// Key holding the evaluated note in the flat view.
pub const MEDICAL_TEXT_KEY: &str = "medical_text";
/// Key holding the generation time in the flat view.
pub const TIME_TAKEN_KEY: &str = "time_taken";
/// Suffix appended to a label name for its explanation key.
pub const EXPLANATION_SUFFIX: &str = "_explanation";

/// Flat-view key for a label's explanation.
pub fn explanation_key(label: &str) -> String {
    format!("{}{}", label, EXPLANATION_SUFFIX)
}

/// Decision for one label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelDecision {
    pub label: String,
    pub decision: Decision,
    /// Present only when explanations were requested
    pub explanation: Option<String>,
}

/// Result of one detection call.
///
/// Decisions are kept in label-set order. [`DetectionResult::to_map`] and the
/// `Serialize` impl produce the flat record: one entry per label, `medical_text`,
/// `time_taken`, and `{label}_explanation` entries when present.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub medical_text: String,
    /// Seconds spent in generation
    pub time_taken: f64,
    pub decisions: Vec<LabelDecision>,
}

impl DetectionResult {
    /// Decision for a label.
    pub fn decision(&self, label: &str) -> Option<&Decision> {
        self.find(label).map(|d| &d.decision)
    }

    /// Whether the label was decided `true`. Unrecognized values count as not present.
    pub fn is_present(&self, label: &str) -> bool {
        self.decision(label).is_some_and(Decision::is_true)
    }

    /// Explanation for a label, if one was generated.
    pub fn explanation(&self, label: &str) -> Option<&str> {
        self.find(label).and_then(|d| d.explanation.as_deref())
    }

    /// Labels in result order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.decisions.iter().map(|d| d.label.as_str())
    }

    /// Labels decided `true`.
    pub fn present_labels(&self) -> Vec<&str> {
        self.decisions
            .iter()
            .filter(|d| d.decision.is_true())
            .map(|d| d.label.as_str())
            .collect()
    }

    pub fn has_explanations(&self) -> bool {
        self.decisions.iter().any(|d| d.explanation.is_some())
    }

    /// Flat record view.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for d in &self.decisions {
            let value = match &d.decision {
                Decision::Bool(b) => Value::Bool(*b),
                Decision::Text(s) => Value::String(s.clone()),
            };
            map.insert(d.label.clone(), value);
        }
        map.insert(
            MEDICAL_TEXT_KEY.to_string(),
            Value::String(self.medical_text.clone()),
        );
        map.insert(TIME_TAKEN_KEY.to_string(), Value::from(self.time_taken));
        for d in &self.decisions {
            if let Some(explanation) = &d.explanation {
                map.insert(explanation_key(&d.label), Value::String(explanation.clone()));
            }
        }
        map
    }

    fn find(&self, label: &str) -> Option<&LabelDecision> {
        self.decisions.iter().find(|d| d.label == label)
    }
}

impl Serialize for DetectionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for d in &self.decisions {
            map.serialize_entry(&d.label, &d.decision)?;
        }
        map.serialize_entry(MEDICAL_TEXT_KEY, &self.medical_text)?;
        map.serialize_entry(TIME_TAKEN_KEY, &self.time_taken)?;
        for d in &self.decisions {
            if let Some(explanation) = &d.explanation {
                map.serialize_entry(&explanation_key(&d.label), explanation)?;
            }
        }
        map.end()
    }
}
