//! Per-label decisions and boolean normalization.
//!
//! The model answers with literal tokens; [`str_to_bool`] maps the recognized
//! boolean spellings to real booleans. Anything else is kept verbatim as
//! [`Decision::Text`] so callers can see exactly what came back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Spellings normalized to `true` (compared case-insensitively).
pub const TRUE_TOKENS: &[&str] = &["true", "1", "yes", "y"];
/// Spellings normalized to `false` (compared case-insensitively).
pub const FALSE_TOKENS: &[&str] = &["false", "0", "no", "n"];

/// A label decision: a boolean, or a string that did not normalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Decision {
    Bool(bool),
    /// Unrecognized value, passed through unchanged
    Text(String),
}

impl Decision {
    /// Normalize this decision. Booleans are returned as-is; text goes through [`str_to_bool`].
    pub fn normalize(self) -> Self {
        match self {
            Decision::Bool(b) => Decision::Bool(b),
            Decision::Text(s) => str_to_bool(&s),
        }
    }

    /// The boolean value, if this decision is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Decision::Bool(b) => Some(*b),
            Decision::Text(_) => None,
        }
    }

    /// True only for `Decision::Bool(true)`.
    pub fn is_true(&self) -> bool {
        matches!(self, Decision::Bool(true))
    }
}

impl From<bool> for Decision {
    fn from(b: bool) -> Self {
        Decision::Bool(b)
    }
}

impl From<&str> for Decision {
    fn from(s: &str) -> Self {
        Decision::Text(s.to_string())
    }
}

impl From<String> for Decision {
    fn from(s: String) -> Self {
        Decision::Text(s)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Bool(true) => write!(f, "True"),
            Decision::Bool(false) => write!(f, "False"),
            Decision::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Convert a boolean-like string.
///
/// Unrecognized strings are returned unchanged as [`Decision::Text`]; they are
/// not coerced and not rejected.
pub fn str_to_bool(s: &str) -> Decision {
    let lower = s.to_lowercase();
    if TRUE_TOKENS.contains(&lower.as_str()) {
        Decision::Bool(true)
    } else if FALSE_TOKENS.contains(&lower.as_str()) {
        Decision::Bool(false)
    } else {
        Decision::Text(s.to_string())
    }
}

/// Normalize every value of a `(key, decision)` sequence, keeping order.
pub fn convert_bools<K, I>(entries: I) -> Vec<(K, Decision)>
where
    I: IntoIterator<Item = (K, Decision)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k, v.normalize()))
        .collect()
}
