//! Label sets: the substances a note is checked for.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single substance label with its description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// Label name as it appears in results (e.g., "Cocaine")
    pub name: String,
    /// Description shown to the model
    pub description: String,
}

impl Label {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Ordered mapping from label name to description.
///
/// Insertion order is the order labels are presented to the model and the
/// order of decisions in a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<Label>,
}

impl LabelSet {
    /// Create an empty label set.
    pub fn new() -> Self {
        Self { labels: Vec::new() }
    }

    /// Build a label set from `(name, description)` pairs, keeping first-seen order.
    pub fn from_pairs<I, N, D>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<String>,
        D: Into<String>,
    {
        let mut set = Self::new();
        for (name, description) in pairs {
            set.insert(name, description);
        }
        set
    }

    /// The built-in substance set used when no custom labels are configured.
    pub fn default_substances() -> Self {
        Self::from_pairs(DEFAULT_SUBSTANCES.iter().copied())
    }

    /// Insert a label. An existing name keeps its position and gets the new description.
    pub fn insert(&mut self, name: impl Into<String>, description: impl Into<String>) {
        let name = name.into();
        let description = description.into();
        match self.labels.iter_mut().find(|l| l.name == name) {
            Some(existing) => existing.description = description,
            None => self.labels.push(Label { name, description }),
        }
    }

    /// Remove a label by name, returning its description.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.labels.iter().position(|l| l.name == name)?;
        Some(self.labels.remove(idx).description)
    }

    /// Description for a label name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.description.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Label names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Label> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self::default_substances()
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;

    fn into_iter(self) -> Self::IntoIter {
        self.labels.iter()
    }
}

impl<N: Into<String>, D: Into<String>> FromIterator<(N, D)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (N, D)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

impl Serialize for LabelSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.labels.len()))?;
        for label in &self.labels {
            map.serialize_entry(&label.name, &label.description)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for LabelSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LabelSetVisitor;

        impl<'de> Visitor<'de> for LabelSetVisitor {
            type Value = LabelSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label names to descriptions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<LabelSet, A::Error> {
                let mut set = LabelSet::new();
                while let Some((name, description)) = access.next_entry::<String, String>()? {
                    set.insert(name, description);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(LabelSetVisitor)
    }
}

/// Default substances and their descriptions.
pub const DEFAULT_SUBSTANCES: &[(&str, &str)] = &[
    (
        "Heroin",
        "Heroin is an illegal opioid drug known for its high potential for addiction and overdose.",
    ),
    (
        "Cocaine",
        "Cocaine is a powerful stimulant drug that is often abused for its euphoric effects.",
    ),
    (
        "Methamphetamine",
        "Methamphetamine (including illicit amphetamine use, but not prescribed amphetamines for ADHD) is a potent central nervous system stimulant that is highly addictive.",
    ),
    (
        "Benzodiazepine",
        "Benzodiazepines are a class of psychoactive drugs commonly prescribed for anxiety, insomnia, and other conditions but can be abused for their sedative effects.",
    ),
    (
        "Prescription Opioids",
        "Prescription opioids (only if being misused or used illicitly, not if taken as prescribed) are medications typically prescribed for pain relief but can be highly addictive when misused.",
    ),
    (
        "Cannabis",
        "Cannabis, also known as marijuana, is often used recreationally or medicinally but can be illegal depending on the jurisdiction.",
    ),
    (
        "Injection Drugs",
        "Injection drug use (IDU, IVDA, IVDU) refers to the use of drugs administered via needles, often associated with higher risks of infectious diseases.",
    ),
    (
        "General Drugs",
        "General drug use refers to the use of any illegal or illicit substances.",
    ),
];
