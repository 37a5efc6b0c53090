//! Keyword backend for testing without actual LLM inference.
//!
//! Reads the note and the label being asked about back out of the prompt and
//! answers with simple term matching. A term counts as denied when a negation
//! word precedes it in the same clause. Clauses end at sentence punctuation or
//! a contrast word ("but", "however"), so a denial covers a comma-separated list.

use drug_detector_core::{BackendError, BackendResult, GenerationBackend};

use crate::prompts::{FEEDBACK_HEADER, TARGET_TEXT_HEADER};

/// Words that negate a following term within a clause.
const NEGATION_WORDS: &[&str] = &[
    "denies", "denied", "deny", "denying", "no", "not", "never", "negative", "without",
];

/// Clause separators besides punctuation.
const CLAUSE_BREAKS: &[&str] = &[" but ", " however ", " although ", " though "];

/// Minimum Jaro-Winkler similarity for a misspelled term to match.
const FUZZY_THRESHOLD: f64 = 0.93;

/// Shortest term eligible for fuzzy matching.
const FUZZY_MIN_LEN: usize = 6;

/// Terms that indicate a substance.
#[derive(Debug, Clone)]
pub struct SubstanceTerms {
    /// Label name this entry answers for (matched case-insensitively)
    pub label: String,
    pub terms: Vec<String>,
    /// Counts toward a general drug-use label
    pub illicit: bool,
}

impl SubstanceTerms {
    pub fn new(label: &str, terms: &[&str], illicit: bool) -> Self {
        Self {
            label: label.to_string(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            illicit,
        }
    }
}

/// What the note says about a substance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Use reported; carries the matched term
    Reported(String),
    /// Use explicitly denied; carries the matched term
    Denied(String),
    NotMentioned,
}

/// Deterministic keyword backend.
pub struct MockBackend {
    vocabulary: Vec<SubstanceTerms>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            vocabulary: default_vocabulary(),
        }
    }

    /// Add or replace the terms for a label.
    pub fn with_terms(mut self, label: &str, terms: &[&str], illicit: bool) -> Self {
        self.vocabulary
            .retain(|entry| !entry.label.eq_ignore_ascii_case(label));
        self.vocabulary.push(SubstanceTerms::new(label, terms, illicit));
        self
    }

    /// Classify what `text` says about `label`.
    pub fn classify(&self, text: &str, label: &str) -> Finding {
        if is_general_label(label) {
            return self.classify_general(text);
        }

        let fallback;
        let terms = match self.terms_for(label) {
            Some(entry) => &entry.terms,
            None => {
                fallback = vec![label.to_lowercase()];
                &fallback
            }
        };
        find_terms(text, terms)
    }

    fn classify_general(&self, text: &str) -> Finding {
        let mut denied = None;
        for entry in self.vocabulary.iter().filter(|e| e.illicit) {
            match find_terms(text, &entry.terms) {
                Finding::Reported(term) => return Finding::Reported(term),
                Finding::Denied(term) => denied = denied.or(Some(term)),
                Finding::NotMentioned => {}
            }
        }
        denied.map(Finding::Denied).unwrap_or(Finding::NotMentioned)
    }

    fn terms_for(&self, label: &str) -> Option<&SubstanceTerms> {
        self.vocabulary
            .iter()
            .find(|entry| entry.label.eq_ignore_ascii_case(label))
    }

    fn explain(&self, text: &str, label: &str) -> String {
        match self.classify(text, label) {
            Finding::Reported(term) => format!("The note reports {} use", term),
            Finding::Denied(term) => format!("The patient denies {} use", term),
            Finding::NotMentioned => {
                format!("There is no mention of {} use in the note", label.to_lowercase())
            }
        }
    }
}

impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate(&self, prompt: &str, stop: &[String], max_tokens: usize) -> BackendResult<String> {
        let label = explanation_label(prompt).ok_or_else(|| {
            BackendError::Generation("mock backend can only generate explanations".into())
        })?;
        let text = target_text(prompt)
            .ok_or_else(|| BackendError::Generation("no medical text in prompt".into()))?;

        let explanation = self.explain(text, label);
        let capped = explanation
            .split_whitespace()
            .take(max_tokens)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(drug_detector_core::truncate_at_stop(&capped, stop).to_string())
    }

    fn select(&self, prompt: &str, options: &[String]) -> BackendResult<usize> {
        let position = |wanted: &str| options.iter().position(|o| o.eq_ignore_ascii_case(wanted));
        let (Some(yes), Some(no)) = (position("True"), position("False")) else {
            return Ok(0);
        };

        let label = answer_label(prompt)
            .ok_or_else(|| BackendError::Generation("no label being answered in prompt".into()))?;
        let text = target_text(prompt)
            .ok_or_else(|| BackendError::Generation("no medical text in prompt".into()))?;

        match self.classify(text, label) {
            Finding::Reported(_) => Ok(yes),
            Finding::Denied(_) | Finding::NotMentioned => Ok(no),
        }
    }
}

/// The note under evaluation, as embedded in the prompt.
fn target_text(prompt: &str) -> Option<&str> {
    let start = prompt.rfind(TARGET_TEXT_HEADER)? + TARGET_TEXT_HEADER.len();
    let rest = &prompt[start..];
    Some(match rest.find(FEEDBACK_HEADER) {
        Some(end) => &rest[..end],
        None => rest,
    })
}

/// Label from a trailing `"{label} Use: "` line.
fn answer_label(prompt: &str) -> Option<&str> {
    let last_line = prompt.rsplit('\n').next()?;
    last_line.strip_suffix(" Use: ").filter(|l| !l.is_empty())
}

/// Label from the last `"Explanation for {label} Use:"` line.
fn explanation_label(prompt: &str) -> Option<&str> {
    const MARKER: &str = "Explanation for ";
    let start = prompt.rfind(MARKER)? + MARKER.len();
    let rest = &prompt[start..];
    let end = rest.find(" Use:")?;
    Some(&rest[..end])
}

fn is_general_label(label: &str) -> bool {
    label.to_lowercase().starts_with("general")
}

/// Look for any term in `text`, clause by clause.
fn find_terms(text: &str, terms: &[String]) -> Finding {
    let mut denied = None;
    for clause in split_clauses(text) {
        let clause_words = words(&clause);
        for term in terms {
            if let Some(idx) = match_term(&clause_words, term) {
                if clause_words[..idx].iter().any(|w| NEGATION_WORDS.contains(w)) {
                    denied = denied.or_else(|| Some(term.clone()));
                } else {
                    return Finding::Reported(term.clone());
                }
            }
        }
    }
    denied.map(Finding::Denied).unwrap_or(Finding::NotMentioned)
}

fn split_clauses(text: &str) -> Vec<String> {
    let mut lower = text.to_lowercase();
    for brk in CLAUSE_BREAKS {
        lower = lower.replace(brk, "|");
    }
    lower
        .split(|c: char| matches!(c, '|' | '.' | ';' | '\n'))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

fn words(clause: &str) -> Vec<&str> {
    clause
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Index of the first word where `term` matches, exactly or by close spelling.
fn match_term(words: &[&str], term: &str) -> Option<usize> {
    let term_words: Vec<&str> = term.split_whitespace().collect();
    if term_words.is_empty() || term_words.len() > words.len() {
        return None;
    }

    if term_words.len() > 1 {
        return words
            .windows(term_words.len())
            .position(|window| window == term_words.as_slice());
    }

    let term = term_words[0];
    words.iter().position(|w| {
        *w == term
            || (term.len() >= FUZZY_MIN_LEN
                && w.len() >= FUZZY_MIN_LEN
                && strsim::jaro_winkler(w, term) >= FUZZY_THRESHOLD)
    })
}

fn default_vocabulary() -> Vec<SubstanceTerms> {
    vec![
        SubstanceTerms::new("Heroin", &["heroin", "dope", "smack", "diacetylmorphine"], true),
        SubstanceTerms::new("Cocaine", &["cocaine", "crack", "coke"], true),
        SubstanceTerms::new(
            "Methamphetamine",
            &["methamphetamine", "meth", "crystal meth", "amphetamine", "amphetamines"],
            true,
        ),
        SubstanceTerms::new(
            "Benzodiazepine",
            &[
                "benzodiazepine", "benzodiazepines", "benzo", "benzos", "xanax", "alprazolam",
                "valium", "diazepam", "klonopin", "clonazepam", "ativan", "lorazepam",
            ],
            true,
        ),
        SubstanceTerms::new(
            "Prescription Opioids",
            &[
                "oxycodone", "oxycontin", "percocet", "vicodin", "hydrocodone", "opioid pills",
                "pain pills",
            ],
            true,
        ),
        SubstanceTerms::new("Cannabis", &["cannabis", "marijuana", "thc", "weed"], true),
        SubstanceTerms::new(
            "Injection Drugs",
            &["ivdu", "idu", "ivda", "injects", "injecting", "injection", "injected", "needles"],
            true,
        ),
        SubstanceTerms::new("Fentanyl", &["fentanyl"], true),
        SubstanceTerms::new(
            "Alcohol",
            &["alcohol", "ethanol", "etoh", "beer", "wine", "liquor", "vodka"],
            false,
        ),
        SubstanceTerms::new("Tobacco", &["tobacco", "cigarettes", "smoker", "nicotine"], false),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_in_first_clause() {
        let mock = MockBackend::new();
        let text = "Patient denies using heroin but reports cocaine use.";

        assert_eq!(mock.classify(text, "Heroin"), Finding::Denied("heroin".into()));
        assert_eq!(mock.classify(text, "Cocaine"), Finding::Reported("cocaine".into()));
        assert_eq!(mock.classify(text, "Cannabis"), Finding::NotMentioned);
        assert_eq!(mock.classify(text, "General Drugs"), Finding::Reported("cocaine".into()));
    }

    #[test]
    fn test_synonyms_and_contrast_clauses() {
        let mock = MockBackend::new();
        let text = "Patient heavily used ethanol for several mos, but denies any fentanyl use.";

        assert_eq!(mock.classify(text, "Alcohol"), Finding::Reported("ethanol".into()));
        assert_eq!(mock.classify(text, "Fentanyl"), Finding::Denied("fentanyl".into()));
        // Alcohol is not an illicit substance
        assert_eq!(mock.classify(text, "General Drugs"), Finding::Denied("fentanyl".into()));
    }

    #[test]
    fn test_fuzzy_spelling() {
        let mock = MockBackend::new();
        assert_eq!(
            mock.classify("Hx of cocain use", "Cocaine"),
            Finding::Reported("cocaine".into())
        );
        // Short terms must match exactly
        assert_eq!(mock.classify("Takes methadone daily", "Methamphetamine"), Finding::NotMentioned);
    }

    #[test]
    fn test_unknown_label_uses_its_name() {
        let mock = MockBackend::new();
        assert_eq!(
            mock.classify("Chews kratom leaves", "Kratom"),
            Finding::Reported("kratom".into())
        );
    }

    #[test]
    fn test_custom_terms() {
        let mock = MockBackend::new().with_terms("Kratom", &["mitragyna"], true);
        assert_eq!(
            mock.classify("Uses mitragyna tea", "kratom"),
            Finding::Reported("mitragyna".into())
        );
        assert_eq!(mock.classify("Uses mitragyna tea", "General Drugs"), Finding::Reported("mitragyna".into()));
    }

    #[test]
    fn test_prompt_parsing() {
        let prompt = "### The medical text to evaluate:\nSmokes weed.\n<|eot_id|>### Feedback:\nExplanation for Cannabis Use:\n ";
        assert_eq!(target_text(prompt).map(str::trim_end), Some("Smokes weed.\n<|eot_id|>"));
        assert_eq!(explanation_label(prompt), Some("Cannabis"));

        let prompt = "x\nPrescription Opioids Use: ";
        assert_eq!(answer_label(prompt), Some("Prescription Opioids"));
        assert_eq!(answer_label("no label here"), None);
    }

    #[test]
    fn test_select_and_generate() {
        let mock = MockBackend::new();
        let options = vec!["True".to_string(), "False".to_string()];
        let base = "### The medical text to evaluate:\nSmokes weed daily\n### Feedback:\n";

        let answer = format!("{}Cannabis Use: ", base);
        assert_eq!(mock.select(&answer, &options).unwrap(), 0);

        let answer = format!("{}Heroin Use: ", base);
        assert_eq!(mock.select(&answer, &options).unwrap(), 1);

        let explain = format!("{}Explanation for Cannabis Use:\n ", base);
        let stop = vec!["\n".to_string(), ".".to_string()];
        assert_eq!(
            mock.generate(&explain, &stop, 64).unwrap(),
            "The note reports weed use"
        );
        assert_eq!(mock.generate(&explain, &stop, 3).unwrap(), "The note reports");
    }

    #[test]
    fn test_select_without_boolean_options() {
        let mock = MockBackend::new();
        let options = vec!["A".to_string(), "B".to_string()];
        assert_eq!(mock.select("anything", &options).unwrap(), 0);
    }
}
