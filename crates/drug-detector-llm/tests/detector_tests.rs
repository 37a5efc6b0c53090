//! End-to-end detection tests against the keyword backend.

use std::io::Write;

use drug_detector_core::result::{MEDICAL_TEXT_KEY, TIME_TAKEN_KEY};
use drug_detector_core::ChatTemplate;
use drug_detector_llm::{
    BackendKind, DetectOptions, DetectorConfig, DrugDetector, Example, LabelSet, MockBackend,
    ServerBackend,
};

fn mock_detector() -> DrugDetector {
    DrugDetector::new(Box::new(MockBackend::new()))
}

fn alcohol_fentanyl() -> LabelSet {
    LabelSet::from_pairs([
        (
            "Alcohol",
            "Alcohol is a legal substance but can be abused and lead to addiction and various health issues.",
        ),
        (
            "Fentanyl",
            "Fentanyl is a potent synthetic opioid that is highly addictive and can lead to overdose, especially when used illicitly.",
        ),
    ])
}

/// Test case: note, labels expected true, labels expected false.
struct GoldenCase {
    id: &'static str,
    text: &'static str,
    present: &'static [&'static str],
    absent: &'static [&'static str],
}

fn default_label_cases() -> Vec<GoldenCase> {
    vec![
        GoldenCase {
            id: "denied-heroin-reported-cocaine",
            text: "Patient denies using heroin but reports cocaine use.",
            present: &["Cocaine", "General Drugs"],
            absent: &[
                "Heroin",
                "Methamphetamine",
                "Benzodiazepine",
                "Prescription Opioids",
                "Cannabis",
                "Injection Drugs",
            ],
        },
        GoldenCase {
            id: "ivdu-heroin",
            text: "45M with history of IVDU, injects heroin daily.",
            present: &["Heroin", "Injection Drugs", "General Drugs"],
            absent: &["Cocaine", "Cannabis", "Benzodiazepine"],
        },
        GoldenCase {
            id: "no-drug-use",
            text: "Patient presents with a sprained ankle after a fall.",
            present: &[],
            absent: &[
                "Heroin",
                "Cocaine",
                "Methamphetamine",
                "Benzodiazepine",
                "Prescription Opioids",
                "Cannabis",
                "Injection Drugs",
                "General Drugs",
            ],
        },
        GoldenCase {
            id: "all-denied",
            text: "Denies tobacco, marijuana, or other drug use.",
            present: &[],
            absent: &["Cannabis", "General Drugs"],
        },
    ]
}

#[test]
fn golden_default_labels() {
    let mut detector = mock_detector();

    for case in default_label_cases() {
        let result = detector
            .detect(case.text, DetectOptions::new())
            .unwrap_or_else(|| panic!("[{}] detection failed", case.id));

        for label in case.present {
            assert!(result.is_present(label), "[{}] expected {} true", case.id, label);
        }
        for label in case.absent {
            assert_eq!(
                result.decision(label).and_then(|d| d.as_bool()),
                Some(false),
                "[{}] expected {} false",
                case.id,
                label
            );
        }
    }
}

#[test]
fn custom_labels_alcohol_fentanyl() {
    let mut detector = mock_detector();
    let result = detector
        .detect(
            "Patient heavily used ethanol for several mos, but denies any fentanyl use.",
            DetectOptions::new().labels(alcohol_fentanyl()),
        )
        .unwrap();

    assert!(result.is_present("Alcohol"));
    assert!(!result.is_present("Fentanyl"));
    assert_eq!(result.labels().collect::<Vec<_>>(), vec!["Alcohol", "Fentanyl"]);
}

#[test]
fn explanations_for_every_label() {
    let mut detector = mock_detector();
    let result = detector
        .detect(
            "Patient heavily used ethanol for several mos, but denies any fentanyl use.",
            DetectOptions::new().labels(alcohol_fentanyl()).explain(true),
        )
        .unwrap();

    let map = result.to_map();
    for label in ["Alcohol", "Fentanyl"] {
        let key = format!("{}_explanation", label);
        let explanation = map[&key].as_str().unwrap();
        assert!(!explanation.trim().is_empty(), "empty explanation for {}", label);
        assert!(explanation.ends_with('.'));
    }
    assert_eq!(result.explanation("Alcohol"), Some("The note reports ethanol use."));
    assert_eq!(result.explanation("Fentanyl"), Some("The patient denies fentanyl use."));
}

#[test]
fn flat_record_has_exact_keys() {
    let mut detector = mock_detector();

    let result = detector
        .detect("Smokes marijuana on weekends.", DetectOptions::new())
        .unwrap();
    let map = result.to_map();
    let mut expected: Vec<String> = LabelSet::default().names().map(String::from).collect();
    expected.push(MEDICAL_TEXT_KEY.into());
    expected.push(TIME_TAKEN_KEY.into());
    expected.sort();
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, expected);
    assert_eq!(map[MEDICAL_TEXT_KEY], "Smokes marijuana on weekends.");
    assert!(map[TIME_TAKEN_KEY].as_f64().unwrap() >= 0.0);

    let result = detector
        .detect(
            "Drinks wine nightly.",
            DetectOptions::new().labels(alcohol_fentanyl()).explain(true),
        )
        .unwrap();
    let mut keys: Vec<String> = result.to_map().keys().cloned().collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "Alcohol",
            "Alcohol_explanation",
            "Fentanyl",
            "Fentanyl_explanation",
            "medical_text",
            "time_taken",
        ]
    );
}

#[test]
fn examples_and_persona_with_every_template() {
    let examples = vec![
        Example::new("Drinks a six-pack every night")
            .with_answer("Alcohol", true)
            .with_answer("Fentanyl", false),
        Example::new("Admitted after fentanyl overdose")
            .with_answer("Alcohol", "False")
            .with_answer("Fentanyl", "True"),
    ];

    for template in [ChatTemplate::Llama3, ChatTemplate::ChatMl, ChatTemplate::Plain] {
        let mut detector = mock_detector().with_template(template);
        let result = detector
            .detect(
                "Denies alcohol. Snorted fentanyl last week.",
                DetectOptions::new()
                    .labels(alcohol_fentanyl())
                    .persona("You are an addiction medicine physician.")
                    .examples(examples.clone())
                    .explain(true),
            )
            .unwrap_or_else(|| panic!("{:?} failed", template));

        assert!(!result.is_present("Alcohol"), "{:?}", template);
        assert!(result.is_present("Fentanyl"), "{:?}", template);
    }
}

#[test]
fn explanation_key_collision_returns_none() {
    let mut detector = mock_detector();
    let labels = LabelSet::from_pairs([
        ("Cocaine", "Cocaine use"),
        ("Cocaine_explanation", "Shadows the explanation entry"),
    ]);

    assert!(detector
        .detect(
            "Reports cocaine use.",
            DetectOptions::new().labels(labels).explain(true),
        )
        .is_none());
}

#[test]
fn unreachable_server_returns_none() {
    let backend = ServerBackend::new("http://127.0.0.1:9").unwrap();
    let mut detector = DrugDetector::new(Box::new(backend));

    assert!(detector
        .detect("Patient denies using heroin.", DetectOptions::new())
        .is_none());
}

#[test]
fn from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
backend = "mock"
template = "plain"

[labels]
Alcohol = "Alcohol use"
Cannabis = "Cannabis use"
"#
    )
    .unwrap();

    let config = DetectorConfig::from_file(file.path()).unwrap();
    assert_eq!(config.backend, BackendKind::Mock);

    let mut detector = DrugDetector::from_config(&config).unwrap();
    assert_eq!(detector.backend_name(), "mock");

    let result = detector
        .detect("Uses cannabis daily, no alcohol.", DetectOptions::new())
        .unwrap();
    assert!(result.is_present("Cannabis"));
    assert!(!result.is_present("Alcohol"));
}

#[test]
fn from_config_unreachable_server_fails() {
    let config = DetectorConfig {
        endpoint: "http://127.0.0.1:9".into(),
        ..Default::default()
    };
    assert!(DrugDetector::from_config(&config).is_err());
}
