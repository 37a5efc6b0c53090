//! Ad-hoc detection run.
//!
//! ```text
//! DRUG_DETECTOR_BACKEND=mock cargo run -p drug-detector-llm --example detect
//! cargo run -p drug-detector-llm --example detect -- detector.toml
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use drug_detector_llm::{DetectOptions, DetectorConfig, DrugDetector, LabelSet};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = DetectorConfig::load(config_path.as_deref()).context("loading configuration")?;
    let mut detector = DrugDetector::from_config(&config).context("loading backend")?;

    let Some(result) = detector.detect(
        "Patient denies using heroin but reports cocaine use.",
        DetectOptions::new(),
    ) else {
        bail!("annotation failed");
    };
    println!("{}", serde_json::to_string_pretty(&result)?);

    let drugs = LabelSet::from_pairs([
        (
            "Alcohol",
            "Alcohol is a legal substance but can be abused and lead to addiction and various health issues.",
        ),
        (
            "Fentanyl",
            "Fentanyl is a potent synthetic opioid that is highly addictive and can lead to overdose, especially when used illicitly.",
        ),
    ]);
    let Some(result) = detector.detect(
        "Patient was using ethanol and fentanyl for several months.",
        DetectOptions::new().labels(drugs).explain(true),
    ) else {
        bail!("annotation failed");
    };
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
