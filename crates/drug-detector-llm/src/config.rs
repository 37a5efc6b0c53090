//! Detector configuration.
//!
//! Loaded from a TOML file, then overridden by environment variables:
//! DRUG_DETECTOR_BACKEND, DRUG_DETECTOR_MODEL, DRUG_DETECTOR_ENDPOINT,
//! DRUG_DETECTOR_CACHE_DIR, DRUG_DETECTOR_DEVICE, DRUG_DETECTOR_VERBOSE

use std::path::{Path, PathBuf};
use std::time::Duration;

use drug_detector_core::{ChatTemplate, LabelSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backends::server::DEFAULT_ENDPOINT;
use crate::prompts::DEFAULT_EXPLANATION_TOKENS;

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "Meta-Llama-3-8B-Instruct.Q4_K_M.gguf";

/// Default context window for local models.
pub const DEFAULT_CONTEXT_SIZE: u32 = 4096;

/// Layer count used to mean "offload everything".
const ALL_LAYERS: u32 = 999;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which backend serves generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// llama.cpp HTTP server (default)
    #[default]
    Server,
    /// GGUF model loaded in-process
    Local,
    /// Keyword matching, no model
    Mock,
}

impl BackendKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "server" | "llama-server" => Some(Self::Server),
            "local" | "llama.cpp" => Some(Self::Local),
            "mock" => Some(Self::Mock),
            _ => None,
        }
    }
}

/// Device placement hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceHint {
    /// Offload as much as the build supports
    #[default]
    Auto,
    Cpu,
    Gpu,
}

impl DeviceHint {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "cpu" => Some(Self::Cpu),
            "gpu" | "cuda" | "metal" | "vulkan" => Some(Self::Gpu),
            _ => None,
        }
    }

    /// Model layers to offload to the GPU.
    pub fn gpu_layers(&self) -> u32 {
        match self {
            DeviceHint::Cpu => 0,
            DeviceHint::Auto | DeviceHint::Gpu => ALL_LAYERS,
        }
    }
}

/// Everything needed to construct a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Model identifier or path (relative paths resolve against `cache_dir`)
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub device: DeviceHint,
    /// llama.cpp server address
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Custom label set; the default substances when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelSet>,
    /// Log prompts and answers at info level
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub template: ChatTemplate,
    /// Token cap for each explanation
    #[serde(default = "default_explanation_tokens")]
    pub explanation_tokens: usize,
    /// HTTP timeout; no timeout when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_context_size")]
    pub context_size: u32,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_explanation_tokens() -> usize {
    DEFAULT_EXPLANATION_TOKENS
}

fn default_context_size() -> u32 {
    DEFAULT_CONTEXT_SIZE
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            model: default_model(),
            cache_dir: None,
            device: DeviceHint::default(),
            endpoint: default_endpoint(),
            labels: None,
            verbose: false,
            template: ChatTemplate::default(),
            explanation_tokens: default_explanation_tokens(),
            request_timeout_secs: None,
            context_size: default_context_size(),
        }
    }
}

impl DetectorConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// File (or defaults) with environment overrides applied.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DRUG_DETECTOR_BACKEND") {
            self.backend = BackendKind::from_str(&v).ok_or_else(|| invalid("DRUG_DETECTOR_BACKEND", &v))?;
        }
        if let Some(v) = lookup("DRUG_DETECTOR_MODEL") {
            self.model = v;
        }
        if let Some(v) = lookup("DRUG_DETECTOR_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = lookup("DRUG_DETECTOR_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DRUG_DETECTOR_DEVICE") {
            self.device = DeviceHint::from_str(&v).ok_or_else(|| invalid("DRUG_DETECTOR_DEVICE", &v))?;
        }
        if let Some(v) = lookup("DRUG_DETECTOR_VERBOSE") {
            self.verbose = match v.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => return Err(invalid("DRUG_DETECTOR_VERBOSE", &v)),
            };
        }
        Ok(())
    }

    /// Location of the model, resolved against the cache directory.
    pub fn model_path(&self) -> PathBuf {
        let model = Path::new(&self.model);
        match &self.cache_dir {
            Some(dir) if model.is_relative() => dir.join(model),
            _ => model.to_path_buf(),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Active label set at construction.
    pub fn label_set(&self) -> LabelSet {
        self.labels.clone().unwrap_or_default()
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.backend, BackendKind::Server);
        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.template, ChatTemplate::Llama3);
        assert_eq!(config.explanation_tokens, 64);
        assert!(config.request_timeout().is_none());
        assert_eq!(config.label_set(), LabelSet::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = DetectorConfig::from_toml_str("").unwrap();
        assert_eq!(config, DetectorConfig::default());
    }

    #[test]
    fn test_toml_with_labels() {
        let config = DetectorConfig::from_toml_str(
            r#"
backend = "mock"
device = "cpu"
template = "chatml"
verbose = true
request_timeout_secs = 30

[labels]
Alcohol = "Alcohol can be abused."
Fentanyl = "Fentanyl is a potent synthetic opioid."
"#,
        )
        .unwrap();

        assert_eq!(config.backend, BackendKind::Mock);
        assert_eq!(config.device, DeviceHint::Cpu);
        assert_eq!(config.template, ChatTemplate::ChatMl);
        assert!(config.verbose);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));

        let labels = config.label_set();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("Fentanyl"), Some("Fentanyl is a potent synthetic opioid."));
    }

    #[test]
    fn test_bad_toml() {
        let err = DetectorConfig::from_toml_str("backend = \"quantum\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DRUG_DETECTOR_BACKEND", "local"),
            ("DRUG_DETECTOR_MODEL", "llama3.gguf"),
            ("DRUG_DETECTOR_CACHE_DIR", "/data/models"),
            ("DRUG_DETECTOR_DEVICE", "cuda"),
            ("DRUG_DETECTOR_VERBOSE", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = DetectorConfig::default();
        config
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.backend, BackendKind::Local);
        assert_eq!(config.device, DeviceHint::Gpu);
        assert!(config.verbose);
        assert_eq!(config.model_path(), PathBuf::from("/data/models/llama3.gguf"));
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = DetectorConfig::default();
        let err = config
            .apply_env_from(|k| (k == "DRUG_DETECTOR_DEVICE").then(|| "tpu".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_absolute_model_ignores_cache_dir() {
        let config = DetectorConfig {
            model: "/opt/models/m.gguf".into(),
            cache_dir: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        assert_eq!(config.model_path(), PathBuf::from("/opt/models/m.gguf"));
    }

    #[test]
    fn test_device_layers() {
        assert_eq!(DeviceHint::Cpu.gpu_layers(), 0);
        assert!(DeviceHint::Auto.gpu_layers() > 0);
        assert_eq!(DeviceHint::from_str("Metal"), Some(DeviceHint::Gpu));
    }
}
