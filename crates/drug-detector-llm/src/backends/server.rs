//! llama.cpp server backend.
//!
//! Talks to the `/completion` endpoint of a running `llama-server`. Choices are
//! constrained server-side with a GBNF grammar built from the options.

use std::time::Duration;

use drug_detector_core::{truncate_at_stop, BackendError, BackendResult, GenerationBackend};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::prompts::choice_grammar;

/// Default llama.cpp server address.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

/// Extra tokens allowed on top of the longest option when selecting.
const SELECT_TOKEN_SLACK: usize = 4;

/// Request body for `/completion`.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    grammar: Option<String>,
    cache_prompt: bool,
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

/// Response body from `/completion` (only the fields used).
#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

/// Normalize server base URL by stripping trailing slashes and a `/completion` suffix.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    url.strip_suffix("/completion").unwrap_or(url).to_string()
}

/// Check if a URL points to a local address.
fn is_local_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => match parsed.host() {
            Some(url::Host::Domain(d)) => d == "localhost",
            Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
            Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
            None => true,
        },
        Err(_) => true,
    }
}

/// Find which option the server produced.
fn match_option(content: &str, options: &[String]) -> Option<usize> {
    options
        .iter()
        .position(|o| o == content)
        .or_else(|| options.iter().position(|o| o == content.trim()))
        .or_else(|| {
            options
                .iter()
                .position(|o| o.eq_ignore_ascii_case(content.trim()))
        })
}

fn map_reqwest_error(e: reqwest::Error) -> BackendError {
    if e.is_connect() {
        BackendError::Unavailable(e.to_string())
    } else if e.is_decode() {
        BackendError::InvalidResponse(e.to_string())
    } else {
        BackendError::Request(e.to_string())
    }
}

/// Backend for a llama.cpp HTTP server.
pub struct ServerBackend {
    base_url: String,
    client: Client,
    temperature: f32,
}

impl ServerBackend {
    /// Create a backend with no request timeout.
    pub fn new(base_url: &str) -> BackendResult<Self> {
        Self::with_timeout(base_url, None)
    }

    /// Create a backend with an optional request timeout.
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Load(format!("failed to build HTTP client: {}", e)))?;
        let base_url = normalize_base_url(base_url);

        if !is_local_url(&base_url) {
            warn!(
                "Endpoint '{}' is not a local address; medical notes will leave this machine.",
                base_url
            );
        }

        Ok(Self {
            base_url,
            client,
            temperature: 0.0,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the server's `/health` endpoint.
    pub fn check_health(&self) -> BackendResult<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().map_err(map_reqwest_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format!(
                "{} returned HTTP {}",
                url,
                response.status()
            )))
        }
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> BackendResult<String> {
        let url = format!("{}/completion", self.base_url);
        debug!(url = %url, n_predict = request.n_predict, constrained = request.grammar.is_some(), "completion request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Request(format!("HTTP {}: {}", status, body)));
        }

        let body: CompletionResponse = response.json().map_err(map_reqwest_error)?;
        Ok(body.content)
    }
}

impl GenerationBackend for ServerBackend {
    fn name(&self) -> &str {
        "llama-server"
    }

    fn generate(&self, prompt: &str, stop: &[String], max_tokens: usize) -> BackendResult<String> {
        let request = CompletionRequest {
            prompt,
            n_predict: max_tokens,
            temperature: self.temperature,
            stop,
            grammar: None,
            cache_prompt: true,
        };
        let content = self.complete(&request)?;
        Ok(truncate_at_stop(&content, stop).to_string())
    }

    fn select(&self, prompt: &str, options: &[String]) -> BackendResult<usize> {
        if options.is_empty() {
            return Err(BackendError::Generation("no options to select from".into()));
        }

        let longest = options.iter().map(|o| o.chars().count()).max().unwrap_or(0);
        let request = CompletionRequest {
            prompt,
            n_predict: longest + SELECT_TOKEN_SLACK,
            temperature: self.temperature,
            stop: &[],
            grammar: Some(choice_grammar(options)),
            cache_prompt: true,
        };
        let content = self.complete(&request)?;

        match_option(&content, options).ok_or_else(|| {
            BackendError::InvalidResponse(format!(
                "server answered {:?}, expected one of {:?}",
                content, options
            ))
        })
    }
}
