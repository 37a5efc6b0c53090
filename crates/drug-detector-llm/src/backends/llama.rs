//! In-process llama.cpp backend (requires the `llm` feature).
//!
//! Free text is decoded greedily. Choices are made by scoring the
//! log-likelihood of each option as a continuation of the prompt, so the
//! output is always one of the options.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use drug_detector_core::{truncate_at_stop, BackendError, BackendResult, GenerationBackend};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel, Special};
use llama_cpp_2::token::LlamaToken;
use tracing::{debug, info};

fn generation_error(e: impl std::fmt::Display) -> BackendError {
    BackendError::Generation(e.to_string())
}

/// Token with the highest logit.
fn argmax(logits: &[f32]) -> Option<LlamaToken> {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| LlamaToken::new(i as i32))
}

/// Log-probability of `token` under `logits`.
fn log_prob(logits: &[f32], token: LlamaToken) -> f32 {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|l| (l - max).exp()).sum();
    let logit = logits.get(token.0 as usize).copied().unwrap_or(f32::NEG_INFINITY);
    logit - max - sum.ln()
}

/// GGUF model loaded into this process.
pub struct LlamaCppBackend {
    backend: LlamaBackend,
    model: LlamaModel,
    model_path: PathBuf,
    n_ctx: u32,
}

impl LlamaCppBackend {
    /// Load a GGUF model, offloading `gpu_layers` layers to the GPU.
    pub fn load(model_path: &Path, gpu_layers: u32, n_ctx: u32) -> BackendResult<Self> {
        if !model_path.is_file() {
            return Err(BackendError::Load(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        let backend = LlamaBackend::init().map_err(|e| BackendError::Load(e.to_string()))?;
        let params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
        let model = LlamaModel::load_from_file(&backend, model_path, &params)
            .map_err(|e| BackendError::Load(e.to_string()))?;

        info!(
            model = %model_path.display(),
            gpu_layers,
            n_ctx,
            "Loaded llama.cpp model"
        );

        Ok(Self {
            backend,
            model,
            model_path: model_path.to_path_buf(),
            n_ctx,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    fn new_context(&self) -> BackendResult<LlamaContext<'_>> {
        let params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.n_ctx))
            .with_n_batch(self.n_ctx);
        self.model
            .new_context(&self.backend, params)
            .map_err(generation_error)
    }

    fn tokenize(&self, text: &str, add_bos: AddBos) -> BackendResult<Vec<LlamaToken>> {
        self.model.str_to_token(text, add_bos).map_err(generation_error)
    }

    fn check_fits(&self, needed: usize) -> BackendResult<()> {
        if needed > self.n_ctx as usize {
            return Err(BackendError::Generation(format!(
                "{} tokens exceed the context window of {}",
                needed, self.n_ctx
            )));
        }
        Ok(())
    }

    /// Decode `tokens` at positions starting from `start_pos`.
    /// Logits are kept for batch indices `>= logits_from`.
    fn decode(
        ctx: &mut LlamaContext<'_>,
        tokens: &[LlamaToken],
        start_pos: i32,
        logits_from: usize,
    ) -> BackendResult<()> {
        let mut batch = LlamaBatch::new(tokens.len().max(1), 1);
        for (i, token) in tokens.iter().enumerate() {
            batch
                .add(*token, start_pos + i as i32, &[0], i >= logits_from)
                .map_err(generation_error)?;
        }
        ctx.decode(&mut batch).map_err(generation_error)
    }

    /// Sum of log-probabilities of `continuation` following `prompt`.
    fn score_continuation(
        &self,
        prompt: &[LlamaToken],
        continuation: &[LlamaToken],
    ) -> BackendResult<f32> {
        if prompt.is_empty() || continuation.is_empty() {
            return Err(BackendError::Generation("nothing to score".into()));
        }
        self.check_fits(prompt.len() + continuation.len())?;

        let all: Vec<LlamaToken> = prompt.iter().chain(continuation).copied().collect();
        let first_logit = prompt.len() - 1;

        let mut ctx = self.new_context()?;
        Self::decode(&mut ctx, &all, 0, first_logit)?;

        let score = continuation
            .iter()
            .enumerate()
            .map(|(j, token)| log_prob(ctx.get_logits_ith((first_logit + j) as i32), *token))
            .sum();
        Ok(score)
    }
}

impl GenerationBackend for LlamaCppBackend {
    fn name(&self) -> &str {
        "llama.cpp"
    }

    fn generate(&self, prompt: &str, stop: &[String], max_tokens: usize) -> BackendResult<String> {
        let tokens = self.tokenize(prompt, AddBos::Always)?;
        if tokens.is_empty() {
            return Err(BackendError::Generation("empty prompt".into()));
        }
        self.check_fits(tokens.len() + max_tokens)?;

        let mut ctx = self.new_context()?;
        Self::decode(&mut ctx, &tokens, 0, tokens.len() - 1)?;

        let mut logits_idx = tokens.len() as i32 - 1;
        let mut pos = tokens.len() as i32;
        let mut output = String::new();

        for _ in 0..max_tokens {
            let token = argmax(ctx.get_logits_ith(logits_idx))
                .ok_or_else(|| BackendError::Generation("model produced no logits".into()))?;
            if self.model.is_eog_token(token) {
                break;
            }

            let piece = self
                .model
                .token_to_str(token, Special::Tokenize)
                .map_err(generation_error)?;
            output.push_str(&piece);
            if stop.iter().any(|s| !s.is_empty() && output.contains(s.as_str())) {
                break;
            }

            Self::decode(&mut ctx, &[token], pos, 0)?;
            pos += 1;
            logits_idx = 0;
        }

        debug!(tokens = pos as usize - tokens.len(), "generated free text");
        Ok(truncate_at_stop(&output, stop).to_string())
    }

    fn select(&self, prompt: &str, options: &[String]) -> BackendResult<usize> {
        let prompt_tokens = self.tokenize(prompt, AddBos::Always)?;

        let mut best: Option<(usize, f32)> = None;
        for (idx, option) in options.iter().enumerate() {
            let option_tokens = self.tokenize(option, AddBos::Never)?;
            let score = self.score_continuation(&prompt_tokens, &option_tokens)?;
            debug!(option = %option, score, "scored option");
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        best.map(|(idx, _)| idx)
            .ok_or_else(|| BackendError::Generation("no options to select from".into()))
    }
}
