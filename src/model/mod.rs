mod llama;
mod loader;
mod mistral;
mod pair;

pub use llama::LlamaModel;
pub use loader::download_model;
pub use mistral::MistralModel;
pub use pair::{load_pair, TextBackend};

use std::fmt;

use candle_core::Tensor;
use crate::error::Result;

/// Trait for language models that can generate next token logits
pub trait LanguageModel: Send + Sync {
    /// Forward pass to get logits for the next token
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor>;

    /// Reset the model's KV cache
    fn reset_cache(&mut self) -> Result<()>;

    /// Get the end-of-sequence token ID
    fn eos_token_id(&self) -> u32;
}

/// Which of the two process-wide model slots a pair occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSlot {
    Primary,
    Fallback,
}

impl fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSlot::Primary => write!(f, "primary"),
            ModelSlot::Fallback => write!(f, "fallback"),
        }
    }
}

/// Hub coordinates of a model plus the name it is reported under.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub repo_id: String,
    pub label: String,
    pub revision: String,
    pub tokenizer_repo: Option<String>,
}

/// `eos_token_id` from a config.json, accepting a scalar or a list (first entry).
pub fn eos_token_id_from(config: &serde_json::Value, default: u32) -> u32 {
    config
        .get("eos_token_id")
        .and_then(|v| v.as_u64().or_else(|| v.as_array().and_then(|arr| arr.first()?.as_u64())))
        .map(|id| id as u32)
        .unwrap_or(default)
}

/// Supported model architectures
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelArchitecture {
    Llama,
    Mistral,
}

/// Detect model architecture from config.json
pub fn detect_architecture(config_path: &std::path::Path) -> Result<ModelArchitecture> {
    let config_str = std::fs::read_to_string(config_path)?;
    let config: serde_json::Value = serde_json::from_str(&config_str)?;

    if let Some(archs) = config.get("architectures").and_then(|v| v.as_array()) {
        for arch in archs.iter().filter_map(|a| a.as_str()) {
            if let Some(found) = match_architecture(arch) {
                return Ok(found);
            }
        }
    }

    if let Some(model_type) = config.get("model_type").and_then(|v| v.as_str()) {
        if let Some(found) = match_architecture(model_type) {
            return Ok(found);
        }
    }

    // FinMA and most financial fine-tunes are LLaMA derivatives
    Ok(ModelArchitecture::Llama)
}

fn match_architecture(name: &str) -> Option<ModelArchitecture> {
    let lower = name.to_lowercase();
    if lower.contains("mistral") {
        Some(ModelArchitecture::Mistral)
    } else if lower.contains("llama") {
        Some(ModelArchitecture::Llama)
    } else {
        None
    }
}
