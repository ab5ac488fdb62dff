use clap::Parser;

use crate::model::ModelSpec;

pub const DEFAULT_MAX_LENGTH: usize = 512;

/// LLaMA-1 vocabulary in `tokenizer.json` form.
pub const DEFAULT_PRIMARY_TOKENIZER: &str = "hf-internal-testing/llama-tokenizer";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Financial analysis API backed by FinMA with a Mistral fallback")]
pub struct Args {
    /// Primary model repository on the Hugging Face hub
    #[arg(short, long, env = "PRIMARY_MODEL", default_value = "ChanceFocus/finma-7b-full")]
    pub model: String,

    /// Name reported in `model_used` for the primary model
    #[arg(long, default_value = "finma-7b-full")]
    pub model_label: String,

    /// Repository to take tokenizer.json from when the primary repo lacks one
    /// (FinMA ships only a SentencePiece model)
    #[arg(long, default_value = DEFAULT_PRIMARY_TOKENIZER)]
    pub tokenizer: Option<String>,

    #[arg(long, env = "FALLBACK_MODEL", default_value = "mistralai/Mistral-7B-Instruct-v0.1")]
    pub fallback_model: String,

    #[arg(long, default_value = "mistral-7b")]
    pub fallback_label: String,

    #[arg(long)]
    pub fallback_tokenizer: Option<String>,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    #[arg(long)]
    pub cpu: bool,

    #[arg(long, env = "HF_TOKEN")]
    pub hf_token: Option<String>,

    /// Run a single prompt through the models and exit
    #[arg(short, long)]
    pub prompt: Option<String>,

    #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
    pub max_length: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[arg(long, default_value = "main")]
    pub revision: String,
}

/// Everything the inference service needs to bring its model slots up.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub primary: ModelSpec,
    pub fallback: ModelSpec,
    pub hf_token: Option<String>,
    pub seed: Option<u64>,
}

impl From<&Args> for ServiceConfig {
    fn from(args: &Args) -> Self {
        Self {
            primary: ModelSpec {
                repo_id: args.model.clone(),
                label: args.model_label.clone(),
                revision: args.revision.clone(),
                tokenizer_repo: args.tokenizer.clone(),
            },
            fallback: ModelSpec {
                repo_id: args.fallback_model.clone(),
                label: args.fallback_label.clone(),
                revision: args.revision.clone(),
                tokenizer_repo: args.fallback_tokenizer.clone(),
            },
            hf_token: args.hf_token.clone(),
            seed: if args.seed == 0 { None } else { Some(args.seed) },
        }
    }
}

/// Decoding parameters. `max_length` bounds prompt and continuation together.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub max_length: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub repeat_penalty: f32,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            repeat_penalty: 1.1,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn with_max_length(max_length: usize, seed: Option<u64>) -> Self {
        Self {
            max_length,
            seed,
            ..Self::default()
        }
    }
}
