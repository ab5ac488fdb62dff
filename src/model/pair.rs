use candle_core::Device;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    detect_architecture, download_model, LanguageModel, LlamaModel, MistralModel,
    ModelArchitecture, ModelSpec,
};
use crate::config::GenerationConfig;
use crate::error::Result;
use crate::generation::TextGenerator;
use crate::tokenizer::TokenizerWrapper;

/// Anything that can turn a prompt into generated text. Blocking; callers on
/// the async runtime move it onto the blocking pool.
pub trait TextBackend: Send + Sync {
    fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;
}

/// A loaded tokenizer and model, ready for inference.
pub struct ModelPair {
    pub repo_id: String,
    tokenizer: TokenizerWrapper,
    model: Mutex<Box<dyn LanguageModel>>,
    device: Device,
}

impl TextBackend for ModelPair {
    fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        // The KV cache makes a forward pass exclusive.
        let mut model = self.model.blocking_lock();
        let mut generator = TextGenerator::new(model.as_mut(), &self.tokenizer, &self.device);
        let output = generator.generate(prompt, config)?;
        debug!("{} produced {} tokens", self.repo_id, output.tokens.len());
        Ok(output.text)
    }
}

/// Fetch and build the tokenizer and model described by `spec`.
pub fn load_pair(spec: &ModelSpec, device: &Device, hf_token: Option<&str>) -> Result<ModelPair> {
    let files = download_model(spec, hf_token)?;
    let tokenizer = TokenizerWrapper::load(&files.tokenizer)?;

    let architecture = detect_architecture(&files.config)?;
    info!("Detected architecture for {}: {:?}", spec.repo_id, architecture);

    let model: Box<dyn LanguageModel> = match architecture {
        ModelArchitecture::Llama => {
            Box::new(LlamaModel::load(&files.config, &files.weights, device)?)
        }
        ModelArchitecture::Mistral => {
            Box::new(MistralModel::load(&files.config, &files.weights, device)?)
        }
    };

    info!(
        "{} ready ({} tokens in vocabulary)",
        spec.repo_id,
        tokenizer.vocab_size()
    );

    Ok(ModelPair {
        repo_id: spec.repo_id.clone(),
        tokenizer,
        model: Mutex::new(model),
        device: device.clone(),
    })
}
