use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use candle_transformers::models::mistral::{Config, Model};
use tracing::info;

use super::loader::var_builder;
use super::{eos_token_id_from, LanguageModel};
use crate::device::dtype_for;
use crate::error::Result;

pub struct MistralModel {
    model: Model,
    eos_token_id: u32,
}

impl MistralModel {
    pub fn load(
        config_path: &Path,
        weight_paths: &[PathBuf],
        device: &Device,
    ) -> Result<Self> {
        info!("Loading Mistral model configuration...");
        let config_str = std::fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_str)?;

        let config_json: serde_json::Value = serde_json::from_str(&config_str)?;
        let eos_token_id = eos_token_id_from(&config_json, 2);

        info!(
            "Model config: vocab_size={}, hidden_size={}, num_layers={}, num_heads={}",
            config.vocab_size,
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads
        );

        let dtype = dtype_for(device);
        info!("Loading model weights as {:?}...", dtype);
        let vb = var_builder(weight_paths, dtype, device)?;

        info!("Building model...");
        let model = Model::new(&config, vb)?;

        info!("Mistral model loaded successfully");
        Ok(Self {
            model,
            eos_token_id,
        })
    }
}

impl LanguageModel for MistralModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        let logits = self.model.forward(input_ids, position)?;
        Ok(logits)
    }

    fn reset_cache(&mut self) -> Result<()> {
        self.model.clear_kv_cache();
        Ok(())
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}
