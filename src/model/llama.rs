use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig};
use tracing::info;

use super::loader::var_builder;
use super::{eos_token_id_from, LanguageModel};
use crate::device::dtype_for;
use crate::error::Result;

pub struct LlamaModel {
    model: Llama,
    cache: Cache,
    config: Config,
    dtype: DType,
    device: Device,
    eos_token_id: u32,
}

impl LlamaModel {
    pub fn load(
        config_path: &Path,
        weight_paths: &[PathBuf],
        device: &Device,
    ) -> Result<Self> {
        info!("Loading Llama model configuration...");
        let config_str = std::fs::read_to_string(config_path)?;
        let llama_config: LlamaConfig = serde_json::from_str(&config_str)?;
        let config = llama_config.into_config(false);

        let config_json: serde_json::Value = serde_json::from_str(&config_str)?;
        let eos_token_id = eos_token_id_from(&config_json, 2);

        info!(
            "Llama config: vocab_size={}, hidden_size={}, num_layers={}, num_heads={}",
            config.vocab_size,
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads
        );

        let dtype = dtype_for(device);
        info!("Loading model weights as {:?}...", dtype);
        let vb = var_builder(weight_paths, dtype, device)?;

        info!("Building Llama model...");
        let model = Llama::load(vb, &config)?;
        let cache = Cache::new(true, dtype, &config, device)?;

        info!("Llama model loaded successfully");
        Ok(Self {
            model,
            cache,
            config,
            dtype,
            device: device.clone(),
            eos_token_id,
        })
    }
}

impl LanguageModel for LlamaModel {
    fn forward(&mut self, input_ids: &Tensor, position: usize) -> Result<Tensor> {
        let logits = self.model.forward(input_ids, position, &mut self.cache)?;
        Ok(logits)
    }

    fn reset_cache(&mut self) -> Result<()> {
        self.cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        Ok(())
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}
