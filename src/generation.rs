use std::time::Instant;

use candle_core::{Device, Tensor};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{InferenceError, Result};
use crate::model::LanguageModel;
use crate::sampling::{apply_repeat_penalty, Sampler};
use crate::tokenizer::TokenizerWrapper;

pub struct GenerationOutput {
    pub text: String,
    pub tokens: Vec<u32>,
}

pub struct TextGenerator<'a> {
    model: &'a mut dyn LanguageModel,
    tokenizer: &'a TokenizerWrapper,
    device: &'a Device,
}

impl<'a> TextGenerator<'a> {
    pub fn new(
        model: &'a mut dyn LanguageModel,
        tokenizer: &'a TokenizerWrapper,
        device: &'a Device,
    ) -> Self {
        Self {
            model,
            tokenizer,
            device,
        }
    }

    /// Samples a continuation of `prompt`. `config.max_length` caps prompt and
    /// continuation together; a prompt already at the cap yields no new tokens.
    pub fn generate(
        &mut self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationOutput> {
        let start_time = Instant::now();

        self.model.reset_cache()?;

        let prompt_tokens = self.tokenizer.encode(prompt)?;
        let prompt_len = prompt_tokens.len();
        info!("Prompt tokens: {}", prompt_len);

        if prompt_tokens.is_empty() {
            return Err(InferenceError::Generation("Empty prompt".to_string()));
        }

        let budget = config.max_length.saturating_sub(prompt_len);
        let mut sampler = Sampler::from_config(config);
        let eos_token = self.tokenizer.eos_token_id().unwrap_or(self.model.eos_token_id());

        let mut all_tokens = prompt_tokens.clone();
        let mut generated_tokens: Vec<u32> = Vec::new();

        let generation_start = Instant::now();

        if budget > 0 {
            // Prefill
            let input_tensor = Tensor::new(prompt_tokens.as_slice(), self.device)?
                .unsqueeze(0)?;
            let mut logits = self.model.forward(&input_tensor, 0)?;

            for i in 0..budget {
                let penalized_logits = apply_repeat_penalty(
                    &logits,
                    config.repeat_penalty,
                    &all_tokens,
                )?;

                let next_token = sampler.sample(&penalized_logits)?;
                all_tokens.push(next_token);

                if next_token == eos_token {
                    debug!("EOS generated at position {}", i);
                    break;
                }
                generated_tokens.push(next_token);

                if i + 1 == budget {
                    break;
                }

                let input = Tensor::new(&[next_token], self.device)?.unsqueeze(0)?;
                logits = self.model.forward(&input, prompt_len + i)?;
            }
        } else {
            debug!(
                "Prompt length {} already reaches max_length {}",
                prompt_len, config.max_length
            );
        }

        let generation_time = generation_start.elapsed();
        let total_time = start_time.elapsed();

        let tokens_per_second = if generation_time.as_secs_f64() > 0.0 {
            generated_tokens.len() as f64 / generation_time.as_secs_f64()
        } else {
            0.0
        };

        // The runtime convention decodes prompt and continuation together.
        let decoded = self.tokenizer.decode(&all_tokens)?;
        let text = strip_prompt_echo(&decoded, prompt);

        info!(
            "Generated {} tokens in {:?} ({:.2} tokens/sec, {}ms total)",
            generated_tokens.len(),
            generation_time,
            tokens_per_second,
            total_time.as_millis()
        );

        Ok(GenerationOutput {
            text,
            tokens: generated_tokens,
        })
    }
}

/// Removes a verbatim echo of `prompt` from the start of `output` and trims
/// what is left. Output that does not start with the prompt is returned as is.
pub fn strip_prompt_echo(output: &str, prompt: &str) -> String {
    match output.strip_prefix(prompt) {
        Some(rest) => rest.trim().to_string(),
        None => output.to_string(),
    }
}
