use candle_core::{DType, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::GenerationConfig;
use crate::error::{InferenceError, Result};

/// Temperature / top-k / nucleus sampler. A temperature of zero decodes greedily.
pub struct Sampler {
    temperature: f64,
    top_p: f64,
    top_k: usize,
    rng: StdRng,
}

impl Sampler {
    pub fn new(temperature: f64, top_p: f64, top_k: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            temperature,
            top_p,
            top_k,
            rng,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(config.temperature, config.top_p, config.top_k, config.seed)
    }

    pub fn sample(&mut self, logits: &Tensor) -> Result<u32> {
        let logits = get_last_logits(logits)?;
        let logits = logits.to_dtype(DType::F32)?;

        let logits = if self.temperature > 0.0 && self.temperature != 1.0 {
            (logits / self.temperature)?
        } else {
            logits
        };

        let logits_vec: Vec<f32> = logits.to_vec1()?;
        if logits_vec.is_empty() {
            return Err(InferenceError::Generation("empty logits".to_string()));
        }

        if self.temperature == 0.0 {
            let idx = logits_vec
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(i, _)| i)
                .unwrap_or(0);
            return Ok(idx as u32);
        }

        let mut indexed: Vec<(usize, f32)> =
            logits_vec.iter().copied().enumerate().collect();
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

        if self.top_k > 0 && self.top_k < indexed.len() {
            indexed.truncate(self.top_k);
        }

        let max_logit = indexed[0].1;
        let mut probs: Vec<(usize, f32)> = indexed
            .iter()
            .map(|(i, l)| (*i, (l - max_logit).exp()))
            .collect();

        let sum: f32 = probs.iter().map(|(_, p)| p).sum();
        for (_, p) in &mut probs {
            *p /= sum;
        }

        if self.top_p < 1.0 {
            let top_p = self.top_p as f32;
            let mut cumsum = 0.0f32;
            // Keep the smallest prefix whose mass exceeds top_p, at least one token.
            let cutoff = probs
                .iter()
                .position(|(_, p)| {
                    cumsum += p;
                    cumsum > top_p
                })
                .map(|i| i + 1)
                .unwrap_or(probs.len());
            probs.truncate(cutoff.max(1));
        }

        let sum: f32 = probs.iter().map(|(_, p)| p).sum();
        let r: f32 = self.rng.gen::<f32>() * sum;
        let mut cumsum = 0.0;
        for (idx, prob) in probs.iter() {
            cumsum += prob;
            if r < cumsum {
                return Ok(*idx as u32);
            }
        }

        Ok(probs.last().map(|(i, _)| *i as u32).unwrap_or(0))
    }
}

pub fn get_last_logits(logits: &Tensor) -> Result<Tensor> {
    let dims = logits.dims();
    match dims.len() {
        1 => Ok(logits.clone()),
        2 => {
            let last_idx = dims[0] - 1;
            Ok(logits.get(last_idx)?)
        }
        3 => {
            let seq_len = dims[1];
            let logits = logits.get(0)?;
            Ok(logits.get(seq_len - 1)?)
        }
        _ => {
            let mut result = logits.clone();
            while result.dims().len() > 1 {
                if result.dims()[0] == 1 {
                    result = result.squeeze(0)?;
                } else {
                    break;
                }
            }
            Ok(result)
        }
    }
}

/// Divides positive scores (multiplies negative ones) of every token already
/// present in `context`, returning a 1-D tensor of last-position logits.
pub fn apply_repeat_penalty(
    logits: &Tensor,
    repeat_penalty: f32,
    context: &[u32],
) -> Result<Tensor> {
    let last_logits = get_last_logits(logits)?;
    if repeat_penalty == 1.0 || context.is_empty() {
        return Ok(last_logits);
    }

    let device = logits.device();
    let mut logits_vec: Vec<f32> = last_logits.to_dtype(DType::F32)?.to_vec1()?;

    let mut seen = std::collections::HashSet::new();
    for &token_id in context {
        let idx = token_id as usize;
        if idx < logits_vec.len() && seen.insert(idx) {
            let score = logits_vec[idx];
            logits_vec[idx] = if score > 0.0 {
                score / repeat_penalty
            } else {
                score * repeat_penalty
            };
        }
    }

    let vocab_size = logits_vec.len();
    Ok(Tensor::from_vec(logits_vec, (vocab_size,), device)?)
}
