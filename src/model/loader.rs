use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use hf_hub::{api::sync::Api, api::sync::ApiBuilder, api::sync::ApiRepo, Repo, RepoType};
use tracing::{debug, info};

use super::ModelSpec;
use crate::error::{InferenceError, Result};

pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

/// Download model files from HuggingFace Hub
pub fn download_model(spec: &ModelSpec, token: Option<&str>) -> Result<ModelFiles> {
    info!("Fetching model: {} (revision: {})", spec.repo_id, spec.revision);

    let api = match token {
        Some(t) => ApiBuilder::new()
            .with_token(Some(t.to_string()))
            .build()
            .map_err(|e| InferenceError::Hub(e.to_string()))?,
        None => Api::new().map_err(|e| InferenceError::Hub(e.to_string()))?,
    };

    let repo = api.repo(Repo::with_revision(
        spec.repo_id.clone(),
        RepoType::Model,
        spec.revision.clone(),
    ));

    info!("Downloading config.json...");
    let config = repo
        .get("config.json")
        .map_err(|e| InferenceError::Hub(format!("Failed to download config.json: {}", e)))?;

    info!("Downloading tokenizer...");
    let tokenizer = download_tokenizer(&api, spec)?;

    info!("Downloading model weights...");
    let weights = download_weights(&repo)?;

    info!(
        "Model files downloaded: config={:?}, tokenizer={:?}, weights={} files",
        config,
        tokenizer,
        weights.len()
    );

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

/// Repositories searched for `tokenizer.json`: the model's own first, then the
/// configured tokenizer repository.
pub fn tokenizer_sources(spec: &ModelSpec) -> Vec<&str> {
    let mut sources = vec![spec.repo_id.as_str()];
    if let Some(extra) = spec.tokenizer_repo.as_deref() {
        if extra != spec.repo_id {
            sources.push(extra);
        }
    }
    sources
}

fn download_tokenizer(api: &Api, spec: &ModelSpec) -> Result<PathBuf> {
    let mut last_error = String::new();
    for source in tokenizer_sources(spec) {
        let repo = api.repo(Repo::with_revision(
            source.to_string(),
            RepoType::Model,
            if source == spec.repo_id { spec.revision.clone() } else { "main".to_string() },
        ));
        match repo.get("tokenizer.json") {
            Ok(path) => {
                info!("Using tokenizer.json from {}", source);
                return Ok(path);
            }
            Err(e) => {
                debug!("No tokenizer.json in {}: {}", source, e);
                last_error = format!("{}: {}", source, e);
            }
        }
    }
    Err(InferenceError::Hub(format!(
        "Failed to download tokenizer.json ({})",
        last_error
    )))
}

fn download_weights(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    // Sharded checkpoints list their shards in an index file
    for index in ["model.safetensors.index.json", "pytorch_model.bin.index.json"] {
        if let Ok(index_path) = repo.get(index) {
            let shards = shard_names(&index_path)?;
            debug!("{} lists {} shards", index, shards.len());
            return shards
                .iter()
                .map(|name| {
                    repo.get(name).map_err(|e| {
                        InferenceError::Hub(format!("Failed to download {}: {}", name, e))
                    })
                })
                .collect();
        }
    }

    for single in ["model.safetensors", "pytorch_model.bin"] {
        if let Ok(path) = repo.get(single) {
            return Ok(vec![path]);
        }
    }

    Err(InferenceError::Hub(
        "Could not find model weights (tried index files, model.safetensors, pytorch_model.bin)"
            .to_string(),
    ))
}

/// Unique shard file names referenced by a `*.index.json` weight map, in sorted order.
fn shard_names(index_path: &Path) -> Result<Vec<String>> {
    let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(index_path)?)?;
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| InferenceError::Hub(format!("{:?} has no weight_map", index_path)))?;

    let names: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    Ok(names.into_iter().collect())
}

/// Build a `VarBuilder` over safetensors (memory mapped) or PyTorch pickle checkpoints.
pub fn var_builder(
    weight_paths: &[PathBuf],
    dtype: DType,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    let is_safetensors = weight_paths
        .first()
        .and_then(|p| p.extension())
        .map(|ext| ext == "safetensors")
        .unwrap_or(false);

    if is_safetensors {
        // SAFETY: the hub cache files are not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weight_paths, dtype, device)? };
        return Ok(vb);
    }

    info!("Reading PyTorch checkpoint ({} files)", weight_paths.len());
    let mut tensors: HashMap<String, Tensor> = HashMap::new();
    for path in weight_paths {
        tensors.extend(candle_core::pickle::read_all(path)?);
    }
    Ok(VarBuilder::from_tensors(tensors, dtype, device))
}
