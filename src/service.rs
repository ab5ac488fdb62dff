//! Process-wide inference service: two model slots, their startup sequencing,
//! and the primary-then-fallback generation policy.

use std::sync::Arc;

use candle_core::Device;
use tracing::{error, info, warn};

use crate::config::{GenerationConfig, ServiceConfig};
use crate::device::{device_info, is_accelerator};
use crate::error::{InferenceError, Result};
use crate::model::{load_pair, ModelSlot, ModelSpec, TextBackend};

/// A backend occupying a slot, with the name reported to clients.
#[derive(Clone)]
pub struct LoadedModel {
    pub label: String,
    pub backend: Arc<dyn TextBackend>,
}

impl LoadedModel {
    pub fn new(label: impl Into<String>, backend: Arc<dyn TextBackend>) -> Self {
        Self {
            label: label.into(),
            backend,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub text: String,
    pub model_used: String,
    pub slot: ModelSlot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthStatus {
    pub model_loaded: bool,
    pub fallback_loaded: bool,
    pub cuda_available: bool,
}

pub struct InferenceService {
    primary: Option<LoadedModel>,
    fallback: Option<LoadedModel>,
    accelerator: bool,
    seed: Option<u64>,
}

impl InferenceService {
    /// Load the primary model, then the fallback, from the hub.
    pub fn initialize(config: &ServiceConfig, device: Device) -> Self {
        let token = config.hf_token.clone();
        let hub_device = device.clone();
        Self::initialize_with(config, device, move |_, spec| {
            let pair = load_pair(spec, &hub_device, token.as_deref())?;
            info!("Loaded {}", pair.repo_id);
            Ok(Arc::new(pair) as Arc<dyn TextBackend>)
        })
    }

    /// Startup sequencing over an arbitrary loader. The fallback is always
    /// attempted, whatever happened to the primary. Failures are logged and
    /// leave the slot empty; this never fails as a whole.
    pub fn initialize_with<F>(config: &ServiceConfig, device: Device, loader: F) -> Self
    where
        F: Fn(ModelSlot, &ModelSpec) -> Result<Arc<dyn TextBackend>>,
    {
        info!("Initializing inference service on {}", device_info(&device));

        let primary = try_load(ModelSlot::Primary, &config.primary, &loader);
        if primary.is_none() {
            warn!("Primary model failed to load, trying fallback...");
        } else {
            info!("Loading fallback model as backup...");
        }
        // TODO: lazy-load the fallback on first primary failure instead of at startup
        let fallback = try_load(ModelSlot::Fallback, &config.fallback, &loader);

        let service = Self {
            primary,
            fallback,
            accelerator: is_accelerator(&device),
            seed: config.seed,
        };

        let health = service.health();
        info!(
            "Model slots: primary={}, fallback={}",
            loaded_str(health.model_loaded),
            loaded_str(health.fallback_loaded)
        );
        if !health.model_loaded && !health.fallback_loaded {
            error!("No model could be loaded; analysis requests will fail");
        }
        service
    }

    pub fn with_backends(
        primary: Option<LoadedModel>,
        fallback: Option<LoadedModel>,
        accelerator: bool,
    ) -> Self {
        Self {
            primary,
            fallback,
            accelerator,
            seed: None,
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            model_loaded: self.primary.is_some(),
            fallback_loaded: self.fallback.is_some(),
            cuda_available: self.accelerator,
        }
    }

    fn slot(&self, slot: ModelSlot) -> Option<&LoadedModel> {
        match slot {
            ModelSlot::Primary => self.primary.as_ref(),
            ModelSlot::Fallback => self.fallback.as_ref(),
        }
    }

    /// Generate with the model in `slot`. Generation runs on the blocking pool.
    pub async fn generate(
        &self,
        slot: ModelSlot,
        prompt: &str,
        max_length: usize,
    ) -> Result<GenerationOutcome> {
        let loaded = self
            .slot(slot)
            .cloned()
            .ok_or(InferenceError::ModelNotLoaded(slot))?;

        let config = GenerationConfig::with_max_length(max_length, self.seed);
        let prompt = prompt.to_string();
        let backend = loaded.backend.clone();

        let text = tokio::task::spawn_blocking(move || backend.generate(&prompt, &config))
            .await
            .map_err(|e| InferenceError::Generation(format!("generation task failed: {}", e)))?
            .map_err(InferenceError::into_generation)?;

        Ok(GenerationOutcome {
            text,
            model_used: loaded.label,
            slot,
        })
    }

    /// Try the primary model; on any failure retry once with the fallback if
    /// one is loaded.
    pub async fn try_primary_then_fallback(
        &self,
        prompt: &str,
        max_length: usize,
    ) -> Result<GenerationOutcome> {
        match self.generate(ModelSlot::Primary, prompt, max_length).await {
            Ok(outcome) => Ok(outcome),
            Err(primary_err) if self.fallback.is_some() => {
                warn!("Primary model failed, trying fallback: {}", primary_err);
                self.generate(ModelSlot::Fallback, prompt, max_length).await
            }
            Err(primary_err) => Err(InferenceError::AllModelsFailed(primary_err.to_string())),
        }
    }

    /// Release both model slots.
    pub fn shutdown(mut self) {
        let released = [self.primary.take(), self.fallback.take()]
            .into_iter()
            .flatten()
            .map(|m| m.label)
            .collect::<Vec<_>>();
        info!("Inference service shut down, released: {:?}", released);
    }
}

fn try_load<F>(slot: ModelSlot, spec: &ModelSpec, loader: &F) -> Option<LoadedModel>
where
    F: Fn(ModelSlot, &ModelSpec) -> Result<Arc<dyn TextBackend>>,
{
    info!("Loading {} model: {}", slot, spec.repo_id);
    match loader(slot, spec) {
        Ok(backend) => {
            info!("{} model {} loaded successfully", slot, spec.repo_id);
            Some(LoadedModel::new(spec.label.clone(), backend))
        }
        Err(e) => {
            let e = InferenceError::ModelLoad(e.to_string());
            error!("Failed to load {} model {}: {}", slot, spec.repo_id, e);
            None
        }
    }
}

fn loaded_str(loaded: bool) -> &'static str {
    if loaded {
        "loaded"
    } else {
        "unavailable"
    }
}
