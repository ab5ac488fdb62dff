use thiserror::Error;

use crate::model::ModelSlot;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("{0} model not loaded")]
    ModelNotLoaded(ModelSlot),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Both primary and fallback models failed: {0}")]
    AllModelsFailed(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Hub error: {0}")]
    Hub(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl InferenceError {
    /// Collapse any failure raised while producing text into a `Generation`
    /// error, keeping the slot-absence case distinct.
    pub fn into_generation(self) -> Self {
        match self {
            e @ (InferenceError::ModelNotLoaded(_) | InferenceError::Generation(_)) => e,
            other => InferenceError::Generation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;
