use std::sync::Arc;

use anyhow::Result;
use tracing::error;

pub mod t5;

/// Contract for the wrapped summarization engine: shorten `text` to between
/// `min_length` and `max_length` generated tokens. With `deterministic` set,
/// sampling is disabled and identical inputs yield identical output.
pub trait SummarizationEngine: Send + Sync {
    fn summarize(
        &self,
        text: &str,
        max_length: usize,
        min_length: usize,
        deterministic: bool,
    ) -> Result<String>;
}

/// Process-wide handle to the engine. Constructed once at startup and shared
/// read-only across requests; an `Unavailable` handle stays unavailable until
/// the process restarts.
#[derive(Clone)]
pub enum ModelHandle {
    Loaded(Arc<dyn SummarizationEngine>),
    Unavailable,
}

impl ModelHandle {
    /// The one startup load attempt. Never retried and never re-executed; on
    /// failure the error is logged and every request is answered with a fixed
    /// service error instead.
    pub fn load(repo_id: &str, revision: &str) -> ModelHandle {
        match t5::T5SummaryModel::new(repo_id, revision, GenerationConfig::default()) {
            Ok(model) => ModelHandle::Loaded(Arc::new(model)),
            Err(err) => {
                error!("Error loading summarizer model: {err:#}");
                error!(
                    "Please ensure the model repository is reachable on the Hugging Face hub \
                     or already present in the local cache, and that its files include \
                     config.json, tokenizer.json and model.safetensors."
                );
                ModelHandle::Unavailable
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelHandle::Loaded(_))
    }
}

#[derive(Debug, Copy, Clone)]
pub struct GenerationConfig {
    pub seed: u64,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub repeat_penalty: f32,
    pub repeat_context_size: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seed: 299_792_458,
            temperature: None,
            top_p: None,
            repeat_penalty: 1.1,
            repeat_context_size: 64,
        }
    }
}
