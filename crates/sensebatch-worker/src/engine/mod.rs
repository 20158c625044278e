//! Inference engines that answer one sense prompt at a time.

mod chat;
mod ollama;
mod stream;

pub use chat::ChatCompletionsEngine;
pub use ollama::OllamaEngine;
pub use stream::StreamAccumulator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sensebatch_core::config::{EngineKind, WorkerConfig};
use sensebatch_core::prompt::SensePrompt;
use sensebatch_core::types::TokenUsage;
use sensebatch_core::{Result, SenseError};

/// A validated answer: `label` is one of the prompt's options or `(other)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Inference {
    pub label: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Recorded as the resolving source of every label this engine produces.
    fn model(&self) -> &str;

    /// `MalformedResponse` when no acceptable answer could be read.
    async fn infer(&self, prompt: &SensePrompt) -> Result<Inference>;
}

/// Build the engine selected in the worker configuration.
pub fn from_config(config: &WorkerConfig) -> Result<Arc<dyn InferenceEngine>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    let engine: Arc<dyn InferenceEngine> = match config.engine {
        EngineKind::Ollama => Arc::new(OllamaEngine::new(
            &config.inference_url,
            &config.model,
            timeout,
        )?),
        EngineKind::ChatCompletions => Arc::new(ChatCompletionsEngine::new(
            &config.inference_url,
            &config.model,
            config.inference_api_key.clone(),
            timeout,
        )?),
    };
    Ok(engine)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SenseError::Configuration(format!("building http client: {e}")))
}
