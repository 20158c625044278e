//! Local Ollama chat endpoint, streamed in JSON mode.
//!
//! Ollama has no tool calling, so the prompt carries an explicit JSON
//! answer instruction and the streamed text is parsed as it arrives. The
//! response is dropped as soon as a valid answer parses.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use sensebatch_core::prompt::SensePrompt;
use sensebatch_core::types::TokenUsage;
use sensebatch_core::{Result, SenseError};

use super::{http_client, Inference, InferenceEngine, StreamAccumulator};

pub struct OllamaEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// One NDJSON line of a streamed `/api/chat` response.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: ChunkMessage,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<i64>,
    #[serde(default)]
    eval_count: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaEngine {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    fn model(&self) -> &str {
        &self.model
    }

    async fn infer(&self, prompt: &SensePrompt) -> Result<Inference> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt.with_json_instruction() }],
                "format": "json",
                "stream": true,
            }))
            .send()
            .await
            .map_err(SenseError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SenseError::from_status(status, body));
        }

        let mut accumulator = StreamAccumulator::new(&prompt.options);
        let mut stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();

        while let Some(bytes) = stream.next().await {
            pending.extend_from_slice(&bytes.map_err(SenseError::from_http)?);

            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                if line.trim().is_empty() {
                    continue;
                }
                let chunk: ChatChunk = serde_json::from_str(&line).map_err(|e| {
                    SenseError::MalformedResponse(format!("ollama chunk {line:?}: {e}"))
                })?;
                if let Some(error) = &chunk.error {
                    return Err(SenseError::MalformedResponse(format!("ollama: {error}")));
                }

                if let Some(label) = accumulator.push(&chunk.message.content)? {
                    tracing::trace!(text = accumulator.text(), "Answer complete, dropping stream");
                    // Counters only arrive on the final chunk.
                    let usage = if chunk.done { chunk.usage() } else { None };
                    return Ok(Inference { label, usage });
                }
                if chunk.done {
                    tracing::debug!(
                        prompt_tokens = ?chunk.prompt_eval_count,
                        completion_tokens = ?chunk.eval_count,
                        "Stream finished without an answer"
                    );
                    return Err(accumulator.finish());
                }
            }
        }

        Err(accumulator.finish())
    }
}

impl ChatChunk {
    fn usage(&self) -> Option<TokenUsage> {
        Some(TokenUsage {
            prompt_tokens: self.prompt_eval_count?,
            completion_tokens: self.eval_count?,
        })
    }
}
