//! OpenAI-compatible chat completions with a forced tool call.

use std::time::Duration;

use async_trait::async_trait;

use sensebatch_core::prompt::{parse_answer, SensePrompt, TOOL_NAME};
use sensebatch_core::provider::wire::{ChatCompletion, ChatRequest, CHAT_COMPLETIONS_PATH};
use sensebatch_core::{Result, SenseError};

use super::{http_client, Inference, InferenceEngine};

pub struct ChatCompletionsEngine {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatCompletionsEngine {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl InferenceEngine for ChatCompletionsEngine {
    fn model(&self) -> &str {
        &self.model
    }

    async fn infer(&self, prompt: &SensePrompt) -> Result<Inference> {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH))
            .json(&ChatRequest::forced_tool(&self.model, prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(SenseError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SenseError::from_status(status, body));
        }
        let completion: ChatCompletion = response.json().await.map_err(SenseError::from_http)?;

        let arguments = completion.tool_arguments(TOOL_NAME).ok_or_else(|| {
            SenseError::MalformedResponse(format!("no {TOOL_NAME} tool call in completion"))
        })?;
        let label = parse_answer(arguments, &prompt.options)?;

        Ok(Inference {
            label,
            usage: completion.usage.clone().map(Into::into),
        })
    }
}
