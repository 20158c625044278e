//! OpenAI-compatible batch API client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use super::{BatchProvider, ProviderBatch, RequestCounts, SubmitMetadata};
use crate::config::ProviderConfig;
use crate::error::{Result, SenseError};
use crate::provider::wire::CHAT_COMPLETIONS_PATH;
use crate::types::ProviderStatus;

pub struct OpenAiBatchProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    completion_window: String,
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchErrorItem {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    line: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct BatchErrors {
    #[serde(default)]
    data: Vec<BatchErrorItem>,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    #[serde(default)]
    request_counts: Option<RequestCounts>,
    #[serde(default)]
    output_file_id: Option<String>,
    #[serde(default)]
    error_file_id: Option<String>,
    #[serde(default)]
    errors: Option<BatchErrors>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

impl From<BatchObject> for ProviderBatch {
    fn from(raw: BatchObject) -> Self {
        let errors = raw
            .errors
            .map(|e| {
                e.data
                    .into_iter()
                    .map(|item| {
                        let mut text = format!(
                            "{}: {}",
                            item.code.as_deref().unwrap_or("error"),
                            item.message.as_deref().unwrap_or("")
                        );
                        if let Some(line) = item.line {
                            text.push_str(&format!(" (line {line})"));
                        }
                        text
                    })
                    .collect()
            })
            .unwrap_or_default();

        ProviderBatch {
            external_id: raw.id,
            status: ProviderStatus::parse(&raw.status),
            raw_status: raw.status,
            counts: raw.request_counts.unwrap_or_default(),
            output_file_id: raw.output_file_id,
            error_file_id: raw.error_file_id,
            errors,
            local_batch_id: raw
                .metadata
                .as_ref()
                .and_then(|m| m.get("local_batch_id"))
                .and_then(|id| id.parse().ok()),
        }
    }
}

impl OpenAiBatchProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SenseError::Configuration(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            completion_window: config.completion_window.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into an error, keeping the body.
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SenseError::from_status(status, body))
    }
}

#[async_trait]
impl BatchProvider for OpenAiBatchProvider {
    async fn upload(&self, payload: Vec<u8>) -> Result<String> {
        let form = Form::new()
            .text("purpose", "batch")
            .part("file", Part::bytes(payload).file_name("batch.jsonl"));

        let response = self
            .client
            .post(self.url("/v1/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(SenseError::from_http)?;

        let file: FileObject = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(SenseError::from_http)?;
        Ok(file.id)
    }

    async fn create_batch(&self, file_id: &str, metadata: &SubmitMetadata) -> Result<String> {
        let response = self
            .client
            .post(self.url("/v1/batches"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "input_file_id": file_id,
                "endpoint": CHAT_COMPLETIONS_PATH,
                "completion_window": self.completion_window,
                "metadata": {
                    "description": metadata.description,
                    "local_batch_id": metadata.local_batch_id.to_string(),
                },
            }))
            .send()
            .await
            .map_err(SenseError::from_http)?;

        let batch: BatchObject = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(SenseError::from_http)?;
        Ok(batch.id)
    }

    async fn status(&self, external_id: &str) -> Result<ProviderBatch> {
        let response = self
            .client
            .get(self.url(&format!("/v1/batches/{external_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(SenseError::from_http)?;

        let batch: BatchObject = Self::checked(response)
            .await?
            .json()
            .await
            .map_err(SenseError::from_http)?;
        Ok(batch.into())
    }

    async fn download(&self, file_id: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(&format!("/v1/files/{file_id}/content")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(SenseError::from_http)?;

        Self::checked(response)
            .await?
            .text()
            .await
            .map_err(SenseError::from_http)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_object_with_errors() {
        let raw: BatchObject = serde_json::from_str(
            r#"{
                "id": "batch_abc",
                "object": "batch",
                "status": "failed",
                "request_counts": {"total": 3, "completed": 0, "failed": 0},
                "errors": {"object": "list", "data": [
                    {"code": "invalid_json_line", "message": "bad line", "line": 2}
                ]}
            }"#,
        )
        .unwrap();
        let batch = ProviderBatch::from(raw);
        assert_eq!(batch.status, ProviderStatus::Errored);
        assert_eq!(batch.raw_status, "failed");
        assert_eq!(batch.counts.total, 3);
        assert_eq!(batch.errors, vec!["invalid_json_line: bad line (line 2)"]);
    }

    #[test]
    fn test_batch_object_in_progress() {
        let raw: BatchObject = serde_json::from_str(
            r#"{"id": "batch_abc", "status": "in_progress",
                "request_counts": {"total": 10, "completed": 4, "failed": 1},
                "output_file_id": null, "metadata": {"local_batch_id": "7"}}"#,
        )
        .unwrap();
        let batch = ProviderBatch::from(raw);
        assert_eq!(batch.status, ProviderStatus::InProgress);
        assert_eq!(
            batch.counts,
            RequestCounts {
                total: 10,
                completed: 4,
                failed: 1
            }
        );
        assert!(batch.errors.is_empty());
        assert_eq!(batch.local_batch_id, Some(7));
    }
}
