//! HTTP client for the work queue server.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use sensebatch_core::queue::{
    SentenceQuery, SentenceResponse, SynsetsQuery, UnresolvedQuery, UpdateRequest,
};
use sensebatch_core::types::{CandidateSense, PendingUnit, Resolution, SentenceId, ShardSpec, UnitId};
use sensebatch_core::{Result, RetryPolicy, SenseError};

use super::WorkSource;

/// Every call is retried under `retry`; running out of budget aborts.
#[derive(Clone)]
pub struct QueueClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl QueueClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SenseError::Configuration(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SenseError::from_status(status, body));
        }
        response.json().await.map_err(SenseError::from_http)
    }

    async fn get_json<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: serde::Serialize + Sync,
    {
        self.retry
            .run(path, move || async move {
                let response = self
                    .client
                    .get(self.url(path))
                    .query(query)
                    .send()
                    .await
                    .map_err(SenseError::from_http)?;
                Self::decode(response).await
            })
            .await
    }
}

#[async_trait]
impl WorkSource for QueueClient {
    async fn unresolved(&self, shard: Option<ShardSpec>, limit: u32) -> Result<Vec<PendingUnit>> {
        let query = UnresolvedQuery {
            congruent: shard.map(|s| s.congruent),
            modulo: shard.map(|s| s.modulo),
            limit: Some(limit),
        };
        self.get_json("/unresolved", &query).await
    }

    async fn sentence(&self, sentence_id: SentenceId) -> Result<String> {
        let query = SentenceQuery {
            sentence_id: Some(sentence_id),
        };
        let response: SentenceResponse = self.get_json("/sentence", &query).await?;
        Ok(response.sentence)
    }

    async fn senses(&self, unit_id: UnitId) -> Result<Vec<CandidateSense>> {
        let query = SynsetsQuery {
            unit_id: Some(unit_id),
        };
        self.get_json("/synsets", &query).await
    }

    async fn submit(&self, resolution: &Resolution) -> Result<()> {
        let body = &UpdateRequest::from(resolution);
        self.retry
            .run("/update", move || async move {
                let response = self
                    .client
                    .post(self.url("/update"))
                    .json(body)
                    .send()
                    .await
                    .map_err(SenseError::from_http)?;
                let _: serde_json::Value = Self::decode(response).await?;
                Ok(())
            })
            .await
    }
}
