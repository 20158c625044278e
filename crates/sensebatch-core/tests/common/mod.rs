//! Shared fixtures: temporary stores, seeded units and a scripted provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use sensebatch_core::config::StoreConfig;
use sensebatch_core::provider::{BatchProvider, ProviderBatch, RequestCounts, SubmitMetadata};
use sensebatch_core::store::NewUnit;
use sensebatch_core::types::{CandidateSense, ProviderStatus, StoryId, UnitId};
use sensebatch_core::{Result, SenseError, WorkStore};

pub async fn test_store() -> (TempDir, WorkStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = StoreConfig {
        url: format!("sqlite://{}", dir.path().join("senses.db").display()),
        ..StoreConfig::default()
    };
    let store = WorkStore::connect(&config).await.expect("connect");
    (dir, store)
}

pub async fn seed_story(store: &WorkStore, story_number: i64) -> StoryId {
    store.insert_story("fixture", story_number).await.expect("story")
}

/// One sentence holding one unit with `senses` candidate labels.
pub async fn seed_unit(store: &WorkStore, story: StoryId, word: &str, senses: usize) -> UnitId {
    let sentence = store
        .insert_sentence(story, 0, &format!("We went down to the {word} today."))
        .await
        .expect("sentence");
    let candidates = (1..=senses)
        .map(|n| CandidateSense::new(format!("{word}.n.{n:02}"), format!("{word} sense {n}")))
        .collect();
    store
        .insert_unit(&NewUnit::new(sentence, 5, word, candidates))
        .await
        .expect("unit")
}

/// A successful retrieval record answering `label` through the tool call.
pub fn answer_line(unit_id: UnitId, label: &str, prompt_tokens: i64, completion_tokens: i64) -> String {
    json!({
        "id": format!("req_{unit_id}"),
        "custom_id": unit_id.to_string(),
        "response": {
            "status_code": 200,
            "body": {
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "specify_sense",
                                "arguments": json!({ "sense": label }).to_string(),
                            }
                        }]
                    }
                }],
                "usage": {
                    "prompt_tokens": prompt_tokens,
                    "completion_tokens": completion_tokens,
                    "total_tokens": prompt_tokens + completion_tokens,
                }
            }
        },
        "error": null
    })
    .to_string()
}

pub fn failed_line(unit_id: UnitId, status_code: u16) -> String {
    json!({
        "custom_id": unit_id.to_string(),
        "response": { "status_code": status_code, "body": { "error": { "message": "rate limited" } } },
        "error": null
    })
    .to_string()
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub external_id: String,
    pub payload: String,
    pub metadata: SubmitMetadata,
}

#[derive(Default)]
struct FakeState {
    submissions: Vec<Submission>,
    batches: HashMap<String, ProviderBatch>,
    files: HashMap<String, String>,
    reject_submissions: bool,
    upload_failures: usize,
    lose_create_responses: bool,
    uploads: usize,
    status_calls: usize,
    downloads: usize,
}

/// Scripted in-memory provider. Batches start `validating`; tests move them
/// along with [`FakeProvider::set_progress`] and [`FakeProvider::complete`].
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn reject_submissions(&self) {
        self.state.lock().unwrap().reject_submissions = true;
    }

    /// Fail the next `n` uploads with a transient error.
    pub fn fail_uploads(&self, n: usize) {
        self.state.lock().unwrap().upload_failures = n;
    }

    /// Create batches but report a dropped connection to the caller.
    pub fn lose_create_responses(&self) {
        self.state.lock().unwrap().lose_create_responses = true;
    }

    pub fn uploads(&self) -> usize {
        self.state.lock().unwrap().uploads
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    pub fn downloads(&self) -> usize {
        self.state.lock().unwrap().downloads
    }

    pub fn set_progress(&self, external_id: &str, raw_status: &str, completed: i64, failed: i64) {
        let mut state = self.state.lock().unwrap();
        let batch = state.batches.get_mut(external_id).expect("known batch");
        batch.raw_status = raw_status.to_string();
        batch.status = ProviderStatus::parse(raw_status);
        batch.counts.completed = completed;
        batch.counts.failed = failed;
    }

    /// Mark completed with the given result lines as the output file.
    pub fn complete(&self, external_id: &str, lines: &[String]) {
        let mut state = self.state.lock().unwrap();
        let file_id = format!("file-out-{external_id}");
        state.files.insert(file_id.clone(), lines.join("\n") + "\n");
        let batch = state.batches.get_mut(external_id).expect("known batch");
        batch.raw_status = "completed".into();
        batch.status = ProviderStatus::Completed;
        batch.counts.completed = lines.len() as i64;
        batch.output_file_id = Some(file_id);
    }

    pub fn fail(&self, external_id: &str, errors: &[&str]) {
        self.end_badly(external_id, "failed", errors, None);
    }

    /// End in `raw_status` (`expired`, `cancelled`) having answered `lines`.
    pub fn end_with_partial_output(&self, external_id: &str, raw_status: &str, lines: &[String]) {
        self.end_badly(external_id, raw_status, &[], Some(lines));
    }

    fn end_badly(&self, external_id: &str, raw_status: &str, errors: &[&str], lines: Option<&[String]>) {
        let mut state = self.state.lock().unwrap();
        let output_file_id = lines.map(|lines| {
            let file_id = format!("file-out-{external_id}");
            state.files.insert(file_id.clone(), lines.join("\n") + "\n");
            file_id
        });
        let batch = state.batches.get_mut(external_id).expect("known batch");
        batch.raw_status = raw_status.into();
        batch.status = ProviderStatus::parse(raw_status);
        batch.errors = errors.iter().map(|e| e.to_string()).collect();
        if let Some(lines) = lines {
            batch.counts.completed = lines.len() as i64;
        }
        batch.output_file_id = output_file_id;
    }
}

#[async_trait]
impl BatchProvider for FakeProvider {
    async fn upload(&self, payload: Vec<u8>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.upload_failures > 0 {
            state.upload_failures -= 1;
            return Err(SenseError::TransientNetwork("upload reset".into()));
        }
        state.uploads += 1;
        let file_id = format!("file-in-{}", state.uploads);
        let payload = String::from_utf8(payload).expect("utf-8 payload");
        state.files.insert(file_id.clone(), payload);
        Ok(file_id)
    }

    async fn create_batch(&self, file_id: &str, metadata: &SubmitMetadata) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.reject_submissions {
            return Err(SenseError::Rejected {
                status: 400,
                body: "submissions disabled".into(),
            });
        }
        let payload = state
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| SenseError::NotFound(file_id.to_string()))?;
        let external_id = format!("batch_{}", state.submissions.len() + 1);
        let total = payload.lines().count() as i64;
        state.batches.insert(
            external_id.clone(),
            ProviderBatch {
                external_id: external_id.clone(),
                status: ProviderStatus::Pending,
                raw_status: "validating".into(),
                counts: RequestCounts {
                    total,
                    completed: 0,
                    failed: 0,
                },
                output_file_id: None,
                error_file_id: None,
                errors: Vec::new(),
                local_batch_id: Some(metadata.local_batch_id),
            },
        );
        state.submissions.push(Submission {
            external_id: external_id.clone(),
            payload,
            metadata: metadata.clone(),
        });
        if state.lose_create_responses {
            return Err(SenseError::TransientNetwork("connection reset".into()));
        }
        Ok(external_id)
    }

    async fn status(&self, external_id: &str) -> Result<ProviderBatch> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        state
            .batches
            .get(external_id)
            .cloned()
            .ok_or_else(|| SenseError::NotFound(external_id.to_string()))
    }

    async fn download(&self, file_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.downloads += 1;
        state
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| SenseError::NotFound(file_id.to_string()))
    }
}
