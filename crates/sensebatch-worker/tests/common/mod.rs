//! Shared fixtures: temporary stores, an ephemeral queue server and a
//! scripted inference engine.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use sensebatch_core::config::StoreConfig;
use sensebatch_core::prompt::SensePrompt;
use sensebatch_core::store::NewUnit;
use sensebatch_core::types::{CandidateSense, StoryId, TokenUsage, UnitId};
use sensebatch_core::{Result, SenseError, WorkStore};
use sensebatch_worker::{Inference, InferenceEngine};

pub async fn test_store() -> (TempDir, WorkStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = StoreConfig {
        url: format!("sqlite://{}", dir.path().join("worker.db").display()),
        max_connections: 1,
        ..StoreConfig::default()
    };
    let store = WorkStore::connect(&config).await.expect("connect");
    (dir, store)
}

pub async fn seed_unit(store: &WorkStore, story: StoryId, word: &str, senses: usize) -> UnitId {
    let sentence = store
        .insert_sentence(story, 0, &format!("He left the {word} by the door."))
        .await
        .expect("sentence");
    let candidates = (1..=senses)
        .map(|n| CandidateSense::new(format!("{word}.n.{n:02}"), format!("{word} sense {n}")))
        .collect();
    store
        .insert_unit(&NewUnit::new(sentence, 3, word, candidates))
        .await
        .expect("unit")
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    format!("http://{addr}")
}

/// Answers by word: a scripted label, a garbled reply for words marked
/// `garbled`, and `(other)` for everything else.
#[derive(Default)]
pub struct ScriptedEngine {
    answers: HashMap<String, String>,
    garbled: Vec<String>,
    usage: Option<TokenUsage>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, word: &str, label: &str) -> Self {
        self.answers.insert(word.to_string(), label.to_string());
        self
    }

    pub fn garble(mut self, word: &str) -> Self {
        self.garbled.push(word.to_string());
        self
    }

    pub fn with_usage(mut self, prompt_tokens: i64, completion_tokens: i64) -> Self {
        self.usage = Some(TokenUsage {
            prompt_tokens,
            completion_tokens,
        });
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn infer(&self, prompt: &SensePrompt) -> Result<Inference> {
        self.prompts.lock().unwrap().push(prompt.text.clone());
        let word = prompt
            .text
            .split('`')
            .nth(1)
            .unwrap_or_default()
            .to_string();
        if self.garbled.contains(&word) {
            return Err(SenseError::MalformedResponse(format!("garbled answer for {word}")));
        }
        let label = self
            .answers
            .get(&word)
            .cloned()
            .unwrap_or_else(|| "(other)".to_string());
        Ok(Inference {
            label,
            usage: self.usage,
        })
    }
}
