//! Configuration: one explicit structure for every component.
//!
//! Sources, later wins: built-in defaults, an optional YAML file,
//! `SENSEBATCH_*` environment variables (a `.env` file is honoured), and
//! finally whatever the binary's command line overrides. Call
//! [`SenseConfig::validate`] before starting work so configuration errors
//! surface before anything touches the store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SenseError};
use crate::types::ShardSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenseConfig {
    pub store: StoreConfig,
    pub provider: ProviderConfig,
    /// Shard halves are kept apart so that a half-specified pair can be
    /// reported instead of silently ignored.
    pub congruent: Option<i64>,
    pub modulo: Option<i64>,
    pub poll_interval_secs: u64,
    /// Total time budget for retrying one network call.
    pub retry_cap_secs: u64,
    /// Maximum number of units selected per run.
    pub limit: Option<u32>,
    /// Age after which an open, unsent batch is reported as orphaned.
    pub orphan_threshold_secs: u64,
    pub server: ServerConfig,
    pub worker: WorkerConfig,
}

impl Default for SenseConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            provider: ProviderConfig::default(),
            congruent: None,
            modulo: None,
            poll_interval_secs: 60,
            retry_cap_secs: 300,
            limit: None,
            orphan_threshold_secs: 3600,
            server: ServerConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// sqlx connection string, e.g. `sqlite://senses.db`.
    pub url: String,
    /// How long a write waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://senses.db".into(),
            busy_timeout_ms: 30_000,
            max_connections: 4,
        }
    }
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Inline key. Takes precedence over `api_key_file`.
    pub api_key: Option<String>,
    pub api_key_file: Option<PathBuf>,
    pub model: String,
    pub completion_window: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            api_key: None,
            api_key_file: None,
            model: "gpt-4o-mini".into(),
            completion_window: "24h".into(),
            request_timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// Resolve the credential from the inline value or the key file.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.trim().to_string());
        }
        let Some(path) = &self.api_key_file else {
            return Err(SenseError::Configuration(
                "provider api_key or api_key_file must be set".into(),
            ));
        };
        let key = std::fs::read_to_string(path).map_err(|e| {
            SenseError::Configuration(format!("reading {}: {e}", path.display()))
        })?;
        Ok(key.trim().to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".into(),
        }
    }
}

/// Which inference engine a worker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Local Ollama chat endpoint, streamed, JSON mode.
    Ollama,
    /// OpenAI-compatible chat completions with tool calling.
    ChatCompletions,
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(Self::Ollama),
            "chat_completions" | "chat-completions" => Ok(Self::ChatCompletions),
            _ => Err(format!("Unknown engine: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL of the work queue server.
    pub server_url: String,
    pub engine: EngineKind,
    pub model: String,
    pub inference_url: String,
    pub inference_api_key: Option<String>,
    /// Units fetched per `unresolved` call.
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".into(),
            engine: EngineKind::Ollama,
            model: "llama3".into(),
            inference_url: "http://localhost:11434".into(),
            inference_api_key: None,
            page_size: 50,
            request_timeout_secs: 300,
        }
    }
}

impl SenseConfig {
    /// Load from an optional YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Reading {}", path.display()))
            .map_err(|e| SenseError::Configuration(format!("{e:#}")))?;
        serde_yaml::from_str(&content)
            .map_err(|e| SenseError::Configuration(format!("parsing {}: {e}", path.display())))
    }

    /// Apply `SENSEBATCH_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
            raw.map(|v| {
                v.parse::<T>()
                    .map_err(|_| SenseError::Configuration(format!("{key}: cannot parse {v:?}")))
            })
            .transpose()
        }

        if let Some(v) = lookup("SENSEBATCH_DATABASE_URL") {
            self.store.url = v;
        }
        if let Some(v) = parsed("SENSEBATCH_BUSY_TIMEOUT_MS", lookup("SENSEBATCH_BUSY_TIMEOUT_MS"))? {
            self.store.busy_timeout_ms = v;
        }
        if let Some(v) = lookup("SENSEBATCH_PROVIDER_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = lookup("SENSEBATCH_API_KEY") {
            self.provider.api_key = Some(v);
        }
        if let Some(v) = lookup("SENSEBATCH_API_KEY_FILE") {
            self.provider.api_key_file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("SENSEBATCH_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = parsed("SENSEBATCH_CONGRUENT", lookup("SENSEBATCH_CONGRUENT"))? {
            self.congruent = Some(v);
        }
        if let Some(v) = parsed("SENSEBATCH_MODULO", lookup("SENSEBATCH_MODULO"))? {
            self.modulo = Some(v);
        }
        if let Some(v) = parsed("SENSEBATCH_POLL_INTERVAL_SECS", lookup("SENSEBATCH_POLL_INTERVAL_SECS"))? {
            self.poll_interval_secs = v;
        }
        if let Some(v) = parsed("SENSEBATCH_RETRY_CAP_SECS", lookup("SENSEBATCH_RETRY_CAP_SECS"))? {
            self.retry_cap_secs = v;
        }
        if let Some(v) = parsed("SENSEBATCH_LIMIT", lookup("SENSEBATCH_LIMIT"))? {
            self.limit = Some(v);
        }
        if let Some(v) = lookup("SENSEBATCH_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("SENSEBATCH_SERVER_URL") {
            self.worker.server_url = v;
        }
        if let Some(v) = lookup("SENSEBATCH_INFERENCE_URL") {
            self.worker.inference_url = v;
        }
        if let Some(v) = lookup("SENSEBATCH_INFERENCE_API_KEY") {
            self.worker.inference_api_key = Some(v);
        }
        if let Some(v) = parsed("SENSEBATCH_ENGINE", lookup("SENSEBATCH_ENGINE"))? {
            self.worker.engine = v;
        }
        if let Some(v) = lookup("SENSEBATCH_WORKER_MODEL") {
            self.worker.model = v;
        }
        Ok(())
    }

    /// The validated shard, if any.
    pub fn shard(&self) -> Result<Option<ShardSpec>> {
        ShardSpec::from_parts(self.congruent, self.modulo)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_cap(&self) -> Duration {
        Duration::from_secs(self.retry_cap_secs)
    }

    pub fn orphan_threshold(&self) -> Duration {
        Duration::from_secs(self.orphan_threshold_secs)
    }

    /// Reject inconsistent settings before any work starts.
    pub fn validate(&self) -> Result<()> {
        self.shard()?;
        if self.store.url.trim().is_empty() {
            return Err(SenseError::Configuration("store url is empty".into()));
        }
        if self.store.max_connections == 0 {
            return Err(SenseError::Configuration(
                "store max_connections must be at least 1".into(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(SenseError::Configuration(
                "poll interval must be at least one second".into(),
            ));
        }
        if self.limit == Some(0) {
            return Err(SenseError::Configuration("limit must be positive".into()));
        }
        if self.worker.page_size == 0 {
            return Err(SenseError::Configuration("page size must be positive".into()));
        }
        Ok(())
    }
}
