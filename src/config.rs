//! Configuration for the precompute system.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the precompute engine and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputeConfig {
    /// Model id sent to the completion API
    pub model: String,

    /// Sampling temperature for completion calls
    pub temperature: f64,

    /// Maximum tokens per completion call
    pub max_tokens: u32,

    /// Cache entries older than this are treated as absent at load time
    pub cache_ttl_hours: u64,

    /// Enable/disable explanation synthesis (answers are still cached)
    pub xai_enabled: bool,

    /// Base URL of the completion API
    pub api_base: String,

    /// Environment variable holding the API credential
    pub api_key_env: String,

    /// Path to store cache and exports (defaults to ~/.xai-precompute/)
    pub data_dir: PathBuf,
}

impl Default for PrecomputeConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            cache_ttl_hours: 24,
            xai_enabled: true,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            data_dir: home.join(".xai-precompute"),
        }
    }
}

impl PrecomputeConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, path: PathBuf) -> Self {
        self.data_dir = path;
        self
    }

    /// Set the model id
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Disable explanation synthesis
    pub fn without_xai(mut self) -> Self {
        self.xai_enabled = false;
        self
    }

    /// Load config from file, or return default if file doesn't exist
    pub fn load_or_default(path: &std::path::Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse precompute config: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read precompute config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the durable cache slot
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("query_cache.json")
    }

    /// Directory job exports are written to
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    /// Ensure data directories exist
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.exports_dir())?;
        Ok(())
    }
}

/// Batch execution parameters for a single job run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Queries dispatched concurrently per chunk (minimum 1)
    pub batch_size: usize,

    /// Sleep between chunks, not applied after the last one
    pub delay_between_batches_ms: u64,

    /// Run the sequential retry pass over failed queries
    pub retry_failed_queries: bool,

    /// Maximum retry rounds per failed query
    pub max_retries: u32,

    /// Base delay for exponential backoff between retry rounds
    pub retry_base_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            delay_between_batches_ms: 500,
            retry_failed_queries: true,
            max_retries: 2,
            retry_base_delay_ms: 1000,
        }
    }
}

impl BatchConfig {
    /// Clamp out-of-range values to their invariants.
    pub fn normalized(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self
    }
}
