//! Completion API client abstraction.
//!
//! The engine only depends on the [`CompletionClient`] trait; the HTTP
//! implementation speaks an OpenAI-style `chat/completions` contract. The
//! credential is resolved from the environment at call time; its absence is
//! a fatal configuration error, not a deferred one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::PrecomputeConfig;
use crate::error::{PrecomputeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request body for the external completion API.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Trait for completion backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Execute a completion request, returning the generated answer text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Get a description of this backend for logging
    fn description(&self) -> String;
}

/// HTTP client for an OpenAI-style completion endpoint.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    api_base: String,
    api_key_env: String,
}

impl HttpCompletionClient {
    pub fn new(config: &PrecomputeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key_env: config.api_key_env.clone(),
        }
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).map_err(|_| {
            PrecomputeError::Configuration(format!(
                "completion API credential not set ({})",
                self.api_key_env
            ))
        })
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.api_base);

        tracing::debug!("Completion call: model={} url={}", request.model, url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PrecomputeError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PrecomputeError::Upstream(format!(
                "completion API returned {status}: {body}"
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| PrecomputeError::Schema(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| PrecomputeError::Schema("response contained no choices".to_string()))?;

        Ok(choice.message.content.trim().to_string())
    }

    fn description(&self) -> String {
        format!("OpenAI-compatible API ({})", self.api_base)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable completion backend for engine and orchestrator tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock client: answers `"answer: <query>"`, optionally failing the
    /// first N calls for selected queries, with an optional per-call delay.
    pub struct MockCompletionClient {
        calls: AtomicUsize,
        remaining_failures: Mutex<HashMap<String, usize>>,
        delay_ms: u64,
    }

    impl MockCompletionClient {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                remaining_failures: Mutex::new(HashMap::new()),
                delay_ms: 0,
            }
        }

        pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
            self.delay_ms = delay_ms;
            self
        }

        /// Make the first `times` calls for `query` fail.
        pub fn fail_times(self, query: &str, times: usize) -> Self {
            self.remaining_failures
                .lock()
                .insert(query.to_string(), times);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for MockCompletionClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }

            let query = request
                .messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default();

            {
                let mut failures = self.remaining_failures.lock();
                if let Some(remaining) = failures.get_mut(&query) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(PrecomputeError::Upstream(format!(
                            "simulated failure for {query}"
                        )));
                    }
                }
            }

            Ok(format!("answer: {query}"))
        }

        fn description(&self) -> String {
            "mock completion client".to_string()
        }
    }
}
