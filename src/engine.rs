//! Single-query precompute pipeline: cache lookup, completion call,
//! explanation synthesis, cache write.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::cache::{cache_key, CacheStats, QueryCache};
use crate::completion::{ChatMessage, CompletionClient, CompletionRequest};
use crate::config::PrecomputeConfig;
use crate::error::Result;
use crate::synthesizer::ExplanationMethod;
use crate::types::{CacheEntry, EntryMetadata, Explanation};

const SYSTEM_PROMPT: &str = "You are a tactical operations assistant. Answer the operator's \
                             question concisely and concretely.";

/// Drives the query cache, the completion API, and the explanation method.
pub struct PrecomputeEngine {
    cache: QueryCache,
    client: Arc<dyn CompletionClient>,
    method: Arc<dyn ExplanationMethod>,
    config: PrecomputeConfig,
}

impl PrecomputeEngine {
    pub fn new(
        cache: QueryCache,
        client: Arc<dyn CompletionClient>,
        method: Arc<dyn ExplanationMethod>,
        config: PrecomputeConfig,
    ) -> Self {
        Self {
            cache,
            client,
            method,
            config,
        }
    }

    /// Precompute the entry for one query.
    ///
    /// A cache hit returns immediately with no upstream call. On a miss the
    /// completion API is called, the explanation derived, and the assembled
    /// entry written through the cache (best-effort). No partial cache write
    /// happens if any earlier step fails.
    pub async fn precompute(&self, query: &str) -> Result<CacheEntry> {
        if let Some(hit) = self.cache.lookup(query) {
            tracing::debug!("Cache hit for query: {}", query);
            return Ok(hit);
        }

        let answer_started = Instant::now();
        let answer = self.client.complete(self.completion_request(query)).await?;
        let answer_latency_ms = answer_started.elapsed().as_millis() as u64;

        let synthesis_started = Instant::now();
        let explanation = if self.config.xai_enabled {
            self.method.synthesize(query, &answer)?
        } else {
            Explanation::minimal(&answer)
        };
        let synthesis_latency_ms = synthesis_started.elapsed().as_millis() as u64;

        let entry = CacheEntry {
            key: cache_key(query),
            query: query.to_string(),
            confidence: explanation.confidence,
            metadata: EntryMetadata {
                model: self.config.model.clone(),
                estimated_tokens: estimate_tokens(&answer),
                answer_latency_ms,
                synthesis_latency_ms,
            },
            answer_text: answer,
            explanation,
            created_at: Utc::now(),
        };

        self.cache.store(entry.clone()).await;

        tracing::debug!(
            "Precomputed query in {}ms (+{}ms synthesis): {}",
            answer_latency_ms,
            synthesis_latency_ms,
            query
        );
        Ok(entry)
    }

    fn completion_request(&self, query: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(query)],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    pub fn config(&self) -> &PrecomputeConfig {
        &self.config
    }
}

/// Rough token estimate: four characters per token.
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::completion::testing::MockCompletionClient;
    use crate::error::PrecomputeError;
    use crate::synthesizer::{HeuristicSynthesizer, SequenceRandom};

    fn deterministic_method() -> Arc<dyn ExplanationMethod> {
        Arc::new(HeuristicSynthesizer::new(Box::new(SequenceRandom::new(
            vec![0.5],
        ))))
    }

    #[tokio::test]
    async fn test_miss_calls_upstream_and_caches() {
        let client = Arc::new(MockCompletionClient::new());
        let engine = testing::engine_with(client.clone()).await;

        let entry = engine.precompute("radar status?").await.unwrap();
        assert_eq!(entry.answer_text, "answer: radar status?");
        assert_eq!(entry.key, cache_key("radar status?"));
        assert_eq!(client.call_count(), 1);
        assert_eq!(engine.cache_stats().entry_count, 1);
    }

    #[tokio::test]
    async fn test_hit_skips_upstream() {
        let client = Arc::new(MockCompletionClient::new());
        let engine = testing::engine_with(client.clone()).await;

        let first = engine.precompute("radar status?").await.unwrap();
        // Normalization-equal query resolves to the same entry, no new call.
        let second = engine.precompute("  RADAR STATUS?  ").await.unwrap();

        assert_eq!(client.call_count(), 1);
        assert_eq!(first.key, second.key);
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn test_upstream_failure_writes_nothing() {
        let client = Arc::new(MockCompletionClient::new().fail_times("q", 1));
        let engine = testing::engine_with(client).await;

        let err = engine.precompute("q").await.unwrap_err();
        assert!(matches!(err, PrecomputeError::Upstream(_)));
        assert_eq!(engine.cache_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_synthesis_failure_writes_nothing() {
        struct FailingMethod;
        impl ExplanationMethod for FailingMethod {
            fn synthesize(&self, _: &str, _: &str) -> crate::error::Result<Explanation> {
                Err(PrecomputeError::Synthesis("boom".to_string()))
            }
            fn description(&self) -> String {
                "always fails".to_string()
            }
        }

        let config = PrecomputeConfig::default();
        let cache = QueryCache::load(Arc::new(MemoryStore::new()), 24).await;
        let engine = PrecomputeEngine::new(
            cache,
            Arc::new(MockCompletionClient::new()),
            Arc::new(FailingMethod),
            config,
        );

        let err = engine.precompute("q").await.unwrap_err();
        assert!(matches!(err, PrecomputeError::Synthesis(_)));
        assert_eq!(engine.cache_stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_xai_disabled_yields_minimal_explanation() {
        let config = PrecomputeConfig::default().without_xai();
        let cache = QueryCache::load(Arc::new(MemoryStore::new()), 24).await;
        let engine = PrecomputeEngine::new(
            cache,
            Arc::new(MockCompletionClient::new()),
            deterministic_method(),
            config,
        );

        let entry = engine.precompute("why intercept?").await.unwrap();
        assert!(entry.explanation.features.is_empty());
        assert_eq!(entry.confidence, 0.0);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
