//! Precompute and cache explained answers for a fixed set of operator
//! questions, so a chat surface can respond instantly from cache instead of
//! issuing a live completion call per request.
//!
//! ## Architecture
//!
//! - [`cache::QueryCache`]: content-addressed store over a durable
//!   load-all/replace-all slot, with TTL expiry at load time.
//! - [`synthesizer::HeuristicSynthesizer`]: randomized pseudo-explanation
//!   stand-in behind the pluggable [`synthesizer::ExplanationMethod`] trait.
//! - [`engine::PrecomputeEngine`]: per-query pipeline of lookup, completion
//!   call, synthesis, cache write.
//! - [`orchestrator::JobOrchestrator`]: job lifecycle, chunked
//!   bounded-concurrency execution, retry/backoff, single-flight admission.
//! - [`stats`]: read-only rollup over the job table.
//! - [`export`]: downloadable job summary documents.

pub mod cache;
pub mod completion;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod stats;
pub mod synthesizer;
pub mod types;

pub use cache::{CacheStore, JsonFileStore, MemoryStore, QueryCache};
pub use completion::{CompletionClient, HttpCompletionClient};
pub use config::{BatchConfig, PrecomputeConfig};
pub use engine::PrecomputeEngine;
pub use error::{PrecomputeError, Result};
pub use orchestrator::JobOrchestrator;
pub use stats::PrecomputeStats;
pub use synthesizer::{ExplanationMethod, HeuristicSynthesizer, RandomSource, ThreadRandom};
pub use types::{CacheEntry, Explanation, Job, JobStatus};
