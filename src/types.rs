//! Core data model: cache entries, explanations, and jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which explanation tab the chat interface should open first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationTab {
    Insight,
    Reasoning,
    Projection,
}

/// A single extracted feature with a signed importance score in [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: String,
    pub label: String,
}

/// Directed edge between two concept node ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConceptGraph {
    pub nodes: Vec<ConceptNode>,
    pub edges: Vec<ConceptEdge>,
}

/// An alternative outcome scenario shown alongside the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub title: String,
    pub details: String,
}

/// Pseudo-explanation derived from a query/answer pair.
///
/// This is an approximate, partly randomized stand-in for a real attribution
/// method. See [`crate::synthesizer`] for the derivation rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub primary_tab: ExplanationTab,
    pub insight: String,
    pub reasoning: String,
    pub projection: String,
    /// At most 8 features, in scan order.
    pub features: Vec<Feature>,
    /// At most 6 nodes, in first-match order.
    pub concept_graph: ConceptGraph,
    pub alternatives: Vec<Alternative>,
    /// Confidence score in [0, 95].
    pub confidence: f64,
    /// At most 4 follow-up prompts.
    pub suggested_prompts: Vec<String>,
}

impl Explanation {
    /// Bare explanation used when XAI synthesis is disabled.
    pub fn minimal(answer: &str) -> Self {
        Self {
            primary_tab: ExplanationTab::Insight,
            insight: answer.to_string(),
            reasoning: String::new(),
            projection: String::new(),
            features: Vec::new(),
            concept_graph: ConceptGraph::default(),
            alternatives: Vec::new(),
            confidence: 0.0,
            suggested_prompts: Vec::new(),
        }
    }
}

/// Timing and sizing metadata recorded alongside a cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub model: String,
    pub estimated_tokens: usize,
    pub answer_latency_ms: u64,
    pub synthesis_latency_ms: u64,
}

/// A precomputed answer plus explanation, addressed by the normalized query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 hex of the lowercased, trimmed query text.
    pub key: String,
    pub query: String,
    pub answer_text: String,
    pub explanation: Explanation,
    pub created_at: DateTime<Utc>,
    pub confidence: f64,
    pub metadata: EntryMetadata,
}

impl CacheEntry {
    /// Age of the entry relative to `now`, in milliseconds.
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_milliseconds()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A precompute batch job.
///
/// The orchestrator is the only writer; callers receive read-only snapshots.
/// Once `status` is terminal the record is immutable except for whole-job
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Immutable copy of the input query list.
    pub queries: Vec<String>,
    pub status: JobStatus,
    /// Percentage in [0, 100], non-decreasing while running.
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Completed entries, appended in chunk order as batches settle.
    pub results: Vec<CacheEntry>,
    /// `"<query>": <reason>` strings plus any job-level failure messages.
    pub errors: Vec<String>,
}

impl Job {
    pub fn new(queries: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            queries,
            status: JobStatus::Pending,
            progress: 0.0,
            start_time: Utc::now(),
            end_time: None,
            results: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    /// Wall-clock duration, available once the job has ended.
    pub fn processing_time_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}
