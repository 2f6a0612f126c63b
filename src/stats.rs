//! Read-only statistics rollup over the job table.
//!
//! Nothing is stored separately; every call recomputes from the live jobs
//! plus the cache's own counters.

use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::orchestrator::JobOrchestrator;
use crate::types::{Job, JobStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputeStats {
    pub total_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
    /// Sum of input query counts across all jobs
    pub total_queries: usize,
    /// Sum of produced results across all jobs
    pub successful_queries: usize,
    /// Mean wall-clock duration over jobs that have ended
    pub average_processing_time_ms: Option<f64>,
    pub cache: CacheStats,
}

/// Roll up the given job snapshots and cache counters.
pub fn collect(jobs: &[Job], cache: CacheStats) -> PrecomputeStats {
    let durations: Vec<i64> = jobs.iter().filter_map(|j| j.processing_time_ms()).collect();
    let average_processing_time_ms = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64)
    };

    PrecomputeStats {
        total_jobs: jobs.len(),
        completed_jobs: jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .count(),
        failed_jobs: jobs.iter().filter(|j| j.status == JobStatus::Failed).count(),
        total_queries: jobs.iter().map(|j| j.queries.len()).sum(),
        successful_queries: jobs.iter().map(|j| j.results.len()).sum(),
        average_processing_time_ms,
        cache,
    }
}

impl JobOrchestrator {
    /// Current rollup over this orchestrator's job table.
    pub fn stats(&self) -> PrecomputeStats {
        collect(&self.get_all_jobs(), self.cache_stats())
    }
}
