//! Job lifecycle and batch execution.
//!
//! The orchestrator exclusively owns the job table and is its only writer;
//! callers get cloned snapshots. Admission is single-flight: exactly one job
//! may run system-wide, enforced by one exclusive flag. That flag is the
//! entirety of the locking discipline, since all other state is job-local.
//!
//! Cancellation is cooperative and non-aborting: flipping a job to `Failed`
//! does not abort in-flight completion calls; their results are discarded on
//! arrival because every append re-checks that the job is still running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::cache::CacheStats;
use crate::config::BatchConfig;
use crate::engine::PrecomputeEngine;
use crate::error::{PrecomputeError, Result};
use crate::types::{Job, JobStatus};

pub struct JobOrchestrator {
    engine: Arc<PrecomputeEngine>,
    jobs: RwLock<HashMap<Uuid, Job>>,
    /// Single-flight admission flag. Set by `execute_job`, released by the
    /// terminal transition (normal finish, cancel, or delete of the runner).
    running: AtomicBool,
}

impl JobOrchestrator {
    pub fn new(engine: Arc<PrecomputeEngine>) -> Self {
        Self {
            engine,
            jobs: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Allocate a new pending job holding an immutable copy of the query
    /// list. Does not start execution.
    pub fn create_job(&self, queries: Vec<String>) -> Job {
        let job = Job::new(queries);
        self.jobs.write().insert(job.id, job.clone());
        tracing::info!("Created job {} ({} queries)", job.id, job.queries.len());
        job
    }

    /// Execute a pending job to a terminal state and return its final
    /// snapshot.
    ///
    /// Fails with `JobNotFound` for unknown ids, `InvalidJobState` for jobs
    /// that are not pending (terminal jobs are immutable except whole-job
    /// deletion, so a job runs at most once), and `JobConflict` when any
    /// other job is currently running.
    pub async fn execute_job(&self, id: Uuid, config: BatchConfig) -> Result<Job> {
        let config = config.normalized();

        {
            let jobs = self.jobs.read();
            let job = jobs.get(&id).ok_or(PrecomputeError::JobNotFound(id))?;
            if job.status != JobStatus::Pending {
                return Err(not_pending(id, job.status));
            }
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PrecomputeError::JobConflict);
        }

        let queries = {
            let mut jobs = self.jobs.write();
            let Some(job) = jobs.get_mut(&id) else {
                self.running.store(false, Ordering::SeqCst);
                return Err(PrecomputeError::JobNotFound(id));
            };
            // Re-checked under the write lock: the status may have changed
            // between the unlocked check and admission.
            if job.status != JobStatus::Pending {
                self.running.store(false, Ordering::SeqCst);
                return Err(not_pending(id, job.status));
            }
            job.status = JobStatus::Running;
            job.start_time = Utc::now();
            job.progress = 0.0;
            job.queries.clone()
        };

        tracing::info!(
            "Executing job {}: {} queries in {} batches of {}",
            id,
            queries.len(),
            batch_count(queries.len(), config.batch_size),
            config.batch_size
        );

        let outcome = self.run_batches(id, &queries, &config).await;

        // Terminal transition. Skipped when the job was cancelled or deleted
        // mid-run: that path already released the admission flag, which may
        // since have been claimed by another job.
        let mut jobs = self.jobs.write();
        match jobs.get_mut(&id) {
            Some(job) => {
                if job.status == JobStatus::Running {
                    match outcome {
                        Ok(()) => job.status = JobStatus::Completed,
                        Err(e) => {
                            tracing::error!("Job {} failed: {}", id, e);
                            job.errors.push(e.to_string());
                            job.status = JobStatus::Failed;
                        }
                    }
                    job.end_time = Some(Utc::now());
                    self.running.store(false, Ordering::SeqCst);
                }
                Ok(job.clone())
            }
            None => Err(PrecomputeError::JobNotFound(id)),
        }
    }

    /// Cancel a running job: terminal `Failed`, cancellation marker appended,
    /// admission flag released immediately. In-flight completion calls are
    /// not aborted; their eventual results are discarded on arrival.
    pub fn cancel_job(&self, id: Uuid) -> Result<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or(PrecomputeError::JobNotFound(id))?;

        if job.status != JobStatus::Running {
            return Err(PrecomputeError::InvalidJobState(format!(
                "job {id} is not running, nothing to cancel"
            )));
        }

        job.status = JobStatus::Failed;
        job.errors.push("cancelled by operator".to_string());
        job.end_time = Some(Utc::now());
        self.running.store(false, Ordering::SeqCst);

        tracing::info!("Cancelled job {}", id);
        Ok(job.clone())
    }

    /// Remove a job record entirely, regardless of status.
    pub fn delete_job(&self, id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.write();
        let job = jobs.remove(&id).ok_or(PrecomputeError::JobNotFound(id))?;

        // Deleting the runner must not leave admission blocked forever.
        if job.status == JobStatus::Running {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn get_job(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().get(&id).cloned()
    }

    pub fn get_all_jobs(&self) -> Vec<Job> {
        self.jobs.read().values().cloned().collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache_stats()
    }

    pub fn engine(&self) -> &Arc<PrecomputeEngine> {
        &self.engine
    }

    fn is_running(&self, id: Uuid) -> bool {
        self.jobs
            .read()
            .get(&id)
            .map(|job| job.status == JobStatus::Running)
            .unwrap_or(false)
    }

    /// Chunk loop plus retry pass. Per-query failures are isolated into the
    /// job's error list and never abort sibling queries or the batch.
    async fn run_batches(&self, id: Uuid, queries: &[String], config: &BatchConfig) -> Result<()> {
        if queries.is_empty() {
            if let Some(job) = self.jobs.write().get_mut(&id) {
                job.progress = 100.0;
            }
            return Ok(());
        }

        let total = queries.len();
        let mut processed = 0usize;
        let mut failures: Vec<(String, String)> = Vec::new();

        let chunks: Vec<&[String]> = queries.chunks(config.batch_size).collect();
        let chunk_total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            if !self.is_running(id) {
                return Ok(());
            }

            // Settle-all: every dispatched call finishes before the chunk is
            // done; attribution is by input position, not arrival order.
            let settled =
                futures::future::join_all(chunk.iter().map(|q| self.engine.precompute(q))).await;
            processed += chunk.len();

            {
                let mut jobs = self.jobs.write();
                let Some(job) = jobs.get_mut(&id) else {
                    return Ok(());
                };
                if job.status != JobStatus::Running {
                    tracing::debug!("Discarding settled batch for terminal job {}", id);
                    return Ok(());
                }

                for (query, result) in chunk.iter().zip(settled) {
                    match result {
                        Ok(entry) => job.results.push(entry),
                        Err(e) => {
                            let reason = e.to_string();
                            job.errors.push(error_line(query, &reason));
                            failures.push((query.clone(), reason));
                        }
                    }
                }
                job.progress = 100.0 * processed as f64 / total as f64;
            }

            if index + 1 < chunk_total && config.delay_between_batches_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.delay_between_batches_ms)).await;
            }
        }

        if config.retry_failed_queries && !failures.is_empty() {
            self.retry_failures(id, failures, config).await;
        }

        Ok(())
    }

    /// Sequential retry rounds over the failed queries, with exponential
    /// backoff `base * 2^(round-1)` before each round. A query that succeeds
    /// moves from `errors` to `results`; one that keeps failing stays
    /// recorded exactly once with its latest reason.
    async fn retry_failures(
        &self,
        id: Uuid,
        mut failures: Vec<(String, String)>,
        config: &BatchConfig,
    ) {
        for round in 1..=config.max_retries {
            if failures.is_empty() || !self.is_running(id) {
                return;
            }

            let backoff = config
                .retry_base_delay_ms
                .saturating_mul(1u64 << (round - 1).min(16));
            if backoff > 0 {
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            tracing::debug!(
                "Retry round {}/{} for job {} ({} queries)",
                round,
                config.max_retries,
                id,
                failures.len()
            );

            let mut still_failing = Vec::new();
            for (query, _) in failures {
                if !self.is_running(id) {
                    return;
                }

                match self.engine.precompute(&query).await {
                    Ok(entry) => {
                        let mut jobs = self.jobs.write();
                        if let Some(job) = jobs.get_mut(&id) {
                            if job.status == JobStatus::Running {
                                remove_error_line(job, &query);
                                job.results.push(entry);
                            }
                        }
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        let mut jobs = self.jobs.write();
                        if let Some(job) = jobs.get_mut(&id) {
                            if job.status == JobStatus::Running {
                                remove_error_line(job, &query);
                                job.errors.push(error_line(&query, &reason));
                            }
                        }
                        still_failing.push((query, reason));
                    }
                }
            }
            failures = still_failing;
        }
    }
}

fn not_pending(id: Uuid, status: JobStatus) -> PrecomputeError {
    PrecomputeError::InvalidJobState(format!(
        "job {id} is {status:?}, only pending jobs can be executed"
    ))
}

fn batch_count(total: usize, batch_size: usize) -> usize {
    total.div_ceil(batch_size.max(1))
}

fn error_line(query: &str, reason: &str) -> String {
    format!("\"{query}\": {reason}")
}

fn remove_error_line(job: &mut Job, query: &str) {
    let prefix = format!("\"{query}\":");
    if let Some(pos) = job.errors.iter().position(|e| e.starts_with(&prefix)) {
        job.errors.remove(pos);
    }
}
