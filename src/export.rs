//! Job export: a downloadable JSON document summarizing a job's outcome.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CacheEntry, Job, JobStatus};

/// Flattened job header embedded in the export document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_queries: usize,
    pub successful_results: usize,
    pub errors_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExport {
    pub job: JobSummary,
    pub results: Vec<CacheEntry>,
    pub errors: Vec<String>,
    pub export_timestamp: DateTime<Utc>,
}

/// Build the export document for a job snapshot.
pub fn export_job(job: &Job) -> JobExport {
    JobExport {
        job: JobSummary {
            id: job.id,
            status: job.status,
            progress: job.progress,
            start_time: job.start_time,
            end_time: job.end_time,
            total_queries: job.queries.len(),
            successful_results: job.results.len(),
            errors_count: job.errors.len(),
        },
        results: job.results.clone(),
        errors: job.errors.clone(),
        export_timestamp: Utc::now(),
    }
}

/// `precompute_job_<id>_<YYYY-MM-DD>.json`
pub fn export_filename(job: &Job) -> String {
    format!(
        "precompute_job_{}_{}.json",
        job.id,
        Utc::now().format("%Y-%m-%d")
    )
}

/// Write the export document into `dir`, returning the file path.
pub async fn write_export(job: &Job, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(export_filename(job));
    let content =
        serde_json::to_string_pretty(&export_job(job)).context("Failed to serialize export")?;

    tokio::fs::create_dir_all(dir)
        .await
        .context("Failed to create export directory")?;
    tokio::fs::write(&path, content)
        .await
        .context("Failed to write export file")?;

    tracing::info!("Exported job {} to {:?}", job.id, path);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn completed_job() -> Job {
        let mut job = Job::new(vec!["q1".to_string(), "q2".to_string(), "q3".to_string()]);
        job.status = JobStatus::Completed;
        job.progress = 100.0;
        job.end_time = Some(Utc::now());
        job.results.push(crate::cache::tests::entry_for("q1"));
        job.results.push(crate::cache::tests::entry_for("q2"));
        job.errors.push("\"q3\": simulated".to_string());
        job
    }

    #[test]
    fn test_export_counts_match_job() {
        let job = completed_job();
        let export = export_job(&job);

        assert_eq!(export.results.len(), job.results.len());
        assert_eq!(export.job.total_queries, job.queries.len());
        assert_eq!(export.job.successful_results, 2);
        assert_eq!(export.job.errors_count, 1);
    }

    #[test]
    fn test_export_filename_shape() {
        let job = completed_job();
        let name = export_filename(&job);
        assert!(name.starts_with(&format!("precompute_job_{}_", job.id)));
        assert!(name.ends_with(".json"));
    }

    #[tokio::test]
    async fn test_write_export_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let job = completed_job();

        let path = write_export(&job, temp_dir.path()).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: JobExport = serde_json::from_str(&content).unwrap();

        assert_eq!(parsed.job.id, job.id);
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.errors.len(), 1);
    }
}
