//! xai-precompute CLI: run a precompute job over a query file.
//!
//! ```bash
//! # Precompute answers for every question in questions.txt
//! xai-precompute -f questions.txt --batch-size 3
//!
//! # Export the job document next to the cache
//! xai-precompute -f questions.txt --export
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use xai_precompute::config::{BatchConfig, PrecomputeConfig};
use xai_precompute::synthesizer::{HeuristicSynthesizer, ThreadRandom};
use xai_precompute::{HttpCompletionClient, JobOrchestrator, PrecomputeEngine, QueryCache};

/// Precompute and cache explained answers for a fixed question set
#[derive(Parser, Debug)]
#[command(name = "xai-precompute")]
#[command(version, about, long_about = None)]
struct Args {
    /// File with queries, one per line (blank lines skipped)
    #[arg(short = 'f', long)]
    file: PathBuf,

    /// Config file path (default: <data-dir>/config.json)
    #[arg(short = 'c', long, env = "XAI_PRECOMPUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Queries dispatched concurrently per batch
    #[arg(long, default_value_t = 3)]
    batch_size: usize,

    /// Delay between batches in milliseconds
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,

    /// Skip the retry pass over failed queries
    #[arg(long)]
    no_retry: bool,

    /// Maximum retry rounds per failed query
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Write the job export document under the data directory
    #[arg(long)]
    export: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("xai_precompute=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PrecomputeConfig::load_or_default(path),
        None => {
            let default = PrecomputeConfig::default();
            let path = default.data_dir.join("config.json");
            PrecomputeConfig::load_or_default(&path)
        }
    };
    config.ensure_directories()?;

    let queries: Vec<String> = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read query file {:?}", args.file))?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    anyhow::ensure!(!queries.is_empty(), "query file contains no queries");

    let cache = QueryCache::load(
        Arc::new(xai_precompute::JsonFileStore::new(config.cache_path())),
        config.cache_ttl_hours,
    )
    .await;
    let client = Arc::new(HttpCompletionClient::new(&config));
    let method = Arc::new(HeuristicSynthesizer::new(Box::new(ThreadRandom)));
    let engine = Arc::new(PrecomputeEngine::new(cache, client, method, config.clone()));
    let orchestrator = JobOrchestrator::new(engine);

    let batch = BatchConfig {
        batch_size: args.batch_size,
        delay_between_batches_ms: args.delay_ms,
        retry_failed_queries: !args.no_retry,
        max_retries: args.max_retries,
        ..BatchConfig::default()
    };

    let job = orchestrator.create_job(queries);
    let done = orchestrator.execute_job(job.id, batch).await?;

    println!(
        "job {}: {:?}, {} results, {} errors",
        done.id,
        done.status,
        done.results.len(),
        done.errors.len()
    );
    for error in &done.errors {
        eprintln!("  {error}");
    }

    let stats = orchestrator.stats();
    println!(
        "cache: {} entries; successful queries: {}/{}",
        stats.cache.entry_count, stats.successful_queries, stats.total_queries
    );

    if args.export {
        let path = xai_precompute::export::write_export(&done, &config.exports_dir()).await?;
        println!("export written to {}", path.display());
    }

    Ok(())
}
