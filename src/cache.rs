//! Content-addressed query cache backed by a durable load-all/replace-all slot.
//!
//! Keys are SHA-256 digests of the normalized (lowercased, trimmed) query
//! text, so repeated questions dedupe across jobs. Persistence is
//! write-through and best-effort: a failed save is logged and swallowed,
//! never surfaced to the caller.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use crate::types::CacheEntry;

/// Derive the cache key for a query: SHA-256 hex of the normalized text.
pub fn cache_key(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    let digest = sha2::Sha256::digest(normalized.as_bytes());

    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Durable slot holding the full entry set as one JSON array.
///
/// The cache treats it as "load all, mutate in memory, save all"; no partial
/// writes.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<CacheEntry>>;
    async fn save_all(&self, entries: &[CacheEntry]) -> Result<()>;
}

/// File-backed store: one JSON array under a well-known path.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<CacheEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .context("Failed to read cache file")?;
        let entries = serde_json::from_str(&content).context("Failed to parse cache file")?;
        Ok(entries)
    }

    async fn save_all(&self, entries: &[CacheEntry]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create cache directory")?;
        }
        let content = serde_json::to_string(entries).context("Failed to serialize cache")?;
        tokio::fs::write(&self.path, content)
            .await
            .context("Failed to write cache file")?;
        Ok(())
    }
}

/// In-memory store for tests and demos.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CacheEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.entries.read().clone())
    }

    async fn save_all(&self, entries: &[CacheEntry]) -> Result<()> {
        *self.entries.write() = entries.to_vec();
        Ok(())
    }
}

/// Cache size and age statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: usize,
    /// Age of the oldest live entry in milliseconds, if any
    pub oldest_entry_age_ms: Option<i64>,
    /// Age of the newest live entry in milliseconds, if any
    pub newest_entry_age_ms: Option<i64>,
}

/// In-memory map of normalized query key to cached result.
pub struct QueryCache {
    store: Arc<dyn CacheStore>,
    ttl_hours: u64,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl QueryCache {
    /// Load the cache from the durable store, dropping expired records.
    ///
    /// Expired records never resurface even though they may still exist
    /// physically in the backing store until the next full resave. A load
    /// failure starts the cache empty.
    pub async fn load(store: Arc<dyn CacheStore>, ttl_hours: u64) -> Self {
        let ttl_ms = ttl_hours as i64 * 3_600_000;
        let now = Utc::now();

        let mut entries = HashMap::new();
        match store.load_all().await {
            Ok(records) => {
                let total = records.len();
                for entry in records {
                    if entry.age_ms(now) < ttl_ms {
                        // Last write wins on duplicate keys.
                        entries.insert(entry.key.clone(), entry);
                    }
                }
                tracing::debug!(
                    "Loaded {} cache entries ({} expired or duplicate)",
                    entries.len(),
                    total - entries.len()
                );
            }
            Err(e) => {
                tracing::warn!("Failed to load query cache, starting empty: {}", e);
            }
        }

        Self {
            store,
            ttl_hours,
            entries: RwLock::new(entries),
        }
    }

    /// Look up a cached entry by query text.
    pub fn lookup(&self, query: &str) -> Option<CacheEntry> {
        self.entries.read().get(&cache_key(query)).cloned()
    }

    /// Insert an entry and persist the full set, write-through.
    ///
    /// Persistence failures are logged and swallowed; caching is best-effort
    /// and must never fail the caller's operation.
    pub async fn store(&self, entry: CacheEntry) {
        let snapshot: Vec<CacheEntry> = {
            let mut entries = self.entries.write();
            entries.insert(entry.key.clone(), entry);
            entries.values().cloned().collect()
        };

        if let Err(e) = self.store.save_all(&snapshot).await {
            tracing::warn!("Failed to persist query cache: {}", e);
        }
    }

    /// Empty the cache and persist the empty set.
    pub async fn clear(&self) {
        self.entries.write().clear();
        if let Err(e) = self.store.save_all(&[]).await {
            tracing::warn!("Failed to persist cleared cache: {}", e);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn ttl_hours(&self) -> u64 {
        self.ttl_hours
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let now = Utc::now();
        let ages: Vec<i64> = entries.values().map(|e| e.age_ms(now)).collect();

        CacheStats {
            entry_count: entries.len(),
            oldest_entry_age_ms: ages.iter().max().copied(),
            newest_entry_age_ms: ages.iter().min().copied(),
        }
    }
}
