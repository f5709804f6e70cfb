//! Tiered TTL cache for Pistelink
//!
//! One keyed store covering three data categories (terrain grids, run
//! definitions, raw agent responses), each with its own time-to-live.
//! Entries live as JSON files under the cache directory and are mirrored in
//! memory once touched. Expiry is lazy: expired entries are treated as
//! absent and deleted when a read trips over them, or in bulk by `cleanup`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pistelink_config::paths::safe_filename;
use pistelink_config::CacheConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Cache storage errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache encode error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// The three data categories sharing the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Terrain,
    Run,
    /// Raw agent responses (hill-metrics, weather, equipment)
    AgentResponse,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Terrain, Category::Run, Category::AgentResponse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Terrain => "terrain",
            Category::Run => "run",
            Category::AgentResponse => "agent",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key helpers for the partitioned key space
pub mod keys {
    /// `terrain:{run}:{grid}`
    pub fn terrain(run_id: &str, grid: &str) -> String {
        format!("terrain:{run_id}:{grid}")
    }

    /// `run:{run}`
    pub fn run(run_id: &str) -> String {
        format!("run:{run_id}")
    }

    /// `agent:{agent}:{area}`
    pub fn agent(agent: &str, area_id: &str) -> String {
        format!("agent:{agent}:{area_id}")
    }
}

/// One stored payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: String,
}

impl CacheEntry {
    /// Logically absent once past its expiry, even while still stored
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Everything still valid for rendering a run without live calls
#[derive(Debug, Clone, Default, Serialize)]
pub struct OfflineBundle {
    pub terrain: Option<Value>,
    pub run: Option<Value>,
    pub hill_metrics: Option<Value>,
    pub weather: Option<Value>,
    pub equipment: Option<Value>,
}

impl OfflineBundle {
    /// Terrain plus run definition is the minimum to render at all
    pub fn is_renderable(&self) -> bool {
        self.terrain.is_some() && self.run.is_some()
    }
}

/// Per-category observability numbers
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CategoryStats {
    pub entries: usize,
    pub approx_bytes: u64,
}

/// Store-wide observability numbers
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub terrain: CategoryStats,
    pub run: CategoryStats,
    pub agent: CategoryStats,
}

impl CacheStats {
    pub fn total_entries(&self) -> usize {
        self.terrain.entries + self.run.entries + self.agent.entries
    }
}

struct Ttls {
    terrain: Duration,
    run: Duration,
    agent: Duration,
}

struct CacheInner {
    dir: PathBuf,
    version: String,
    max_entries: usize,
    ttls: Ttls,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

/// Disk-backed TTL cache shared by all fetch paths
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<CacheInner>,
}

impl TieredCache {
    pub fn new(dir: impl AsRef<Path>, config: &CacheConfig) -> Self {
        let dir = dir.as_ref().to_path_buf();
        for category in Category::ALL {
            std::fs::create_dir_all(dir.join(category.as_str())).ok();
        }

        Self {
            inner: Arc::new(CacheInner {
                dir,
                version: config.version.clone(),
                max_entries: config.max_entries,
                ttls: Ttls {
                    terrain: Duration::from_secs(config.terrain_ttl_s),
                    run: Duration::from_secs(config.run_ttl_s),
                    agent: Duration::from_secs(config.agent_ttl_s),
                },
                entries: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Configured TTL for a category
    pub fn ttl(&self, category: Category) -> Duration {
        match category {
            Category::Terrain => self.inner.ttls.terrain,
            Category::Run => self.inner.ttls.run,
            Category::AgentResponse => self.inner.ttls.agent,
        }
    }

    /// Store a payload, overwriting any previous entry for the key
    pub async fn write(
        &self,
        category: Category,
        key: &str,
        payload: Value,
        ttl_override: Option<Duration>,
    ) -> Result<()> {
        let ttl = ttl_override.unwrap_or_else(|| self.ttl(category));
        let now = Utc::now();
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            created_at: now,
            expires_at: now + ChronoDuration::milliseconds(ttl.as_millis() as i64),
            version: self.inner.version.clone(),
        };

        let path = self.entry_path(category, key);
        let content = serde_json::to_string_pretty(&entry)?;
        tokio::fs::write(&path, content).await?;

        self.inner
            .entries
            .write()
            .await
            .insert(composite(category, key), entry);

        debug!(category = category.as_str(), key, "cache write");
        Ok(())
    }

    /// Payload if present and unexpired; never returns stale data
    pub async fn read(&self, category: Category, key: &str) -> Option<Value> {
        if !self.ensure_fresh(category, key).await {
            return None;
        }
        self.inner
            .entries
            .read()
            .await
            .get(&composite(category, key))
            .map(|entry| entry.payload.clone())
    }

    /// Same expiry semantics as `read` without cloning the payload
    pub async fn contains(&self, category: Category, key: &str) -> bool {
        self.ensure_fresh(category, key).await
    }

    /// Explicitly drop one entry
    pub async fn invalidate(&self, category: Category, key: &str) -> bool {
        let removed_memory = self
            .inner
            .entries
            .write()
            .await
            .remove(&composite(category, key))
            .is_some();
        let removed_disk = tokio::fs::remove_file(self.entry_path(category, key))
            .await
            .is_ok();

        if removed_memory || removed_disk {
            debug!(category = category.as_str(), key, "cache invalidate");
        }
        removed_memory || removed_disk
    }

    /// Drop everything across all categories
    pub async fn clear(&self) -> Result<()> {
        self.inner.entries.write().await.clear();
        for category in Category::ALL {
            let dir = self.inner.dir.join(category.as_str());
            if tokio::fs::remove_dir_all(&dir).await.is_ok() {
                tokio::fs::create_dir_all(&dir).await?;
            }
        }
        debug!("cache cleared");
        Ok(())
    }

    /// True only when both the terrain grid and the run definition are fresh
    pub async fn is_offline_available(&self, run_id: &str, grid: &str) -> bool {
        self.contains(Category::Terrain, &keys::terrain(run_id, grid))
            .await
            && self.contains(Category::Run, &keys::run(run_id)).await
    }

    /// Collect whatever is still valid for the run; callers handle the gaps
    pub async fn assemble_offline_bundle(&self, run_id: &str, grid: &str) -> OfflineBundle {
        OfflineBundle {
            terrain: self
                .read(Category::Terrain, &keys::terrain(run_id, grid))
                .await,
            run: self.read(Category::Run, &keys::run(run_id)).await,
            hill_metrics: self
                .read(Category::AgentResponse, &keys::agent("hill-metrics", run_id))
                .await,
            weather: self
                .read(Category::AgentResponse, &keys::agent("weather", run_id))
                .await,
            equipment: self
                .read(Category::AgentResponse, &keys::agent("equipment", run_id))
                .await,
        }
    }

    /// Sweep expired and version-mismatched entries; returns how many were
    /// removed. Unexpired entries are never touched, whatever the count.
    pub async fn cleanup(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for category in Category::ALL {
            let dir = self.inner.dir.join(category.as_str());
            let mut dirents = match tokio::fs::read_dir(&dir).await {
                Ok(dirents) => dirents,
                Err(_) => continue,
            };

            while let Ok(Some(dirent)) = dirents.next_entry().await {
                let path = dirent.path();
                let entry = read_entry(&path).await;
                let stale = match &entry {
                    Some(entry) => entry.version != self.inner.version || entry.is_expired(now),
                    // Unreadable entries are dead weight too
                    None => true,
                };

                if stale {
                    if let Some(entry) = entry {
                        self.inner
                            .entries
                            .write()
                            .await
                            .remove(&composite(category, &entry.key));
                    }
                    if tokio::fs::remove_file(&path).await.is_ok() {
                        removed += 1;
                    }
                }
            }
        }

        let stats = self.stats().await;
        if stats.total_entries() > self.inner.max_entries {
            warn!(
                entries = stats.total_entries(),
                max_entries = self.inner.max_entries,
                "cache exceeds its advisory size cap"
            );
        }

        debug!(removed, "cache cleanup");
        Ok(removed)
    }

    /// Entry counts and approximate payload sizes per category
    pub async fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for category in Category::ALL {
            let mut bucket = CategoryStats::default();
            let dir = self.inner.dir.join(category.as_str());
            if let Ok(mut dirents) = tokio::fs::read_dir(&dir).await {
                while let Ok(Some(dirent)) = dirents.next_entry().await {
                    if let Ok(meta) = dirent.metadata().await {
                        bucket.entries += 1;
                        bucket.approx_bytes += meta.len();
                    }
                }
            }
            match category {
                Category::Terrain => stats.terrain = bucket,
                Category::Run => stats.run = bucket,
                Category::AgentResponse => stats.agent = bucket,
            }
        }
        stats
    }

    /// Load the entry if needed and evict it when stale. Returns whether a
    /// fresh entry is present afterwards.
    async fn ensure_fresh(&self, category: Category, key: &str) -> bool {
        let composite_key = composite(category, key);
        let mut entries = self.inner.entries.write().await;

        if !entries.contains_key(&composite_key) {
            if let Some(entry) = read_entry(&self.entry_path(category, key)).await {
                entries.insert(composite_key.clone(), entry);
            }
        }

        let stale = match entries.get(&composite_key) {
            None => return false,
            Some(entry) => {
                entry.version != self.inner.version || entry.is_expired(Utc::now())
            }
        };

        if stale {
            debug!(category = category.as_str(), key, "evicting stale entry");
            entries.remove(&composite_key);
            drop(entries);
            let _ = tokio::fs::remove_file(self.entry_path(category, key)).await;
            return false;
        }
        true
    }

    fn entry_path(&self, category: Category, key: &str) -> PathBuf {
        self.inner
            .dir
            .join(category.as_str())
            .join(format!("{}.json", safe_filename(key)))
    }
}

fn composite(category: Category, key: &str) -> String {
    format!("{}/{}", category.as_str(), key)
}

async fn read_entry(path: &Path) -> Option<CacheEntry> {
    if !path.exists() {
        return None;
    }
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "unreadable cache entry");
                None
            }
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read cache entry");
            None
        }
    }
}
