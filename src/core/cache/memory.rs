//! In-process cache backed by `moka`.

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{CacheBackend, CacheConfig, CacheEntryMeta, CacheStats, UsageRecord, summarize, unix_now};
use crate::errors::SynthesisResult;

#[derive(Debug)]
struct MemoryEntry {
    meta: CacheEntryMeta,
    audio: Bytes,
    last_accessed: AtomicU64,
    access_count: AtomicU64,
}

/// Size-weighted in-memory [`CacheBackend`] with a time-to-live of the maximum age
#[derive(Clone)]
pub struct MemoryCacheBackend {
    cache: Cache<String, Arc<MemoryEntry>>,
    max_size_gb: f64,
    max_age_days: u32,
}

impl std::fmt::Debug for MemoryCacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCacheBackend")
            .field("entries", &self.cache.entry_count())
            .field("max_size_gb", &self.max_size_gb)
            .finish()
    }
}

impl MemoryCacheBackend {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_size_bytes())
            .weigher(|_key: &String, entry: &Arc<MemoryEntry>| {
                u32::try_from(entry.audio.len()).unwrap_or(u32::MAX)
            })
            .time_to_live(config.max_age())
            .build();
        Self {
            cache,
            max_size_gb: config.max_size_gb,
            max_age_days: config.max_age_days,
        }
    }

    /// Apply pending evictions and expirations.
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> SynthesisResult<Option<Bytes>> {
        Ok(self.cache.get(key).await.map(|entry| {
            entry.last_accessed.store(unix_now(), Ordering::Relaxed);
            entry.access_count.fetch_add(1, Ordering::Relaxed);
            entry.audio.clone()
        }))
    }

    async fn put(&self, key: &str, meta: CacheEntryMeta, audio: Bytes) -> SynthesisResult<()> {
        let entry = MemoryEntry {
            meta,
            audio,
            last_accessed: AtomicU64::new(unix_now()),
            access_count: AtomicU64::new(1),
        };
        self.cache.insert(key.to_string(), Arc::new(entry)).await;
        Ok(())
    }

    async fn stats(&self) -> SynthesisResult<CacheStats> {
        self.sync().await;
        let records: Vec<UsageRecord> = self
            .cache
            .iter()
            .map(|(_, entry)| UsageRecord {
                voice: entry.meta.voice.clone(),
                size: entry.audio.len() as u64,
                last_accessed: entry.last_accessed.load(Ordering::Relaxed),
                access_count: entry.access_count.load(Ordering::Relaxed),
            })
            .collect();
        Ok(summarize(&records, self.max_size_gb, self.max_age_days))
    }

    async fn clear(&self) -> SynthesisResult<()> {
        self.cache.invalidate_all();
        self.sync().await;
        Ok(())
    }
}
