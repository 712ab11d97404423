//! On-disk cache: `<dir>/audio/<key>.<ext>` files plus `<dir>/index.json`.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CacheBackend, CacheConfig, CacheEntryMeta, CacheStats, UsageRecord, summarize, unix_now};
use crate::errors::{SynthesisError, SynthesisResult};

const INDEX_FILE: &str = "index.json";
const AUDIO_DIR: &str = "audio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub voice: String,
    pub model: String,
    pub file_name: String,
    pub file_size: u64,
    /// Unix seconds
    pub created_at: u64,
    /// Unix seconds
    pub last_accessed: u64,
    pub access_count: u64,
}

type Index = HashMap<String, IndexEntry>;

/// Filesystem-backed [`CacheBackend`]
#[derive(Debug)]
pub struct FilesystemCache {
    dir: PathBuf,
    audio_dir: PathBuf,
    max_size_bytes: u64,
    max_size_gb: f64,
    max_age_days: u32,
    index: Mutex<Index>,
}

fn io_error(context: &str, path: &Path, e: std::io::Error) -> SynthesisError {
    SynthesisError::Cache(format!("{context} {}: {e}", path.display()))
}

impl FilesystemCache {
    /// Open or create a cache directory and drop entries past their maximum age.
    pub async fn open(dir: impl AsRef<Path>, config: &CacheConfig) -> SynthesisResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let audio_dir = dir.join(AUDIO_DIR);
        tokio::fs::create_dir_all(&audio_dir)
            .await
            .map_err(|e| io_error("Failed to create cache directory", &audio_dir, e))?;

        let index_path = dir.join(INDEX_FILE);
        let index: Index = match tokio::fs::read(&index_path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!(path = %index_path.display(), error = %e, "Cache index unreadable, starting empty");
                Index::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Index::new(),
            Err(e) => return Err(io_error("Failed to read cache index", &index_path, e)),
        };

        let cache = Self {
            dir,
            audio_dir,
            max_size_bytes: config.max_size_bytes(),
            max_size_gb: config.max_size_gb,
            max_age_days: config.max_age_days,
            index: Mutex::new(index),
        };
        cache.cleanup_expired().await?;
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, entry: &IndexEntry) -> PathBuf {
        self.audio_dir.join(&entry.file_name)
    }

    async fn persist(&self, index: &Index) -> SynthesisResult<()> {
        let path = self.dir.join(INDEX_FILE);
        let raw = serde_json::to_vec_pretty(index)
            .map_err(|e| SynthesisError::Cache(format!("Failed to serialize cache index: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| io_error("Failed to write cache index", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("Failed to replace cache index", &path, e))
    }

    async fn remove_file(&self, entry: &IndexEntry) {
        let path = self.file_path(entry);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove cached audio");
            }
        }
    }

    async fn cleanup_expired(&self) -> SynthesisResult<()> {
        let cutoff = unix_now().saturating_sub(u64::from(self.max_age_days) * 24 * 60 * 60);
        let mut index = self.index.lock().await;

        let expired: Vec<String> = index
            .iter()
            .filter(|(_, e)| e.created_at < cutoff)
            .map(|(k, _)| k.clone())
            .collect();
        if expired.is_empty() {
            return Ok(());
        }

        for key in &expired {
            if let Some(entry) = index.remove(key) {
                self.remove_file(&entry).await;
            }
        }
        info!(removed = expired.len(), "Cleaned up expired cache entries");
        self.persist(&index).await
    }

    /// Remove least recently used entries until the total fits the limit.
    async fn enforce_limit(&self, index: &mut Index) {
        let total: u64 = index.values().map(|e| e.file_size).sum();
        if total <= self.max_size_bytes {
            return;
        }

        let mut by_age: Vec<(String, u64, u64)> = index
            .iter()
            .map(|(k, e)| (k.clone(), e.last_accessed, e.file_size))
            .collect();
        by_age.sort_by_key(|(_, last_accessed, _)| *last_accessed);

        let to_remove = total - self.max_size_bytes;
        let mut removed = 0u64;
        for (key, _, size) in by_age {
            if removed >= to_remove {
                break;
            }
            if let Some(entry) = index.remove(&key) {
                self.remove_file(&entry).await;
            }
            removed += size;
        }
        info!(
            removed_mb = removed as f64 / 1024.0 / 1024.0,
            "Cache over size limit, evicted least recently used entries"
        );
    }
}

#[async_trait]
impl CacheBackend for FilesystemCache {
    async fn get(&self, key: &str) -> SynthesisResult<Option<Bytes>> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.get(key).cloned() else {
            return Ok(None);
        };

        let path = self.file_path(&entry);
        let audio = match tokio::fs::read(&path).await {
            Ok(audio) => audio,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "Removing stale cache entry");
                index.remove(key);
                self.persist(&index).await?;
                return Ok(None);
            }
            Err(e) => return Err(io_error("Failed to read cached audio", &path, e)),
        };

        if let Some(entry) = index.get_mut(key) {
            entry.last_accessed = unix_now();
            entry.access_count += 1;
        }
        self.persist(&index).await?;
        Ok(Some(Bytes::from(audio)))
    }

    async fn put(&self, key: &str, meta: CacheEntryMeta, audio: Bytes) -> SynthesisResult<()> {
        let file_name = format!("{key}.{}", meta.extension);
        let path = self.audio_dir.join(&file_name);
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| io_error("Failed to write cached audio", &path, e))?;

        let now = unix_now();
        let mut index = self.index.lock().await;
        index.insert(
            key.to_string(),
            IndexEntry {
                text: meta.text,
                voice: meta.voice,
                model: meta.model,
                file_name,
                file_size: audio.len() as u64,
                created_at: now,
                last_accessed: now,
                access_count: 1,
            },
        );
        self.enforce_limit(&mut index).await;
        self.persist(&index).await
    }

    async fn stats(&self) -> SynthesisResult<CacheStats> {
        let index = self.index.lock().await;
        let records: Vec<UsageRecord> = index
            .values()
            .map(|e| UsageRecord {
                voice: e.voice.clone(),
                size: e.file_size,
                last_accessed: e.last_accessed,
                access_count: e.access_count,
            })
            .collect();
        Ok(summarize(&records, self.max_size_gb, self.max_age_days))
    }

    async fn clear(&self) -> SynthesisResult<()> {
        let mut index = self.index.lock().await;
        if let Err(e) = tokio::fs::remove_dir_all(&self.audio_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(io_error("Failed to clear cache directory", &self.audio_dir, e));
            }
        }
        tokio::fs::create_dir_all(&self.audio_dir)
            .await
            .map_err(|e| io_error("Failed to create cache directory", &self.audio_dir, e))?;
        index.clear();
        self.persist(&index).await
    }
}
