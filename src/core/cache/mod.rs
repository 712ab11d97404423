//! Synthesized-audio cache.
//!
//! Encoded responses are cached under a SHA-256 key of the normalized text,
//! the lowercased voice and a model id. The model id is an xxh3 hash of every
//! setting that changes the generated audio, so changing the deployment's
//! sampling or codec configuration never serves stale audio.
//!
//! Two backends implement [`CacheBackend`]: [`FilesystemCache`], which keeps
//! audio files plus a JSON index on disk, and [`MemoryCacheBackend`], built
//! on `moka`.

pub mod filesystem;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::SynthesisResult;

pub use filesystem::FilesystemCache;
pub use memory::MemoryCacheBackend;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const SECS_PER_DAY: u64 = 24 * 60 * 60;

// =============================================================================
// Key Hashing
// =============================================================================

/// Hashes a string into a fixed-width hex key
pub trait KeyHasher: Send + Sync {
    fn hash(&self, key: &str) -> String;
}

/// SHA-256 hex digest
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn hash(&self, key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }
}

/// xxh3-128 hex digest with a namespace prefix
#[derive(Debug, Clone)]
pub struct XxHasher {
    namespace: String,
}

impl XxHasher {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl KeyHasher for XxHasher {
    fn hash(&self, key: &str) -> String {
        let hash = xxh3_128(format!("{}|{key}", self.namespace).as_bytes());
        format!("{hash:032x}")
    }
}

/// Lowercase and collapse whitespace
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cache key for a text/voice/model triple
pub fn cache_key(text: &str, voice: &str, model_id: &str) -> String {
    Sha256Hasher.hash(&format!(
        "{}|{}|{model_id}",
        normalize_text(text),
        voice.to_lowercase()
    ))
}

// =============================================================================
// Backend Contract
// =============================================================================

/// Descriptive fields stored with a cached payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryMeta {
    pub text: String,
    pub voice: String,
    pub model: String,
    /// File extension of the payload, e.g. `wav`
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceCount {
    pub voice: String,
    pub count: usize,
}

/// Cache usage summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_mb: f64,
    pub total_accesses: u64,
    pub avg_accesses: f64,
    pub recent_entries_24h: usize,
    pub max_size_gb: f64,
    pub max_age_days: u32,
    pub top_voices: Vec<VoiceCount>,
}

/// Usage record for one entry, shared by the stats computation
#[derive(Debug, Clone)]
pub(crate) struct UsageRecord {
    pub voice: String,
    pub size: u64,
    pub last_accessed: u64,
    pub access_count: u64,
}

/// Storage for encoded audio payloads
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a payload, recording the access.
    async fn get(&self, key: &str) -> SynthesisResult<Option<Bytes>>;

    /// Store a payload, evicting least recently used entries over the size limit.
    async fn put(&self, key: &str, meta: CacheEntryMeta, audio: Bytes) -> SynthesisResult<()>;

    async fn stats(&self) -> SynthesisResult<CacheStats>;

    /// Remove every entry.
    async fn clear(&self) -> SynthesisResult<()>;
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Filesystem cache directory; the in-memory backend is used when unset
    pub path: Option<PathBuf>,
    pub max_size_gb: f64,
    pub max_age_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: None,
            max_size_gb: 5.0,
            max_age_days: 30,
        }
    }
}

impl CacheConfig {
    pub fn max_size_bytes(&self) -> u64 {
        (self.max_size_gb * BYTES_PER_GB) as u64
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(u64::from(self.max_age_days) * SECS_PER_DAY)
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub(crate) fn summarize(records: &[UsageRecord], config_size_gb: f64, max_age_days: u32) -> CacheStats {
    let entry_count = records.len();
    let total_size: u64 = records.iter().map(|r| r.size).sum();
    let total_accesses: u64 = records.iter().map(|r| r.access_count).sum();
    let recent_cutoff = unix_now().saturating_sub(SECS_PER_DAY);

    let mut voices: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for record in records {
        *voices.entry(record.voice.as_str()).or_default() += 1;
    }
    let mut top_voices: Vec<VoiceCount> = voices
        .into_iter()
        .map(|(voice, count)| VoiceCount {
            voice: voice.to_string(),
            count,
        })
        .collect();
    top_voices.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.voice.cmp(&b.voice)));
    top_voices.truncate(5);

    let round1 = |v: f64| (v * 10.0).round() / 10.0;
    CacheStats {
        entry_count,
        total_size_mb: round1(total_size as f64 / 1024.0 / 1024.0),
        total_accesses,
        avg_accesses: if entry_count == 0 {
            0.0
        } else {
            round1(total_accesses as f64 / entry_count as f64)
        },
        recent_entries_24h: records
            .iter()
            .filter(|r| r.last_accessed > recent_cutoff)
            .count(),
        max_size_gb: config_size_gb,
        max_age_days,
        top_voices,
    }
}

// =============================================================================
// Audio Cache Facade
// =============================================================================

/// Keyed access to cached responses for one engine configuration
#[derive(Clone)]
pub struct AudioCache {
    backend: Arc<dyn CacheBackend>,
    model_id: String,
}

impl std::fmt::Debug for AudioCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCache")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

impl AudioCache {
    pub fn new(backend: Arc<dyn CacheBackend>, model_id: impl Into<String>) -> Self {
        Self {
            backend,
            model_id: model_id.into(),
        }
    }

    /// Open the backend selected by `config`, or `None` when caching is off.
    pub async fn from_config(
        config: &CacheConfig,
        model_id: impl Into<String>,
    ) -> SynthesisResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let backend: Arc<dyn CacheBackend> = match &config.path {
            Some(dir) => Arc::new(FilesystemCache::open(dir, config).await?),
            None => Arc::new(MemoryCacheBackend::new(config)),
        };
        Ok(Some(Self::new(backend, model_id)))
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn key(&self, text: &str, voice: &str, extension: &str) -> String {
        cache_key(text, voice, &format!("{}.{extension}", self.model_id))
    }

    pub async fn get(&self, text: &str, voice: &str, extension: &str) -> SynthesisResult<Option<Bytes>> {
        self.backend.get(&self.key(text, voice, extension)).await
    }

    pub async fn put(&self, text: &str, voice: &str, extension: &str, audio: Bytes) -> SynthesisResult<()> {
        let meta = CacheEntryMeta {
            text: text.to_string(),
            voice: voice.to_string(),
            model: self.model_id.clone(),
            extension: extension.to_string(),
        };
        self.backend
            .put(&self.key(text, voice, extension), meta, audio)
            .await
    }

    pub async fn stats(&self) -> SynthesisResult<CacheStats> {
        self.backend.stats().await
    }

    pub async fn clear(&self) -> SynthesisResult<()> {
        self.backend.clear().await
    }
}
