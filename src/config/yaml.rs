use serde::Deserialize;
use std::path::PathBuf;

use crate::core::stitch::FadeCurve;

/// Complete YAML configuration structure
///
/// Every field is optional so a file can override only part of the
/// configuration. Values present here win over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// inference:
///   url: "http://127.0.0.1:5006/v1/completions"
///   timeout_seconds: 120
///   streaming: true
///   model: "orpheus-3b"
///   api_key: "your-api-key"
///
/// generation:
///   max_tokens: 8192
///   temperature: 0.6
///   top_p: 0.9
///   repetition_penalty: 1.1
///   default_voice: "tara"
///
/// codec:
///   url: "http://127.0.0.1:5007/decode"
///   timeout_seconds: 30
///   sample_rate: 24000
///   samples_per_frame: 2048
///
/// segmenter:
///   max_chunk_chars: 300
///   tokens_per_char: 8
///
/// window:
///   stride: 7
///   size: 49
///
/// hardware:
///   high_end_min_memory_gb: 16
///   high_end_min_compute_capability: 8.0
///   high_end: { workers: 4, batch_size: 32 }
///   standard: { workers: 3, batch_size: 24 }
///   cpu_only: { workers: 2, batch_size: 16 }
///
/// stitch:
///   chunk_fade_ms: 10
///   chunk_gap_ms: 0
///   forced_split_gap_ms: 50
///   curve: "equal_power"
///
/// resilience:
///   max_chunk_attempts: 3
///   max_window_retries: 2
///   failed_chunk_silence_ms: 500
///   generation_concurrency: 2
///
/// cache:
///   enabled: true
///   path: "/var/cache/tts-engine"
///   max_size_gb: 5.0
///   max_age_days: 30
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub inference: Option<InferenceYaml>,
    pub generation: Option<GenerationYaml>,
    pub codec: Option<CodecYaml>,
    pub segmenter: Option<SegmenterYaml>,
    pub window: Option<WindowYaml>,
    pub hardware: Option<HardwareYaml>,
    pub stitch: Option<StitchYaml>,
    pub resilience: Option<ResilienceYaml>,
    pub cache: Option<CacheYaml>,
}

/// LLM inference endpoint from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InferenceYaml {
    pub url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub streaming: Option<bool>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Sampling defaults from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GenerationYaml {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub repetition_penalty: Option<f32>,
    pub default_voice: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CodecYaml {
    pub url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub sample_rate: Option<u32>,
    pub samples_per_frame: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SegmenterYaml {
    pub max_chunk_chars: Option<usize>,
    pub tokens_per_char: Option<usize>,
}

/// Window geometry from YAML; `size` defaults to `stride²`
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WindowYaml {
    pub stride: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TierYaml {
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Hardware classification policy from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HardwareYaml {
    pub high_end_min_memory_gb: Option<f64>,
    pub high_end_min_compute_capability: Option<f64>,
    pub high_end: Option<TierYaml>,
    pub standard: Option<TierYaml>,
    pub cpu_only: Option<TierYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StitchYaml {
    pub chunk_fade_ms: Option<u32>,
    pub chunk_gap_ms: Option<u32>,
    pub forced_split_gap_ms: Option<u32>,
    pub curve: Option<FadeCurve>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ResilienceYaml {
    pub max_chunk_attempts: Option<u32>,
    pub max_window_retries: Option<u32>,
    pub failed_chunk_silence_ms: Option<u32>,
    pub generation_concurrency: Option<usize>,
}

/// Audio cache configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub enabled: Option<bool>,
    pub path: Option<String>,
    pub max_size_gb: Option<f64>,
    pub max_age_days: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid YAML.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config {}: {e}", path.display()))?;

        Ok(config)
    }
}
