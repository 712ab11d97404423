//! Configuration module for the TTS engine
//!
//! Configuration comes from defaults, environment variables (a `.env` file is
//! loaded by the binary at startup) and an optional YAML file.
//! Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides on top of the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use tts_engine::config::EngineConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = EngineConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = EngineConfig::from_file(&config_path)?;
//!
//! println!("LLM endpoint: {}", config.inference.url);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::cache::CacheConfig;
use crate::core::decoder::WindowConfig;
use crate::core::generator::GenerationDefaults;
use crate::core::hardware::HardwarePolicy;
use crate::core::pipeline::{EngineSettings, ResilienceConfig};
use crate::core::segmenter::SegmenterConfig;
use crate::core::stitch::StitchConfig;

/// LLM inference endpoint
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceSection {
    pub url: String,
    pub timeout_seconds: u64,
    /// Request SSE streaming rather than a single batched body
    pub streaming: bool,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl std::fmt::Debug for InferenceSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceSection")
            .field("url", &self.url)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("streaming", &self.streaming)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for InferenceSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5006/v1/completions".to_string(),
            timeout_seconds: 120,
            streaming: true,
            model: None,
            api_key: None,
        }
    }
}

/// Neural codec endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecSection {
    pub url: String,
    pub timeout_seconds: u64,
    pub sample_rate: u32,
    pub samples_per_frame: usize,
}

impl Default for CodecSection {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5007/decode".to_string(),
            timeout_seconds: 30,
            sample_rate: 24000,
            samples_per_frame: 2048,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmenterSection {
    pub max_chunk_chars: usize,
    pub tokens_per_char: usize,
}

impl Default for SegmenterSection {
    fn default() -> Self {
        let defaults = SegmenterConfig::default();
        Self {
            max_chunk_chars: defaults.max_chunk_chars,
            tokens_per_char: defaults.tokens_per_char,
        }
    }
}

/// Window geometry; `size` is `stride²` when unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSection {
    pub stride: usize,
    pub size: Option<usize>,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            stride: 7,
            size: None,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineConfig {
    pub inference: InferenceSection,
    pub generation: GenerationDefaults,
    pub codec: CodecSection,
    pub segmenter: SegmenterSection,
    pub window: WindowSection,
    pub hardware: HardwarePolicy,
    pub stitch: StitchConfig,
    pub resilience: ResilienceConfig,
    pub cache: CacheConfig,
}

/// Zeroize the inference API key when the configuration is dropped.
impl Drop for EngineConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.inference.api_key {
            key.zeroize();
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables over defaults
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or validation fails.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise from the environment.
    pub fn load(path: Option<&PathBuf>) -> Result<Self, Box<dyn std::error::Error>> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            size: self
                .window
                .size
                .unwrap_or(self.window.stride * self.window.stride),
            stride: self.window.stride,
            samples_per_frame: self.codec.samples_per_frame,
        }
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            max_chunk_chars: self.segmenter.max_chunk_chars,
            tokens_per_char: self.segmenter.tokens_per_char,
            max_tokens: self.generation.max_tokens as usize,
        }
    }

    /// Settings consumed by [`crate::core::pipeline::TtsEngine`]
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            generation: self.generation.clone(),
            segmenter: self.segmenter_config(),
            window: self.window_config(),
            stitch: self.stitch,
            resilience: self.resilience.clone(),
            window_fade_samples: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stitch::FadeCurve;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for name in [
                "TTS_INFERENCE_URL",
                "TTS_INFERENCE_TIMEOUT",
                "TTS_INFERENCE_STREAMING",
                "TTS_INFERENCE_MODEL",
                "TTS_INFERENCE_API_KEY",
                "TTS_MAX_TOKENS",
                "TTS_TEMPERATURE",
                "TTS_TOP_P",
                "TTS_DEFAULT_VOICE",
                "TTS_CODEC_URL",
                "TTS_SAMPLE_RATE",
                "TTS_MAX_CHUNK_CHARS",
                "TTS_CACHE_ENABLED",
                "TTS_CACHE_PATH",
                "TTS_CACHE_MAX_SIZE_GB",
                "TTS_CACHE_MAX_AGE_DAYS",
            ] {
                env::remove_var(name);
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.inference.timeout_seconds, 120);
        assert!(config.inference.streaming);
        assert_eq!(config.generation.default_voice, "tara");
        assert_eq!(config.codec.sample_rate, 24000);
        assert_eq!(config.window_config(), WindowConfig::default());
        assert_eq!(config.segmenter_config(), SegmenterConfig::default());
        assert_eq!(config.resilience.generation_concurrency, 2);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = EngineConfig::default();
        config.inference.api_key = Some("super-secret".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_window_size_defaults_to_stride_squared() {
        let mut config = EngineConfig::default();
        config.window.stride = 5;
        assert_eq!(config.window_config().size, 25);
        config.window.size = Some(35);
        assert_eq!(config.window_config().size, 35);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TTS_INFERENCE_URL", "http://llm.internal:8000/v1/completions");
            env::set_var("TTS_INFERENCE_STREAMING", "false");
            env::set_var("TTS_INFERENCE_API_KEY", "env-key");
            env::set_var("TTS_TEMPERATURE", "0.3");
            env::set_var("TTS_DEFAULT_VOICE", "leah");
            env::set_var("TTS_CACHE_ENABLED", "true");
            env::set_var("TTS_CACHE_PATH", "/tmp/env-cache");
        }

        let config = EngineConfig::from_env().unwrap();

        assert_eq!(config.inference.url, "http://llm.internal:8000/v1/completions");
        assert!(!config.inference.streaming);
        assert_eq!(config.inference.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.generation.temperature, 0.3);
        assert_eq!(config.generation.default_voice, "leah");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/env-cache")));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_number() {
        cleanup_env_vars();
        unsafe {
            env::set_var("TTS_SAMPLE_RATE", "fast");
        }

        let result = EngineConfig::from_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("TTS_SAMPLE_RATE"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
inference:
  url: "http://yaml-llm:5006/v1/completions"
generation:
  default_voice: "zac"
stitch:
  curve: "equal_power"
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("TTS_INFERENCE_URL", "http://env-llm:5006/v1/completions");
            env::set_var("TTS_DEFAULT_VOICE", "leah");
            env::set_var("TTS_TOP_P", "0.8");
        }

        let config = EngineConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.inference.url, "http://yaml-llm:5006/v1/completions");
        assert_eq!(config.generation.default_voice, "zac");
        // ENV value survives where YAML is silent
        assert_eq!(config.generation.top_p, 0.8);
        assert_eq!(config.stitch.curve, FadeCurve::EqualPower);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let config_path = PathBuf::from("/nonexistent/config.yaml");
        let result = EngineConfig::from_file(&config_path);

        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_window() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "window:\n  stride: 7\n  size: 50\n").unwrap();

        let result = EngineConfig::from_file(&config_path);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("multiple of stride"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_engine_settings_follow_config() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        let yaml_content = r#"
codec:
  samples_per_frame: 1024
segmenter:
  max_chunk_chars: 120
resilience:
  max_window_retries: 5
"#;
        fs::write(&config_path, yaml_content).unwrap();

        let settings = EngineConfig::from_file(&config_path).unwrap().engine_settings();
        assert_eq!(settings.window.samples_per_frame, 1024);
        assert_eq!(settings.segmenter.max_chunk_chars, 120);
        assert_eq!(settings.resilience.max_window_retries, 5);

        cleanup_env_vars();
    }
}
