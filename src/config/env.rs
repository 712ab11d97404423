use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::EngineConfig;

/// Read and parse an environment variable, `None` when unset or empty.
pub(super) fn parse_var<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {e}")),
        Err(_) => Ok(None),
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Accepts the usual spellings of a boolean flag.
fn bool_var(name: &str) -> Result<Option<bool>, String> {
    match string_var(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(format!("Invalid value for {name}: expected a boolean, got {other}")),
        },
    }
}

/// Defaults overlaid with `TTS_*` environment variables
pub(super) fn load_from_env() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = EngineConfig::default();

    if let Some(url) = string_var("TTS_INFERENCE_URL") {
        config.inference.url = url;
    }
    if let Some(timeout) = parse_var("TTS_INFERENCE_TIMEOUT")? {
        config.inference.timeout_seconds = timeout;
    }
    if let Some(streaming) = bool_var("TTS_INFERENCE_STREAMING")? {
        config.inference.streaming = streaming;
    }
    if let Some(model) = string_var("TTS_INFERENCE_MODEL") {
        config.inference.model = Some(model);
    }
    if let Some(key) = string_var("TTS_INFERENCE_API_KEY") {
        config.inference.api_key = Some(key);
    }

    if let Some(max_tokens) = parse_var("TTS_MAX_TOKENS")? {
        config.generation.max_tokens = max_tokens;
    }
    if let Some(temperature) = parse_var("TTS_TEMPERATURE")? {
        config.generation.temperature = temperature;
    }
    if let Some(top_p) = parse_var("TTS_TOP_P")? {
        config.generation.top_p = top_p;
    }
    if let Some(voice) = string_var("TTS_DEFAULT_VOICE") {
        config.generation.default_voice = voice;
    }

    if let Some(url) = string_var("TTS_CODEC_URL") {
        config.codec.url = url;
    }
    if let Some(sample_rate) = parse_var("TTS_SAMPLE_RATE")? {
        config.codec.sample_rate = sample_rate;
    }

    if let Some(max_chars) = parse_var("TTS_MAX_CHUNK_CHARS")? {
        config.segmenter.max_chunk_chars = max_chars;
    }

    if let Some(enabled) = bool_var("TTS_CACHE_ENABLED")? {
        config.cache.enabled = enabled;
    }
    if let Some(path) = string_var("TTS_CACHE_PATH") {
        config.cache.path = Some(PathBuf::from(path));
    }
    if let Some(size) = parse_var("TTS_CACHE_MAX_SIZE_GB")? {
        config.cache.max_size_gb = size;
    }
    if let Some(days) = parse_var("TTS_CACHE_MAX_AGE_DAYS")? {
        config.cache.max_age_days = days;
    }

    Ok(config)
}
