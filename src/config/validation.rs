use tracing::warn;

use super::EngineConfig;
use crate::core::hardware::TierParameters;
use crate::utils::url_validation::{is_loopback, validate_endpoint_url};

fn validate_endpoint(name: &str, url: &str) -> Result<url::Url, String> {
    validate_endpoint_url(url).map_err(|e| format!("Invalid {name} URL '{url}': {e}"))
}

fn validate_tier(name: &str, tier: &TierParameters) -> Result<(), String> {
    if tier.workers == 0 || tier.batch_size == 0 {
        return Err(format!(
            "Hardware tier '{name}' needs at least one worker and a batch size of at least 1"
        ));
    }
    Ok(())
}

/// Validate a fully merged configuration.
pub(super) fn validate(config: &EngineConfig) -> Result<(), String> {
    let inference = validate_endpoint("inference", &config.inference.url)?;
    validate_endpoint("codec", &config.codec.url)?;

    if config.inference.api_key.is_some()
        && inference.scheme() == "http"
        && !is_loopback(&inference)
    {
        warn!(url = %inference, "Inference API key will be sent over plain HTTP");
    }
    if config.inference.timeout_seconds == 0 || config.codec.timeout_seconds == 0 {
        return Err("Endpoint timeouts must be at least 1 second".to_string());
    }

    let generation = &config.generation;
    if !(generation.temperature > 0.0 && generation.temperature <= 2.0) {
        return Err(format!(
            "Temperature must be in (0, 2], got {}",
            generation.temperature
        ));
    }
    if !(generation.top_p > 0.0 && generation.top_p <= 1.0) {
        return Err(format!("top_p must be in (0, 1], got {}", generation.top_p));
    }
    if generation.max_tokens == 0 {
        return Err("max_tokens must be positive".to_string());
    }
    if generation.default_voice.trim().is_empty() {
        return Err("default_voice must not be empty".to_string());
    }

    if config.codec.sample_rate == 0 || config.codec.samples_per_frame == 0 {
        return Err("Codec sample_rate and samples_per_frame must be positive".to_string());
    }

    let window = config.window_config();
    if !window.is_valid() {
        return Err(format!(
            "Window size {} must be a positive multiple of stride {}",
            window.size, window.stride
        ));
    }

    if config.segmenter.max_chunk_chars == 0 {
        return Err("max_chunk_chars must be positive".to_string());
    }

    validate_tier("high_end", &config.hardware.high_end)?;
    validate_tier("standard", &config.hardware.standard)?;
    validate_tier("cpu_only", &config.hardware.cpu_only)?;

    if config.resilience.max_chunk_attempts == 0 {
        return Err("max_chunk_attempts must be at least 1".to_string());
    }
    if config.resilience.generation_concurrency == 0 {
        return Err("generation_concurrency must be at least 1".to_string());
    }

    if config.cache.enabled && config.cache.max_size_gb <= 0.0 {
        return Err("Cache max_size_gb must be positive".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let mut config = EngineConfig::default();
        config.codec.url = "file:///tmp/codec".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.contains("codec"));
    }

    #[test]
    fn test_rejects_sampling_out_of_range() {
        let mut config = EngineConfig::default();
        config.generation.temperature = 0.0;
        assert!(validate(&config).unwrap_err().contains("Temperature"));

        let mut config = EngineConfig::default();
        config.generation.top_p = 1.5;
        assert!(validate(&config).unwrap_err().contains("top_p"));
    }

    #[test]
    fn test_rejects_misaligned_window() {
        let mut config = EngineConfig::default();
        config.window.size = Some(48);
        assert!(validate(&config).unwrap_err().contains("multiple of stride"));
    }

    #[test]
    fn test_rejects_empty_tier() {
        let mut config = EngineConfig::default();
        config.hardware.standard.workers = 0;
        assert!(validate(&config).unwrap_err().contains("standard"));
    }

    #[test]
    fn test_rejects_zero_chunk_chars() {
        let mut config = EngineConfig::default();
        config.segmenter.max_chunk_chars = 0;
        assert!(validate(&config).unwrap_err().contains("max_chunk_chars"));
    }
}
