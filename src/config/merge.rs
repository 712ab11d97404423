use std::path::PathBuf;

use super::EngineConfig;
use super::env::load_from_env;
use super::yaml::{TierYaml, YamlConfig};
use crate::core::hardware::TierParameters;

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

fn merge_tier(target: &mut TierParameters, tier: Option<TierYaml>) {
    if let Some(tier) = tier {
        set(&mut target.workers, tier.workers);
        set(&mut target.batch_size, tier.batch_size);
    }
}

/// Environment configuration with YAML values applied on top
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(inference) = yaml.inference {
        set(&mut config.inference.url, inference.url);
        set(&mut config.inference.timeout_seconds, inference.timeout_seconds);
        set(&mut config.inference.streaming, inference.streaming);
        if inference.model.is_some() {
            config.inference.model = inference.model;
        }
        if inference.api_key.is_some() {
            config.inference.api_key = inference.api_key;
        }
    }

    if let Some(generation) = yaml.generation {
        let target = &mut config.generation;
        set(&mut target.max_tokens, generation.max_tokens);
        set(&mut target.temperature, generation.temperature);
        set(&mut target.top_p, generation.top_p);
        set(&mut target.repetition_penalty, generation.repetition_penalty);
        set(&mut target.default_voice, generation.default_voice);
    }

    if let Some(codec) = yaml.codec {
        set(&mut config.codec.url, codec.url);
        set(&mut config.codec.timeout_seconds, codec.timeout_seconds);
        set(&mut config.codec.sample_rate, codec.sample_rate);
        set(&mut config.codec.samples_per_frame, codec.samples_per_frame);
    }

    if let Some(segmenter) = yaml.segmenter {
        set(&mut config.segmenter.max_chunk_chars, segmenter.max_chunk_chars);
        set(&mut config.segmenter.tokens_per_char, segmenter.tokens_per_char);
    }

    if let Some(window) = yaml.window {
        set(&mut config.window.stride, window.stride);
        if window.size.is_some() {
            config.window.size = window.size;
        }
    }

    if let Some(hardware) = yaml.hardware {
        let policy = &mut config.hardware;
        set(&mut policy.high_end_min_memory_gb, hardware.high_end_min_memory_gb);
        set(
            &mut policy.high_end_min_compute_capability,
            hardware.high_end_min_compute_capability,
        );
        merge_tier(&mut policy.high_end, hardware.high_end);
        merge_tier(&mut policy.standard, hardware.standard);
        merge_tier(&mut policy.cpu_only, hardware.cpu_only);
    }

    if let Some(stitch) = yaml.stitch {
        set(&mut config.stitch.chunk_fade_ms, stitch.chunk_fade_ms);
        set(&mut config.stitch.chunk_gap_ms, stitch.chunk_gap_ms);
        set(&mut config.stitch.forced_split_gap_ms, stitch.forced_split_gap_ms);
        set(&mut config.stitch.curve, stitch.curve);
    }

    if let Some(resilience) = yaml.resilience {
        let target = &mut config.resilience;
        set(&mut target.max_chunk_attempts, resilience.max_chunk_attempts);
        set(&mut target.max_window_retries, resilience.max_window_retries);
        set(&mut target.failed_chunk_silence_ms, resilience.failed_chunk_silence_ms);
        set(&mut target.generation_concurrency, resilience.generation_concurrency);
    }

    if let Some(cache) = yaml.cache {
        set(&mut config.cache.enabled, cache.enabled);
        if let Some(path) = cache.path {
            config.cache.path = Some(PathBuf::from(path));
        }
        set(&mut config.cache.max_size_gb, cache.max_size_gb);
        set(&mut config.cache.max_age_days, cache.max_age_days);
    }

    Ok(config)
}
