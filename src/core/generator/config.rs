//! Inference endpoint and sampling configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroize;

use crate::errors::{SynthesisError, SynthesisResult};

/// LLM inference endpoint settings
#[derive(Clone, PartialEq)]
pub struct InferenceConfig {
    /// Completions endpoint URL
    pub url: String,
    pub timeout: Duration,
    /// Request an SSE token stream instead of one JSON body
    pub streaming: bool,
    /// Model name sent with each request, if the server needs one
    pub model: Option<String>,
    /// Bearer token for the endpoint
    pub api_key: Option<String>,
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("streaming", &self.streaming)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Drop for InferenceConfig {
    fn drop(&mut self) {
        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

/// Per-request sampling overrides
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl GenerationParams {
    pub fn validate(&self) -> SynthesisResult<()> {
        if let Some(t) = self.temperature {
            if !(t > 0.0 && t <= 2.0) {
                return Err(SynthesisError::InvalidRequest(format!(
                    "temperature must be in (0, 2], got {t}"
                )));
            }
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return Err(SynthesisError::InvalidRequest(format!(
                    "top_p must be in (0, 1], got {p}"
                )));
            }
        }
        if self.max_tokens == Some(0) {
            return Err(SynthesisError::InvalidRequest(
                "max_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Deployment-level sampling defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Fixed for every request; never taken from [`GenerationParams`]
    pub repetition_penalty: f32,
    pub default_voice: String,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.6,
            top_p: 0.9,
            repetition_penalty: 1.1,
            default_voice: "tara".to_string(),
        }
    }
}

/// Sampling settings for one chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

impl GenerationDefaults {
    /// Merge request overrides, capping max tokens at the chunk budget.
    pub fn resolve(&self, params: &GenerationParams, token_budget: usize) -> SamplingSettings {
        let budget = u32::try_from(token_budget).unwrap_or(u32::MAX).max(1);
        SamplingSettings {
            max_tokens: params.max_tokens.unwrap_or(self.max_tokens).min(budget),
            temperature: params.temperature.unwrap_or(self.temperature),
            top_p: params.top_p.unwrap_or(self.top_p),
            repetition_penalty: self.repetition_penalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_caps_at_budget() {
        let defaults = GenerationDefaults::default();
        let settings = defaults.resolve(&GenerationParams::default(), 400);
        assert_eq!(settings.max_tokens, 400);
        assert_eq!(settings.temperature, 0.6);
        assert_eq!(settings.repetition_penalty, 1.1);

        let settings = defaults.resolve(
            &GenerationParams {
                max_tokens: Some(100),
                temperature: Some(1.0),
                top_p: Some(0.5),
            },
            400,
        );
        assert_eq!(settings.max_tokens, 100);
        assert_eq!(settings.temperature, 1.0);
        assert_eq!(settings.top_p, 0.5);
    }

    #[test]
    fn test_params_validation() {
        assert!(GenerationParams::default().validate().is_ok());
        let bad = |params: GenerationParams| params.validate().is_err();
        assert!(bad(GenerationParams {
            temperature: Some(0.0),
            ..Default::default()
        }));
        assert!(bad(GenerationParams {
            top_p: Some(1.5),
            ..Default::default()
        }));
        assert!(bad(GenerationParams {
            max_tokens: Some(0),
            ..Default::default()
        }));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = InferenceConfig {
            url: "http://localhost:8000/v1/completions".to_string(),
            timeout: Duration::from_secs(5),
            streaming: true,
            model: None,
            api_key: Some("sk-secret".to_string()),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
