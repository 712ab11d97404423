//! HTTP codec client.
//!
//! Posts a batch of code windows as JSON and expects one base64-encoded
//! 16-bit little-endian PCM buffer per window in return.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{CodecError, CodecResult, CodecTransform};
use crate::core::decoder::TokenWindow;

/// Connection settings for [`HttpCodec`]
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCodecConfig {
    pub url: String,
    pub timeout: Duration,
    pub sample_rate: u32,
}

#[derive(Debug, Serialize)]
struct DecodeRequest<'a> {
    codes: Vec<&'a [u32]>,
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    audio: Vec<String>,
}

/// Codec reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpCodec {
    config: HttpCodecConfig,
    client: reqwest::Client,
}

impl HttpCodec {
    pub fn new(config: HttpCodecConfig) -> CodecResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CodecError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl CodecTransform for HttpCodec {
    async fn decode_batch(&self, windows: &[TokenWindow]) -> CodecResult<Vec<Vec<f32>>> {
        let request = DecodeRequest {
            codes: windows.iter().map(|w| w.codes.as_slice()).collect(),
            sample_rate: self.config.sample_rate,
        };

        debug!(windows = windows.len(), url = %self.config.url, "Codec decode request");

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CodecError::Transport(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                CodecError::Transport(format!("Codec error {status}: {body}"))
            } else {
                CodecError::Decode(format!("Codec error {status}: {body}"))
            });
        }

        let body: DecodeResponse = response
            .json()
            .await
            .map_err(|e| CodecError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        if body.audio.len() != windows.len() {
            return Err(CodecError::InvalidResponse(format!(
                "expected {} waveforms, got {}",
                windows.len(),
                body.audio.len()
            )));
        }

        body.audio.iter().map(|b64| decode_pcm16(b64)).collect()
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

fn decode_pcm16(b64: &str) -> CodecResult<Vec<f32>> {
    let bytes = BASE64
        .decode(b64)
        .map_err(|e| CodecError::InvalidResponse(format!("Invalid base64 audio: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(CodecError::InvalidResponse(
            "PCM payload has an odd byte count".to_string(),
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pcm16() {
        let pcm: Vec<u8> = [0i16, 16384, -32768]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let samples = decode_pcm16(&BASE64.encode(pcm)).unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_decode_pcm16_rejects_bad_payloads() {
        assert!(decode_pcm16("not base64!").is_err());
        assert!(decode_pcm16(&BASE64.encode([1u8, 2, 3])).is_err());
    }
}
