//! Neural codec seam.
//!
//! A [`CodecTransform`] turns fixed-length token windows into fixed-duration
//! waveform samples. Implementations are not assumed to be reentrant; the
//! worker pool is the only caller and bounds concurrent invocations.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::decoder::TokenWindow;

pub use http::{HttpCodec, HttpCodecConfig};

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Codec invocation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Codec service unreachable or timed out
    #[error("Codec transport error: {0}")]
    Transport(String),

    /// Codec answered with something other than one waveform per window
    #[error("Invalid codec response: {0}")]
    InvalidResponse(String),

    /// Codec rejected the codes
    #[error("Codec decode error: {0}")]
    Decode(String),

    /// The decode task panicked
    #[error("Codec worker panicked: {0}")]
    Panicked(String),
}

/// Batched window decoder
#[async_trait]
pub trait CodecTransform: Send + Sync {
    /// Decode every window into exactly one waveform of nominal window duration.
    async fn decode_batch(&self, windows: &[TokenWindow]) -> CodecResult<Vec<Vec<f32>>>;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;
}
