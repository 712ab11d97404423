//! Synthesis error types
//!
//! Centralized error handling for the synthesis pipeline. Window-level and
//! chunk-level failures are normally absorbed as [`Degradation`] records;
//! only request-level failures escape as a [`SynthesisError`].

use std::fmt;
use thiserror::Error;

/// Result type for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Error type for the synthesis pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    // ─────────────────────────────────────────────────────────────────────────────
    // Component Errors
    // ─────────────────────────────────────────────────────────────────────────────

    /// Text could not be split on any delimiter below the length ceiling
    #[error("Segmentation forced a hard split in chunk {chunk}: {reason}")]
    SegmentationFailure { chunk: usize, reason: String },

    /// LLM inference endpoint unreachable, overloaded or timed out
    #[error("Inference endpoint unavailable: {0}")]
    InferenceUnavailable(String),

    /// LLM returned malformed or unexpected token data
    #[error("Token stream corrupt: {0}")]
    TokenStreamCorrupt(String),

    /// Codec failed to decode a window
    #[error("Codec decode failed for window {window}: {reason}")]
    CodecDecodeFailure { window: usize, reason: String },

    /// Hardware capability query failed
    #[error("Hardware detection failed: {0}")]
    HardwareDetectionFailure(String),

    // ─────────────────────────────────────────────────────────────────────────────
    // Request Errors
    // ─────────────────────────────────────────────────────────────────────────────

    /// Every chunk of the request failed
    #[error("{}", summarize_failures(.failures))]
    AllChunksFailed { failures: Vec<ChunkFailure> },

    /// Request rejected before any work started
    #[error("Invalid synthesis request: {0}")]
    InvalidRequest(String),

    /// Request cancelled at a chunk boundary
    #[error("Synthesis was cancelled")]
    Cancelled,

    /// Output encoding failed
    #[error("Audio encoding failed: {0}")]
    Encoding(String),

    /// Cache read or write failed
    #[error("Cache error: {0}")]
    Cache(String),
}

impl SynthesisError {
    /// Whether regenerating the whole chunk may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SynthesisError::InferenceUnavailable(_) | SynthesisError::TokenStreamCorrupt(_)
        )
    }

    /// Number of attempts this error class is allowed at chunk granularity
    ///
    /// Corrupt token streams are regenerated once; unavailable endpoints get
    /// the configured attempt budget.
    pub fn attempt_budget(&self, max_chunk_attempts: u32) -> u32 {
        match self {
            SynthesisError::TokenStreamCorrupt(_) => max_chunk_attempts.min(2),
            SynthesisError::InferenceUnavailable(_) => max_chunk_attempts,
            _ => 1,
        }
    }
}

/// A chunk that failed after exhausting its retries
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub error: Box<SynthesisError>,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {}: {}", self.chunk, self.error)
    }
}

fn summarize_failures(failures: &[ChunkFailure]) -> String {
    let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
    format!(
        "All {} chunk(s) failed: {}",
        failures.len(),
        details.join("; ")
    )
}

/// A non-fatal quality loss recorded during synthesis
#[derive(Debug, Clone, PartialEq)]
pub enum Degradation {
    /// Chunk text was hard-truncated at the length ceiling
    ForcedSplit { chunk: usize },
    /// A codec window was replaced with silence after exhausting retries
    WindowSilenced {
        chunk: usize,
        window: usize,
        reason: String,
    },
    /// A whole chunk was replaced with silence after exhausting retries
    ChunkSilenced { chunk: usize, reason: String },
}

impl Degradation {
    pub fn chunk(&self) -> usize {
        match self {
            Degradation::ForcedSplit { chunk }
            | Degradation::WindowSilenced { chunk, .. }
            | Degradation::ChunkSilenced { chunk, .. } => *chunk,
        }
    }

    /// Whether this degradation removed audio from the output
    pub fn is_audible(&self) -> bool {
        !matches!(self, Degradation::ForcedSplit { .. })
    }
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::ForcedSplit { chunk } => write!(f, "chunk {chunk}: forced split"),
            Degradation::WindowSilenced {
                chunk,
                window,
                reason,
            } => write!(f, "chunk {chunk} window {window}: silenced ({reason})"),
            Degradation::ChunkSilenced { chunk, reason } => {
                write!(f, "chunk {chunk}: silenced ({reason})")
            }
        }
    }
}
