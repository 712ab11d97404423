//! Windowed codec decoding.
//!
//! [`WindowedDecoder`] cuts a chunk's acoustic token stream into overlapping
//! [`TokenWindow`]s and hands them to the [`WorkerPool`](crate::core::pool::WorkerPool),
//! producing a lazy, ordered stream of [`AudioSegment`]s. Windows are decoded
//! independently; overlaps are reconciled by the stitcher.

pub mod window;

use futures::StreamExt;
use futures::stream::BoxStream;

use crate::core::emotion::MarkerAt;
use crate::core::pool::WorkerPool;
use crate::core::tokens::AcousticTokenStream;
use crate::errors::SynthesisResult;

pub use window::{TokenWindow, WindowConfig, WindowPlanner, plan_windows};

/// Waveform decoded from one window
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub chunk: usize,
    /// Index of the source window within the chunk
    pub window: usize,
    pub samples: Vec<f32>,
    /// Tail samples produced from zero padding
    pub padding_samples: usize,
    pub markers: Vec<MarkerAt>,
    /// Set when the window was replaced by silence, with the failure reason
    pub silenced: Option<String>,
}

impl AudioSegment {
    pub fn decoded(window: TokenWindow, samples: Vec<f32>, config: &WindowConfig) -> Self {
        Self {
            chunk: window.chunk,
            window: window.index,
            samples,
            padding_samples: config.padding_samples(window.padded_tokens),
            markers: window.markers,
            silenced: None,
        }
    }

    pub fn silence(window: TokenWindow, config: &WindowConfig, reason: String) -> Self {
        Self {
            samples: vec![0.0; config.segment_samples()],
            silenced: Some(reason),
            ..Self::decoded(window, Vec::new(), config)
        }
    }

    /// Samples after tail padding is removed
    pub fn trimmed(&self) -> &[f32] {
        let keep = self.samples.len().saturating_sub(self.padding_samples);
        &self.samples[..keep]
    }
}

/// Turns token streams into ordered audio segment streams
#[derive(Debug, Clone)]
pub struct WindowedDecoder {
    pool: WorkerPool,
    config: WindowConfig,
}

impl WindowedDecoder {
    pub fn new(pool: WorkerPool) -> Self {
        let config = pool.window_config();
        Self { pool, config }
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.pool.sample_rate()
    }

    /// Cut a token stream into windows. Stops at the first token error.
    pub fn windows(
        &self,
        chunk: usize,
        mut tokens: AcousticTokenStream,
    ) -> BoxStream<'static, SynthesisResult<TokenWindow>> {
        let config = self.config;
        Box::pin(async_stream::stream! {
            let mut planner = WindowPlanner::new(chunk, config);
            while let Some(token) = tokens.next().await {
                match token {
                    Ok(token) => {
                        if let Some(window) = planner.push(token) {
                            yield Ok(window);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            for window in planner.finish() {
                yield Ok(window);
            }
        })
    }

    /// Decode a chunk's token stream into ordered audio segments.
    pub fn decode(
        &self,
        chunk: usize,
        tokens: AcousticTokenStream,
    ) -> BoxStream<'static, SynthesisResult<AudioSegment>> {
        self.pool.run(self.windows(chunk, tokens))
    }
}
