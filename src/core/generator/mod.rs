//! Acoustic token generation.
//!
//! [`TokenStreamGenerator`] drives an LLM [`TokenSource`] for one text chunk
//! and parses its output into a lazy [`AcousticTokenStream`]. Streaming and
//! single-shot sources look the same to the consumer. Any failure ends the
//! stream with an error; a chunk is never partially recovered.
//!
//! Open completions are capped by a semaphore shared across clones of the
//! generator. A permit is held from submission until the source's output is
//! exhausted or fails, so downstream decoding never holds it.

pub mod client;
pub mod config;
pub mod messages;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::core::segmenter::TextChunk;
use crate::core::tokens::{AcousticTokenStream, TokenParser};
use crate::errors::{SynthesisError, SynthesisResult};

pub use client::LlmClient;
pub use config::{GenerationDefaults, GenerationParams, InferenceConfig, SamplingSettings};
pub use messages::{CompletionRequest, format_prompt};

/// Raw generated text pieces
pub type TextStream = BoxStream<'static, SynthesisResult<String>>;

/// Completions backend
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Whether requests should ask for a streamed response
    fn streaming(&self) -> bool;

    /// Model name to send with requests
    fn model(&self) -> Option<String> {
        None
    }

    /// Submit a completion and return its text pieces in order.
    async fn complete(&self, request: CompletionRequest) -> SynthesisResult<TextStream>;
}

/// Produces acoustic token streams for text chunks
#[derive(Clone)]
pub struct TokenStreamGenerator {
    source: Arc<dyn TokenSource>,
    defaults: GenerationDefaults,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl std::fmt::Debug for TokenStreamGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStreamGenerator")
            .field("defaults", &self.defaults)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl TokenStreamGenerator {
    pub fn new(source: Arc<dyn TokenSource>, defaults: GenerationDefaults) -> Self {
        Self {
            source,
            defaults,
            permits: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            concurrency: Semaphore::MAX_PERMITS,
        }
    }

    /// Cap the number of completions open at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self.permits = Arc::new(Semaphore::new(self.concurrency));
        self
    }

    /// Completions currently allowed to start
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn defaults(&self) -> &GenerationDefaults {
        &self.defaults
    }

    /// Build the completion request for a chunk.
    pub fn request_for(&self, chunk: &TextChunk, voice: &str, params: &GenerationParams) -> CompletionRequest {
        let settings = self.defaults.resolve(params, chunk.token_budget);
        CompletionRequest::new(
            voice,
            &chunk.text,
            &settings,
            self.source.model(),
            self.source.streaming(),
        )
    }

    /// Generate the acoustic tokens for one chunk.
    ///
    /// Nothing is sent until the stream is first polled. The stream ends with
    /// `TokenStreamCorrupt` if the output is malformed or holds no audio.
    pub fn generate(&self, chunk: &TextChunk, voice: &str, params: &GenerationParams) -> AcousticTokenStream {
        let request = self.request_for(chunk, voice, params);
        let source = Arc::clone(&self.source);
        let permits = Arc::clone(&self.permits);
        let index = chunk.index;

        Box::pin(async_stream::stream! {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    yield Err(SynthesisError::InferenceUnavailable(format!("generation closed: {e}")));
                    return;
                }
            };

            let mut pieces = match source.complete(request).await {
                Ok(pieces) => pieces,
                Err(e) => {
                    drop(permit);
                    yield Err(e);
                    return;
                }
            };

            let mut parser = TokenParser::new();
            while let Some(piece) = pieces.next().await {
                let tokens = match piece.and_then(|text| parser.push(&text)) {
                    Ok(tokens) => tokens,
                    Err(e) => {
                        drop(pieces);
                        drop(permit);
                        yield Err(e);
                        return;
                    }
                };
                for token in tokens {
                    yield Ok(token);
                }
            }

            drop(pieces);
            drop(permit);
            match parser.finish() {
                Ok(count) => tracing::debug!(chunk = index, audio_tokens = count, "Generation complete"),
                Err(e) => yield Err(e),
            }
        })
    }
}
