//! Synthesis orchestration.
//!
//! [`TtsEngine::synthesize`] segments the text, then runs every chunk through
//! generation, windowed decoding and stitching. Chunks run concurrently up to
//! the hardware profile's worker count while the number of open generation
//! calls is capped separately. Results are always assembled in chunk order.
//!
//! A failing chunk is regenerated from scratch within its retry budget. After
//! that it becomes a fixed stretch of silence and a [`Degradation`] is
//! recorded. The request fails only when every chunk fails, or when it is
//! cancelled between chunks.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::core::audio::{self, ResponseFormat};
use crate::core::cache::{AudioCache, KeyHasher, XxHasher};
use crate::core::codec::{CodecTransform, HttpCodec, HttpCodecConfig};
use crate::core::decoder::{AudioSegment, WindowConfig, WindowedDecoder};
use crate::core::generator::{
    GenerationDefaults, GenerationParams, InferenceConfig, LlmClient, TokenSource,
    TokenStreamGenerator,
};
use crate::core::hardware::HardwareProfile;
use crate::core::pool::WorkerPool;
use crate::core::segmenter::{SegmenterConfig, TextChunk, TextSegmenter};
use crate::core::stitch::{ChunkAudio, StitchConfig, Stitcher};
use crate::errors::{ChunkFailure, Degradation, SynthesisError, SynthesisResult};

// =============================================================================
// Request / Response Types
// =============================================================================

/// One synthesis call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    /// Voice identifier; the deployment default when unset
    pub voice: Option<String>,
    #[serde(default)]
    pub format: ResponseFormat,
    #[serde(default)]
    pub params: GenerationParams,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }
}

/// Stitched samples for a request
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub degradations: Vec<Degradation>,
}

impl Waveform {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// No audio was lost or replaced
    pub fn is_clean(&self) -> bool {
        !self.degradations.iter().any(Degradation::is_audible)
    }
}

/// Encoded response for a request
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub request_id: Uuid,
    pub audio: Bytes,
    pub format: ResponseFormat,
    pub sample_rate: u32,
    pub degradations: Vec<Degradation>,
    /// Served from the audio cache
    pub cached: bool,
}

// =============================================================================
// Engine Settings
// =============================================================================

/// Retry and degradation policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Attempts per chunk for unavailable inference
    pub max_chunk_attempts: u32,
    /// Redispatches per codec window before it is silenced
    pub max_window_retries: u32,
    /// Silence substituted for a chunk that exhausted its attempts
    pub failed_chunk_silence_ms: u32,
    /// Concurrent generation calls to the inference endpoint
    pub generation_concurrency: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_chunk_attempts: 3,
            max_window_retries: 2,
            failed_chunk_silence_ms: 500,
            generation_concurrency: 2,
        }
    }
}

/// Everything the engine needs besides its collaborators
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub generation: GenerationDefaults,
    pub segmenter: SegmenterConfig,
    pub window: WindowConfig,
    pub stitch: StitchConfig,
    pub resilience: ResilienceConfig,
    /// Crossfade between windows; one codec frame when unset
    pub window_fade_samples: Option<usize>,
}

impl EngineSettings {
    /// Hash of every setting that changes generated audio
    pub fn model_id(&self, model: Option<&str>, sample_rate: u32) -> String {
        let g = &self.generation;
        let w = &self.window;
        let s = &self.stitch;
        let mut key = String::new();
        key.push_str(model.unwrap_or("default"));
        key.push_str(&format!(
            "|{}|{:.3}|{:.3}|{:.3}",
            g.max_tokens, g.temperature, g.top_p, g.repetition_penalty
        ));
        key.push_str(&format!("|{}|{}|{}|{sample_rate}", w.size, w.stride, w.samples_per_frame));
        key.push_str(&format!(
            "|{}|{}|{}|{:?}|{:?}",
            s.chunk_fade_ms, s.chunk_gap_ms, s.forced_split_gap_ms, s.curve, self.window_fade_samples
        ));
        key.push_str(&format!("|{}", self.segmenter.max_chunk_chars));
        XxHasher::new("tts-engine").hash(&key)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Per-chunk result after retries and degradation
struct ChunkOutcome {
    audio: ChunkAudio,
    degradations: Vec<Degradation>,
    failure: Option<ChunkFailure>,
}

/// Long-form synthesis pipeline
#[derive(Debug, Clone)]
pub struct TtsEngine {
    segmenter: TextSegmenter,
    generator: TokenStreamGenerator,
    decoder: WindowedDecoder,
    stitcher: Stitcher,
    chunk_concurrency: usize,
    window_fade_samples: usize,
    sample_rate: u32,
    resilience: ResilienceConfig,
    profile: HardwareProfile,
    cache: Option<AudioCache>,
}

impl TtsEngine {
    pub fn new(
        source: Arc<dyn TokenSource>,
        codec: Arc<dyn CodecTransform>,
        profile: HardwareProfile,
        settings: EngineSettings,
    ) -> Self {
        let sample_rate = codec.sample_rate();
        let pool = WorkerPool::new(
            codec,
            &profile,
            settings.window,
            settings.resilience.max_window_retries,
        );
        let stitcher = Stitcher::new(settings.window, sample_rate, settings.stitch);

        Self {
            segmenter: TextSegmenter::new(settings.segmenter),
            generator: TokenStreamGenerator::new(source, settings.generation)
                .with_concurrency(settings.resilience.generation_concurrency),
            decoder: WindowedDecoder::new(pool),
            window_fade_samples: settings
                .window_fade_samples
                .unwrap_or_else(|| stitcher.default_fade_samples()),
            stitcher,
            chunk_concurrency: profile.worker_count.max(1),
            sample_rate,
            resilience: settings.resilience,
            profile,
            cache: None,
        }
    }

    /// Build an engine talking to HTTP inference and codec services.
    pub async fn from_config(
        config: &crate::config::EngineConfig,
        profile: HardwareProfile,
    ) -> SynthesisResult<Self> {
        let settings = config.engine_settings();
        let model_id = settings.model_id(config.inference.model.as_deref(), config.codec.sample_rate);

        let source = LlmClient::new(InferenceConfig {
            url: config.inference.url.clone(),
            timeout: Duration::from_secs(config.inference.timeout_seconds),
            streaming: config.inference.streaming,
            model: config.inference.model.clone(),
            api_key: config.inference.api_key.clone(),
        })?;
        let codec = HttpCodec::new(HttpCodecConfig {
            url: config.codec.url.clone(),
            timeout: Duration::from_secs(config.codec.timeout_seconds),
            sample_rate: config.codec.sample_rate,
        })
        .map_err(|e| SynthesisError::CodecDecodeFailure {
            window: 0,
            reason: e.to_string(),
        })?;

        let engine = Self::new(Arc::new(source), Arc::new(codec), profile, settings);
        Ok(match AudioCache::from_config(&config.cache, model_id).await? {
            Some(cache) => engine.with_cache(cache),
            None => engine,
        })
    }

    pub fn with_cache(mut self, cache: AudioCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&AudioCache> {
        self.cache.as_ref()
    }

    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resolve_voice<'a>(&'a self, request: &'a SynthesisRequest) -> &'a str {
        request
            .voice
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.generator.defaults().default_voice)
    }

    fn validate(&self, request: &SynthesisRequest) -> SynthesisResult<()> {
        if request.text.trim().is_empty() {
            return Err(SynthesisError::InvalidRequest(
                "input text is empty".to_string(),
            ));
        }
        request.params.validate()
    }

    /// Synthesize and encode a request.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> SynthesisResult<SynthesisOutput> {
        self.synthesize_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Synthesize and encode a request, stopping at the next chunk boundary
    /// once `cancel` fires.
    pub async fn synthesize_with_cancel(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> SynthesisResult<SynthesisOutput> {
        self.validate(request)?;
        let request_id = Uuid::new_v4();
        let voice = self.resolve_voice(request);
        let extension = request.format.as_str();

        if let Some(cache) = &self.cache {
            match cache.get(&request.text, voice, extension).await {
                Ok(Some(audio)) => {
                    info!(%request_id, voice, "Serving synthesis from cache");
                    return Ok(SynthesisOutput {
                        request_id,
                        audio,
                        format: request.format,
                        sample_rate: self.sample_rate,
                        degradations: Vec::new(),
                        cached: true,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(%request_id, error = %e, "Cache lookup failed"),
            }
        }

        let waveform = self.run(request, request_id, cancel).await?;
        let audio = Bytes::from(audio::encode(&waveform.samples, waveform.sample_rate, request.format)?);

        if let Some(cache) = &self.cache {
            if waveform.is_clean() {
                if let Err(e) = cache.put(&request.text, voice, extension, audio.clone()).await {
                    warn!(%request_id, error = %e, "Failed to store synthesis in cache");
                }
            }
        }

        Ok(SynthesisOutput {
            request_id,
            audio,
            format: request.format,
            sample_rate: waveform.sample_rate,
            degradations: waveform.degradations,
            cached: false,
        })
    }

    /// Synthesize a request into raw samples, bypassing the cache.
    pub async fn synthesize_waveform(
        &self,
        request: &SynthesisRequest,
        cancel: &CancellationToken,
    ) -> SynthesisResult<Waveform> {
        self.validate(request)?;
        self.run(request, Uuid::new_v4(), cancel).await
    }

    async fn run(
        &self,
        request: &SynthesisRequest,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> SynthesisResult<Waveform> {
        let voice = self.resolve_voice(request);
        let chunks = self.segmenter.segment(&request.text);
        if chunks.is_empty() {
            return Err(SynthesisError::InvalidRequest(
                "input text has no content".to_string(),
            ));
        }

        let span = info_span!("synthesis", %request_id, voice, chunks = chunks.len());
        async move {
            info!(workers = self.profile.worker_count, "Synthesis started");

            let outcomes: Vec<SynthesisResult<ChunkOutcome>> = stream::iter(chunks.iter())
                .map(|chunk| self.run_chunk(chunk, voice, &request.params, cancel))
                .buffered(self.chunk_concurrency)
                .collect()
                .await;

            let mut audio = Vec::with_capacity(outcomes.len());
            let mut degradations = Vec::new();
            let mut failures = Vec::new();
            for outcome in outcomes {
                let outcome = outcome?;
                audio.push(outcome.audio);
                degradations.extend(outcome.degradations);
                failures.extend(outcome.failure);
            }

            if failures.len() == chunks.len() {
                let err = SynthesisError::AllChunksFailed { failures };
                error!(error = %err, "Synthesis failed");
                return Err(err);
            }

            let samples = self.stitcher.join_chunks(audio);
            let waveform = Waveform {
                samples,
                sample_rate: self.sample_rate,
                degradations,
            };
            info!(
                duration_ms = waveform.duration().as_millis() as u64,
                degradations = waveform.degradations.len(),
                "Synthesis complete"
            );
            Ok(waveform)
        }
        .instrument(span)
        .await
    }

    /// Run one chunk to its final outcome. Only cancellation is an error.
    async fn run_chunk(
        &self,
        chunk: &TextChunk,
        voice: &str,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> SynthesisResult<ChunkOutcome> {
        if cancel.is_cancelled() {
            debug!(chunk = chunk.index, "Cancelled before chunk start");
            return Err(SynthesisError::Cancelled);
        }

        let mut degradations = Vec::new();
        if chunk.forced_split {
            let reason = SynthesisError::SegmentationFailure {
                chunk: chunk.index,
                reason: "no delimiter below the length ceiling".to_string(),
            };
            warn!(chunk = chunk.index, error = %reason, "Forced split");
            degradations.push(Degradation::ForcedSplit { chunk: chunk.index });
        }

        let mut attempt = 0u32;
        let error = loop {
            attempt += 1;
            match self.attempt_chunk(chunk, voice, params).await {
                Ok(segments) => {
                    for segment in &segments {
                        if let Some(reason) = &segment.silenced {
                            degradations.push(Degradation::WindowSilenced {
                                chunk: chunk.index,
                                window: segment.window,
                                reason: reason.clone(),
                            });
                        }
                    }
                    let samples = self.stitcher.stitch(&segments, self.window_fade_samples);
                    debug!(chunk = chunk.index, windows = segments.len(), samples = samples.len(), "Chunk decoded");
                    return Ok(ChunkOutcome {
                        audio: ChunkAudio {
                            index: chunk.index,
                            samples,
                            forced_split: chunk.forced_split,
                        },
                        degradations,
                        failure: None,
                    });
                }
                Err(e) if e.is_retryable() && attempt < e.attempt_budget(self.resilience.max_chunk_attempts) => {
                    warn!(chunk = chunk.index, attempt, error = %e, "Chunk failed, regenerating");
                }
                Err(e) => break e,
            }
        };

        warn!(chunk = chunk.index, attempts = attempt, error = %error, "Chunk failed, substituting silence");
        degradations.push(Degradation::ChunkSilenced {
            chunk: chunk.index,
            reason: error.to_string(),
        });
        let silence = self
            .stitcher
            .ms_to_samples(self.resilience.failed_chunk_silence_ms);
        Ok(ChunkOutcome {
            audio: ChunkAudio {
                index: chunk.index,
                samples: vec![0.0; silence],
                forced_split: chunk.forced_split,
            },
            degradations,
            failure: Some(ChunkFailure {
                chunk: chunk.index,
                error: Box::new(error),
            }),
        })
    }

    /// Generate and decode a chunk once, collecting every segment.
    async fn attempt_chunk(
        &self,
        chunk: &TextChunk,
        voice: &str,
        params: &GenerationParams,
    ) -> SynthesisResult<Vec<AudioSegment>> {
        let tokens = self.generator.generate(chunk, voice, params);
        let mut segments = self.decoder.decode(chunk.index, tokens);

        let mut out = Vec::new();
        while let Some(segment) = segments.next().await {
            out.push(segment?);
        }
        Ok(out)
    }
}
