//! Shared fakes for integration tests
//!
//! - `FakeLlm`: a scripted completions backend emitting audio token text
//! - `ToneCodec`: a codec answering each window with a constant tone
//! - Small window geometry so expected lengths are easy to compute

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tts_engine::core::codec::{CodecError, CodecResult, CodecTransform};
use tts_engine::core::generator::{CompletionRequest, TextStream, TokenSource};
use tts_engine::core::hardware::{HardwareProfile, HardwareTier};
use tts_engine::core::tokens::encode_audio_token;
use tts_engine::{
    EngineSettings, ResilienceConfig, SegmenterConfig, StitchConfig, SynthesisError,
    SynthesisResult, TokenWindow, TtsEngine, WindowConfig,
};

pub const SAMPLE_RATE: u32 = 1000;

/// W = 4, stride 2, 8 samples per frame: D = 16, O = 8
pub const WINDOW: WindowConfig = WindowConfig {
    size: 4,
    stride: 2,
    samples_per_frame: 8,
};

/// Three sentences that never fit two to a chunk at 20 characters.
pub const THREE_SENTENCES: &str = "The first sentence. The second sentence. The third sentence.";

/// Samples for a chunk of `tokens` audio tokens with no padding
pub fn chunk_samples(tokens: usize) -> usize {
    let n = WINDOW.window_count(tokens);
    n * WINDOW.segment_samples() - (n - 1) * WINDOW.overlap_samples()
}

pub fn profile(workers: usize, batch_size: usize) -> HardwareProfile {
    HardwareProfile {
        tier: HardwareTier::CpuOnly,
        worker_count: workers,
        batch_size,
        cpu_cores: 4,
        accelerator: None,
    }
}

/// Settings with seam fades and gaps disabled so chunk joins are plain concatenation
pub fn settings() -> EngineSettings {
    EngineSettings {
        segmenter: SegmenterConfig {
            max_chunk_chars: 20,
            ..Default::default()
        },
        window: WINDOW,
        stitch: StitchConfig {
            chunk_fade_ms: 0,
            chunk_gap_ms: 0,
            forced_split_gap_ms: 0,
            ..Default::default()
        },
        resilience: ResilienceConfig {
            max_chunk_attempts: 3,
            max_window_retries: 1,
            failed_chunk_silence_ms: 500,
            generation_concurrency: 2,
        },
        window_fade_samples: Some(2),
        ..Default::default()
    }
}

pub fn engine(llm: Arc<FakeLlm>, codec: Arc<ToneCodec>) -> TtsEngine {
    TtsEngine::new(llm, codec, profile(2, 2), settings())
}

// =============================================================================
// Fake LLM
// =============================================================================

#[derive(Debug, Clone)]
pub enum Failure {
    Unavailable,
    /// Answer with text holding no audio tokens
    Empty,
}

#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    failure: Failure,
    /// Remaining failures; `None` fails forever
    remaining: Option<usize>,
}

/// Scripted completions backend
///
/// Every request is answered with `tokens` audio tokens split into small
/// pieces, unless a failure rule matches the prompt.
pub struct FakeLlm {
    tokens: usize,
    rules: Mutex<Vec<Rule>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    delay: Duration,
}

impl FakeLlm {
    pub fn new(tokens: usize) -> Self {
        Self {
            tokens,
            rules: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail prompts containing `needle`, `times` times or forever.
    pub fn fail_on(self, needle: &str, failure: Failure, times: Option<usize>) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            failure,
            remaining: times,
        });
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_matching(&self, needle: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.prompt.contains(needle))
            .count()
    }

    fn failure_for(&self, prompt: &str) -> Option<Failure> {
        let mut rules = self.rules.lock();
        let rule = rules.iter_mut().find(|r| {
            prompt.contains(&r.needle) && r.remaining.is_none_or(|n| n > 0)
        })?;
        if let Some(n) = rule.remaining.as_mut() {
            *n -= 1;
        }
        Some(rule.failure.clone())
    }
}

#[async_trait]
impl TokenSource for FakeLlm {
    fn streaming(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> SynthesisResult<TextStream> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let failure = self.failure_for(&request.prompt);
        self.requests.lock().push(request);

        let pieces: Vec<String> = match failure {
            Some(Failure::Unavailable) => {
                return Err(SynthesisError::InferenceUnavailable(
                    "connection refused".to_string(),
                ));
            }
            Some(Failure::Empty) => vec!["<|audio|>".to_string()],
            None => {
                let text: String = (0..self.tokens)
                    .map(|k| encode_audio_token((k % 4096) as u32, k))
                    .collect();
                // Split mid-tag to exercise reassembly
                text.as_bytes()
                    .chunks(11)
                    .map(|c| String::from_utf8_lossy(c).into_owned())
                    .collect()
            }
        };
        Ok(Box::pin(futures::stream::iter(pieces.into_iter().map(Ok))))
    }
}

// =============================================================================
// Tone Codec
// =============================================================================

/// Answers each window with a constant of `0.1 * (chunk + 1)`
pub struct ToneCodec {
    /// (chunk, window) pairs that always fail
    broken: HashSet<(usize, usize)>,
    /// Per-window delay, larger for earlier windows
    reverse_delay: bool,
    /// Fixed per-call delay
    delay: Duration,
    /// Cancelled when the first call arrives
    cancel_on_first: Option<CancellationToken>,
    pub calls: AtomicUsize,
    pub per_chunk: Mutex<HashMap<usize, usize>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ToneCodec {
    pub fn new() -> Self {
        Self {
            broken: HashSet::new(),
            reverse_delay: false,
            delay: Duration::ZERO,
            cancel_on_first: None,
            calls: AtomicUsize::new(0),
            per_chunk: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn cancel_on_first_call(mut self, cancel: CancellationToken) -> Self {
        self.cancel_on_first = Some(cancel);
        self
    }

    pub fn windows_decoded(&self, chunk: usize) -> usize {
        self.per_chunk.lock().get(&chunk).copied().unwrap_or_default()
    }

    pub fn broken(mut self, chunk: usize, window: usize) -> Self {
        self.broken.insert((chunk, window));
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse_delay = true;
        self
    }

    pub fn tone(chunk: usize) -> f32 {
        0.1 * (chunk + 1) as f32
    }
}

#[async_trait]
impl CodecTransform for ToneCodec {
    async fn decode_batch(&self, windows: &[TokenWindow]) -> CodecResult<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(cancel) = &self.cancel_on_first {
                cancel.cancel();
            }
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if self.reverse_delay {
            let first = windows.first().map(|w| w.index).unwrap_or_default() as u64;
            tokio::time::sleep(Duration::from_millis(20u64.saturating_sub(first * 4))).await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        for window in windows {
            *self.per_chunk.lock().entry(window.chunk).or_default() += 1;
        }
        if windows
            .iter()
            .any(|w| self.broken.contains(&(w.chunk, w.index)))
        {
            return Err(CodecError::Decode("codec rejected window".to_string()));
        }
        Ok(windows
            .iter()
            .map(|w| vec![Self::tone(w.chunk); WINDOW.segment_samples()])
            .collect())
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

/// Longest run of exact zeros
pub fn longest_silence(samples: &[f32]) -> (usize, usize) {
    let (mut best_start, mut best_len) = (0, 0);
    let mut start = 0;
    let mut len = 0;
    for (i, s) in samples.iter().enumerate() {
        if *s == 0.0 {
            if len == 0 {
                start = i;
            }
            len += 1;
            if len > best_len {
                best_len = len;
                best_start = start;
            }
        } else {
            len = 0;
        }
    }
    (best_start, best_len)
}
