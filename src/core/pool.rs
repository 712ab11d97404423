//! Codec worker pool.
//!
//! Windows are batched with `ready_chunks(batch_size)` and each batch is
//! decoded in its own task while holding one of `worker_count` permits. The
//! permit semaphore is shared by every run on the same pool, so the codec
//! never sees more than `worker_count` concurrent invocations no matter how
//! many chunks are in flight.
//!
//! Completed windows pass through a reorder buffer keyed by window index, so
//! output order always matches input order. A failed batch is redispatched
//! window by window; once a window exhausts its retries it is replaced by
//! silence of the nominal window duration.

use futures::stream::{BoxStream, Stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::core::codec::{CodecError, CodecResult, CodecTransform};
use crate::core::decoder::{AudioSegment, TokenWindow, WindowConfig};
use crate::core::hardware::HardwareProfile;
use crate::errors::{SynthesisError, SynthesisResult};

struct BatchOutcome {
    windows: Vec<TokenWindow>,
    attempt: u32,
    result: CodecResult<Vec<Vec<f32>>>,
}

/// Bounded set of codec workers sized by a [`HardwareProfile`]
#[derive(Clone)]
pub struct WorkerPool {
    codec: Arc<dyn CodecTransform>,
    permits: Arc<Semaphore>,
    worker_count: usize,
    batch_size: usize,
    max_window_retries: u32,
    window: WindowConfig,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("batch_size", &self.batch_size)
            .field("max_window_retries", &self.max_window_retries)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    pub fn new(
        codec: Arc<dyn CodecTransform>,
        profile: &HardwareProfile,
        window: WindowConfig,
        max_window_retries: u32,
    ) -> Self {
        let worker_count = profile.worker_count.max(1);
        Self {
            codec,
            permits: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            batch_size: profile.batch_size.max(1),
            max_window_retries,
            window,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn window_config(&self) -> WindowConfig {
        self.window
    }

    pub fn sample_rate(&self) -> u32 {
        self.codec.sample_rate()
    }

    /// Decode a window stream, yielding segments in window order.
    ///
    /// The input is pulled only while fewer than `2 * worker_count` batches
    /// are in flight. An input error stops dispatch; windows already
    /// submitted still run to their outcome before the error is yielded.
    pub fn run<S>(&self, windows: S) -> BoxStream<'static, SynthesisResult<AudioSegment>>
    where
        S: Stream<Item = SynthesisResult<TokenWindow>> + Send + 'static,
    {
        let pool = self.clone();
        let max_in_flight = self.worker_count * 2;

        Box::pin(async_stream::stream! {
            let mut input = windows.ready_chunks(pool.batch_size).boxed();
            let mut in_flight: JoinSet<BatchOutcome> = JoinSet::new();
            let mut reorder: BTreeMap<usize, AudioSegment> = BTreeMap::new();
            let mut next = 0usize;
            let mut input_done = false;
            let mut failure: Option<SynthesisError> = None;

            loop {
                while let Some(segment) = reorder.remove(&next) {
                    next += 1;
                    yield Ok(segment);
                }
                if input_done && in_flight.is_empty() {
                    break;
                }

                tokio::select! {
                    batch = input.next(), if !input_done && in_flight.len() < max_in_flight => {
                        match batch {
                            None => input_done = true,
                            Some(items) => {
                                let mut ready = Vec::with_capacity(items.len());
                                for item in items {
                                    match item {
                                        Ok(window) => ready.push(window),
                                        Err(e) => {
                                            failure = Some(e);
                                            input_done = true;
                                            break;
                                        }
                                    }
                                }
                                if !ready.is_empty() {
                                    in_flight.spawn(pool.clone().dispatch(ready, 1));
                                }
                            }
                        }
                    }
                    Some(joined) = in_flight.join_next() => {
                        match joined {
                            Ok(outcome) => pool.settle(outcome, &mut in_flight, &mut reorder),
                            Err(e) => {
                                failure.get_or_insert(SynthesisError::CodecDecodeFailure {
                                    window: next,
                                    reason: format!("dispatch task failed: {e}"),
                                });
                            }
                        }
                    }
                    else => break,
                }
            }

            if let Some(e) = failure {
                yield Err(e);
            } else if !reorder.is_empty() {
                yield Err(SynthesisError::CodecDecodeFailure {
                    window: next,
                    reason: "window lost before decode".to_string(),
                });
            }
        })
    }

    /// Decode one batch under a permit. Codec panics surface as errors.
    ///
    /// The permit moves into the codec task, so a call that outlives a
    /// dropped run still counts against the worker bound until it returns.
    async fn dispatch(self, windows: Vec<TokenWindow>, attempt: u32) -> BatchOutcome {
        let result = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => {
                let codec = Arc::clone(&self.codec);
                let batch = windows.clone();
                let call = async move {
                    let _permit = permit;
                    codec.decode_batch(&batch).await
                };
                match tokio::spawn(call).await {
                    Ok(result) => result,
                    Err(e) => Err(CodecError::Panicked(e.to_string())),
                }
            }
            Err(e) => Err(CodecError::Transport(format!("worker pool closed: {e}"))),
        };

        BatchOutcome {
            windows,
            attempt,
            result,
        }
    }

    fn settle(
        &self,
        outcome: BatchOutcome,
        in_flight: &mut JoinSet<BatchOutcome>,
        reorder: &mut BTreeMap<usize, AudioSegment>,
    ) {
        let BatchOutcome {
            windows,
            attempt,
            result,
        } = outcome;

        match result.and_then(|waveforms| self.check(&windows, waveforms)) {
            Ok(waveforms) => {
                for (window, samples) in windows.into_iter().zip(waveforms) {
                    debug!(chunk = window.chunk, window = window.index, "Window decoded");
                    reorder.insert(window.index, AudioSegment::decoded(window, samples, &self.window));
                }
            }
            Err(e) => {
                for window in windows {
                    if attempt <= self.max_window_retries {
                        debug!(
                            chunk = window.chunk,
                            window = window.index,
                            attempt,
                            error = %e,
                            "Redispatching window"
                        );
                        in_flight.spawn(self.clone().dispatch(vec![window], attempt + 1));
                    } else {
                        warn!(
                            chunk = window.chunk,
                            window = window.index,
                            attempts = attempt,
                            error = %e,
                            "Window decode failed, substituting silence"
                        );
                        reorder.insert(
                            window.index,
                            AudioSegment::silence(window, &self.window, e.to_string()),
                        );
                    }
                }
            }
        }
    }

    fn check(&self, windows: &[TokenWindow], waveforms: Vec<Vec<f32>>) -> CodecResult<Vec<Vec<f32>>> {
        if waveforms.len() != windows.len() {
            return Err(CodecError::InvalidResponse(format!(
                "expected {} waveforms, got {}",
                windows.len(),
                waveforms.len()
            )));
        }
        let expected = self.window.segment_samples();
        if let Some(bad) = waveforms.iter().find(|w| w.len() != expected) {
            return Err(CodecError::InvalidResponse(format!(
                "expected {expected} samples per window, got {}",
                bad.len()
            )));
        }
        Ok(waveforms)
    }
}
