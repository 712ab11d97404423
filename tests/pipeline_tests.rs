//! End-to-end synthesis tests against fake LLM and codec backends
//!
//! These tests verify:
//! - Chunk order and stitched length for multi-chunk input
//! - Window and chunk level degradation to silence
//! - Chunk retry budgets per error class
//! - Cancellation, caching and request validation

mod common;

use common::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use tts_engine::core::cache::{AudioCache, CacheConfig, MemoryCacheBackend};
use tts_engine::{
    Degradation, GenerationParams, ResponseFormat, SynthesisError, SynthesisRequest, TtsEngine,
};

const TOKENS: usize = 8;

async fn waveform(engine: &TtsEngine, text: &str) -> tts_engine::SynthesisResult<tts_engine::Waveform> {
    engine
        .synthesize_waveform(&SynthesisRequest::new(text), &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_three_chunks_in_order() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let out = waveform(&engine, THREE_SENTENCES).await.unwrap();

    let per_chunk = chunk_samples(TOKENS);
    assert_eq!(per_chunk, 32);
    assert_eq!(out.samples.len(), 3 * per_chunk);
    assert_eq!(out.sample_rate, SAMPLE_RATE);
    assert!(out.degradations.is_empty());
    assert!(out.is_clean());

    for chunk in 0..3 {
        let region = &out.samples[chunk * per_chunk..(chunk + 1) * per_chunk];
        let tone = ToneCodec::tone(chunk);
        assert!(
            region.iter().all(|s| (s - tone).abs() < 1e-6),
            "chunk {chunk} out of place"
        );
    }

    assert_eq!(llm.calls(), 3);
    let prompts: Vec<String> = llm.requests.lock().iter().map(|r| r.prompt.clone()).collect();
    assert!(prompts.iter().all(|p| p.starts_with("<|audio|>tara: ")));
}

#[tokio::test]
async fn test_exactly_one_window_of_tokens() {
    let llm = Arc::new(FakeLlm::new(WINDOW.size));
    let codec = Arc::new(ToneCodec::new());
    let engine = engine(llm, codec.clone());

    let out = waveform(&engine, "Short.").await.unwrap();

    assert_eq!(out.samples.len(), WINDOW.segment_samples());
    assert_eq!(codec.per_chunk.lock().get(&0).copied(), Some(1));
}

#[tokio::test]
async fn test_short_stream_is_padded_and_trimmed() {
    let llm = Arc::new(FakeLlm::new(2));
    let engine = engine(llm, Arc::new(ToneCodec::new()));

    let out = waveform(&engine, "Hi.").await.unwrap();

    // Two of four tokens are padding, worth one frame
    assert_eq!(out.samples.len(), WINDOW.segment_samples() - WINDOW.padding_samples(2));
    assert!(!out.samples.is_empty());
}

#[tokio::test]
async fn test_failing_window_becomes_silence() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let codec = Arc::new(ToneCodec::new().broken(0, 1));
    let engine = engine(llm, codec);

    let out = waveform(&engine, THREE_SENTENCES).await.unwrap();

    assert_eq!(out.samples.len(), 3 * chunk_samples(TOKENS));
    assert_eq!(out.degradations.len(), 1);
    assert!(matches!(
        &out.degradations[0],
        Degradation::WindowSilenced { chunk: 0, window: 1, .. }
    ));
    assert!(!out.is_clean());

    // Window 1 spans samples 8..24; centred two-sample fades leave 13..=19 silent
    let (start, len) = longest_silence(&out.samples);
    assert_eq!(start, 13);
    assert_eq!(len, 7);
    assert!(out.samples[..8].iter().all(|s| *s > 0.0));
    assert!(out.samples[24..].iter().all(|s| *s > 0.0));
}

#[tokio::test]
async fn test_unavailable_chunk_becomes_fixed_silence() {
    let llm = Arc::new(FakeLlm::new(TOKENS).fail_on("second", Failure::Unavailable, None));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let out = waveform(&engine, THREE_SENTENCES).await.unwrap();

    let per_chunk = chunk_samples(TOKENS);
    let silence = 500 * SAMPLE_RATE as usize / 1000;
    assert_eq!(out.samples.len(), 2 * per_chunk + silence);
    assert_eq!(longest_silence(&out.samples), (per_chunk, silence));
    assert!(out.samples[per_chunk + silence..].iter().all(|s| (s - ToneCodec::tone(2)).abs() < 1e-6));

    assert_eq!(out.degradations.len(), 1);
    assert!(matches!(&out.degradations[0], Degradation::ChunkSilenced { chunk: 1, .. }));
    assert_eq!(llm.calls_matching("second"), 3);
}

#[tokio::test]
async fn test_all_chunks_unavailable_fails_request() {
    let llm = Arc::new(FakeLlm::new(TOKENS).fail_on("sentence", Failure::Unavailable, None));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let err = waveform(&engine, THREE_SENTENCES).await.unwrap_err();

    match err {
        SynthesisError::AllChunksFailed { failures } => {
            assert_eq!(failures.len(), 3);
            let chunks: Vec<usize> = failures.iter().map(|f| f.chunk).collect();
            assert_eq!(chunks, vec![0, 1, 2]);
            assert!(
                failures
                    .iter()
                    .all(|f| matches!(*f.error, SynthesisError::InferenceUnavailable(_)))
            );
        }
        other => panic!("expected AllChunksFailed, got {other:?}"),
    }
    assert_eq!(llm.calls(), 9);
}

#[tokio::test]
async fn test_corrupt_stream_is_regenerated_once() {
    let llm = Arc::new(FakeLlm::new(TOKENS).fail_on("first", Failure::Empty, Some(1)));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let out = waveform(&engine, THREE_SENTENCES).await.unwrap();
    assert!(out.degradations.is_empty());
    assert_eq!(llm.calls_matching("first"), 2);
}

#[tokio::test]
async fn test_persistently_corrupt_stream_gets_two_attempts() {
    let llm = Arc::new(FakeLlm::new(TOKENS).fail_on("third", Failure::Empty, None));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let out = waveform(&engine, THREE_SENTENCES).await.unwrap();
    assert!(matches!(
        out.degradations.as_slice(),
        [Degradation::ChunkSilenced { chunk: 2, .. }]
    ));
    assert_eq!(llm.calls_matching("third"), 2);
}

#[tokio::test]
async fn test_output_is_deterministic_under_reordering() {
    let text = "One sentence here. Two sentence here. Three sentence here. Four sentence here.";
    let run = || async {
        let llm = Arc::new(FakeLlm::new(24));
        let engine = engine(llm, Arc::new(ToneCodec::new().reversed()));
        waveform(&engine, text).await.unwrap().samples
    };

    let first = run().await;
    let second = run().await;
    assert_eq!(first, second);

    let per_chunk = chunk_samples(24);
    assert_eq!(first.len(), 4 * per_chunk);
    for chunk in 0..4 {
        assert!((first[chunk * per_chunk + per_chunk / 2] - ToneCodec::tone(chunk)).abs() < 1e-6);
    }
}

#[tokio::test]
async fn test_generation_concurrency_is_bounded() {
    let llm = Arc::new(FakeLlm::new(TOKENS).with_delay(Duration::from_millis(20)));
    let mut settings = settings();
    settings.resilience.generation_concurrency = 1;
    let engine = TtsEngine::new(llm.clone(), Arc::new(ToneCodec::new()), profile(4, 2), settings);

    waveform(&engine, THREE_SENTENCES).await.unwrap();
    assert_eq!(llm.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generation_cap_does_not_serialize_decoding() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let codec = Arc::new(ToneCodec::new().with_delay(Duration::from_millis(50)));
    let mut settings = settings();
    settings.resilience.generation_concurrency = 1;
    let engine = TtsEngine::new(llm.clone(), codec.clone(), profile(4, 2), settings);

    let out = waveform(&engine, THREE_SENTENCES).await.unwrap();

    assert_eq!(out.samples.len(), 3 * chunk_samples(TOKENS));
    assert_eq!(llm.peak.load(Ordering::SeqCst), 1);
    assert!(codec.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_cancel_during_decode_finishes_current_chunk() {
    let cancel = CancellationToken::new();
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let codec = Arc::new(
        ToneCodec::new()
            .with_delay(Duration::from_millis(20))
            .cancel_on_first_call(cancel.clone()),
    );
    // One chunk in flight at a time
    let engine = TtsEngine::new(llm.clone(), codec.clone(), profile(1, 2), settings());

    let err = engine
        .synthesize_waveform(&SynthesisRequest::new(THREE_SENTENCES), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, SynthesisError::Cancelled);
    assert_eq!(codec.windows_decoded(0), WINDOW.window_count(TOKENS));
    assert_eq!(codec.windows_decoded(1), 0);
    assert_eq!(llm.calls(), 1);
    assert_eq!(llm.calls_matching("second"), 0);
    assert_eq!(llm.calls_matching("third"), 0);
}

#[tokio::test]
async fn test_cancelled_request_stops() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine
        .synthesize_waveform(&SynthesisRequest::new(THREE_SENTENCES), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, SynthesisError::Cancelled);
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_invalid_requests_rejected_before_work() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let err = engine.synthesize(&SynthesisRequest::new("   ")).await.unwrap_err();
    assert!(matches!(err, SynthesisError::InvalidRequest(_)));

    let request = SynthesisRequest::new("Hello.").with_params(GenerationParams {
        temperature: Some(-1.0),
        ..Default::default()
    });
    let err = engine.synthesize(&request).await.unwrap_err();
    assert!(matches!(err, SynthesisError::InvalidRequest(_)));

    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_voice_and_params_reach_the_llm() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new()));

    let request = SynthesisRequest::new("Hello there.")
        .with_voice("leo")
        .with_params(GenerationParams {
            max_tokens: Some(300),
            temperature: Some(0.8),
            top_p: Some(0.5),
        });
    engine.synthesize(&request).await.unwrap();

    let seen = llm.requests.lock();
    assert_eq!(seen[0].prompt, "<|audio|>leo: Hello there.<|eot_id|>");
    assert_eq!(seen[0].temperature, 0.8);
    assert_eq!(seen[0].top_p, 0.5);
    assert_eq!(seen[0].repetition_penalty, 1.1);
}

#[tokio::test]
async fn test_encoded_output_and_cache() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let cache_config = CacheConfig {
        enabled: true,
        ..Default::default()
    };
    let cache = AudioCache::new(Arc::new(MemoryCacheBackend::new(&cache_config)), "test-model");
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new())).with_cache(cache);

    let request = SynthesisRequest::new(THREE_SENTENCES).with_format(ResponseFormat::Pcm);
    let first = engine.synthesize(&request).await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.audio.len(), 3 * chunk_samples(TOKENS) * 2);
    assert_eq!(llm.calls(), 3);

    // Same text modulo case and spacing hits the cache
    let again = SynthesisRequest::new("the first  sentence. THE SECOND sentence. The third sentence.")
        .with_format(ResponseFormat::Pcm);
    let second = engine.synthesize(&again).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.audio, first.audio);
    assert_eq!(llm.calls(), 3);

    // A different format is a different entry
    let wav = engine
        .synthesize(&request.clone().with_format(ResponseFormat::Wav))
        .await
        .unwrap();
    assert!(!wav.cached);
    assert_eq!(&wav.audio[..4], b"RIFF");
}

#[tokio::test]
async fn test_degraded_output_is_not_cached() {
    let llm = Arc::new(FakeLlm::new(TOKENS));
    let cache_config = CacheConfig {
        enabled: true,
        ..Default::default()
    };
    let cache = AudioCache::new(Arc::new(MemoryCacheBackend::new(&cache_config)), "test-model");
    let engine = engine(llm.clone(), Arc::new(ToneCodec::new().broken(1, 0))).with_cache(cache);

    let request = SynthesisRequest::new(THREE_SENTENCES);
    let first = engine.synthesize(&request).await.unwrap();
    assert_eq!(first.degradations.len(), 1);

    let second = engine.synthesize(&request).await.unwrap();
    assert!(!second.cached);
    assert_eq!(llm.calls(), 6);
}
