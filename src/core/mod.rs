pub mod audio;
pub mod cache;
pub mod codec;
pub mod decoder;
pub mod emotion;
pub mod generator;
pub mod hardware;
pub mod pipeline;
pub mod pool;
pub mod segmenter;
pub mod stitch;
pub mod tokens;

// Re-export commonly used types for convenience
pub use audio::ResponseFormat;
pub use cache::{AudioCache, CacheBackend, CacheConfig, CacheStats, FilesystemCache, MemoryCacheBackend};
pub use codec::{CodecError, CodecTransform, HttpCodec, HttpCodecConfig};
pub use decoder::{AudioSegment, TokenWindow, WindowConfig, WindowedDecoder};
pub use emotion::{ControlMarker, MarkerAt};
pub use generator::{
    GenerationDefaults, GenerationParams, InferenceConfig, LlmClient, TokenSource,
    TokenStreamGenerator,
};
pub use hardware::{HardwarePolicy, HardwareProfile, HardwareQuery, HardwareTier, SystemHardwareQuery};
pub use pipeline::{
    EngineSettings, ResilienceConfig, SynthesisOutput, SynthesisRequest, TtsEngine, Waveform,
};
pub use pool::WorkerPool;
pub use segmenter::{SegmenterConfig, TextChunk, TextSegmenter};
pub use stitch::{FadeCurve, StitchConfig, Stitcher};
pub use tokens::{AcousticToken, AcousticTokenStream, TokenParser};
