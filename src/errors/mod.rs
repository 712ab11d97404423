pub mod synthesis_error;

pub use synthesis_error::{ChunkFailure, Degradation, SynthesisError, SynthesisResult};
