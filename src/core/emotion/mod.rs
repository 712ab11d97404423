//! Vocal cues carried inline in the acoustic token stream.
//!
//! Input text may contain tags such as `<laugh>`; the language model echoes
//! them as control markers between audio tokens. The segmenter keeps tags
//! intact, the token parser turns them into [`ControlMarker`] values, and
//! the stitcher uses their positions to choose a crossfade curve.

pub mod types;

pub use types::{ControlMarker, MarkerAt};
