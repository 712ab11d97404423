//! Acoustic token model and the incremental parser for LLM token text.
//!
//! The language model emits its acoustic codes as text: every audio token is a
//! `<custom_token_N>` tag, vocal cues appear as `<laugh>`-style tags and the
//! prompt framing uses `<|...|>` specials. Streaming responses may split a tag
//! across pieces, so [`TokenParser`] keeps the unterminated tail between calls.

use futures::stream::BoxStream;

use crate::core::emotion::{ControlMarker, MarkerAt};
use crate::errors::{SynthesisError, SynthesisResult};

/// Lazy, finite, non-restartable token sequence for one chunk
pub type AcousticTokenStream = BoxStream<'static, SynthesisResult<AcousticToken>>;

/// Number of codebook positions interleaved in one codec frame
pub const CODES_PER_FRAME: usize = 7;

/// Size of each codebook
pub const CODEBOOK_SIZE: u32 = 4096;

/// Offset between the raw token id and codebook position zero
const TOKEN_ID_OFFSET: u32 = 10;

/// Longest tag accepted before the tail is considered garbage
const MAX_TAG_LEN: usize = 64;

const AUDIO_TAG_PREFIX: &str = "<custom_token_";

/// One element of a chunk's acoustic token stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcousticToken {
    /// Audio-bearing codec code at its ordinal position within the chunk
    Audio { code: u32, position: usize },
    /// Non-audio directive anchored before the next audio position
    Control(MarkerAt),
}

impl AcousticToken {
    /// Audio ordinal this token is anchored to
    pub fn position(&self) -> usize {
        match self {
            AcousticToken::Audio { position, .. } => *position,
            AcousticToken::Control(at) => at.position,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, AcousticToken::Audio { .. })
    }
}

/// Incremental parser turning LLM text pieces into [`AcousticToken`]s
#[derive(Debug, Default)]
pub struct TokenParser {
    pending: String,
    audio_count: usize,
}

impl TokenParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audio tokens parsed so far
    pub fn audio_count(&self) -> usize {
        self.audio_count
    }

    /// Feed a piece of generated text and return the tokens it completes.
    pub fn push(&mut self, piece: &str) -> SynthesisResult<Vec<AcousticToken>> {
        self.pending.push_str(piece);

        let mut tokens = Vec::new();
        let mut consumed = 0;

        loop {
            let rest = &self.pending[consumed..];
            let Some(open) = rest.find('<') else {
                consumed = self.pending.len();
                break;
            };
            let Some(close) = rest[open..].find('>') else {
                if rest.len() - open > MAX_TAG_LEN {
                    return Err(SynthesisError::TokenStreamCorrupt(format!(
                        "unterminated tag: {:?}",
                        truncate(&rest[open..])
                    )));
                }
                consumed += open;
                break;
            };

            let tag = rest[open..open + close + 1].to_string();
            if let Some(token) = self.parse_tag(&tag)? {
                tokens.push(token);
            }
            consumed += open + close + 1;
        }

        self.pending.drain(..consumed);
        Ok(tokens)
    }

    /// Validate the end of the stream.
    ///
    /// Fails when a tag was left open or the chunk produced no audio at all.
    pub fn finish(self) -> SynthesisResult<usize> {
        if !self.pending.trim().is_empty() {
            return Err(SynthesisError::TokenStreamCorrupt(format!(
                "stream ended inside a tag: {:?}",
                truncate(&self.pending)
            )));
        }
        if self.audio_count == 0 {
            return Err(SynthesisError::TokenStreamCorrupt(
                "stream contained no audio tokens".to_string(),
            ));
        }
        Ok(self.audio_count)
    }

    fn parse_tag(&mut self, tag: &str) -> SynthesisResult<Option<AcousticToken>> {
        if tag.starts_with("<|") && tag.ends_with("|>") {
            return Ok(None);
        }

        if let Some(digits) = tag
            .strip_prefix(AUDIO_TAG_PREFIX)
            .and_then(|t| t.strip_suffix('>'))
        {
            let id: u32 = digits.parse().map_err(|_| {
                SynthesisError::TokenStreamCorrupt(format!("invalid audio token {tag}"))
            })?;
            return self.audio_token(id);
        }

        match ControlMarker::from_tag(tag) {
            Some(marker) => Ok(Some(AcousticToken::Control(MarkerAt {
                position: self.audio_count,
                marker,
            }))),
            None => Err(SynthesisError::TokenStreamCorrupt(format!(
                "unexpected tag {}",
                truncate(tag)
            ))),
        }
    }

    fn audio_token(&mut self, id: u32) -> SynthesisResult<Option<AcousticToken>> {
        // Framing ids below the offset carry no audio.
        if id < TOKEN_ID_OFFSET {
            tracing::trace!(id, "Skipping framing token");
            return Ok(None);
        }

        let slot = (self.audio_count % CODES_PER_FRAME) as u32;
        let code = i64::from(id) - i64::from(TOKEN_ID_OFFSET) - i64::from(slot * CODEBOOK_SIZE);
        if !(0..i64::from(CODEBOOK_SIZE)).contains(&code) {
            return Err(SynthesisError::TokenStreamCorrupt(format!(
                "audio token {id} out of range for codebook slot {slot}"
            )));
        }

        let position = self.audio_count;
        self.audio_count += 1;
        Ok(Some(AcousticToken::Audio {
            code: code as u32,
            position,
        }))
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}

/// Render a codec code as the raw token text the model would emit at `position`.
pub fn encode_audio_token(code: u32, position: usize) -> String {
    let id = code + TOKEN_ID_OFFSET + (position % CODES_PER_FRAME) as u32 * CODEBOOK_SIZE;
    format!("{AUDIO_TAG_PREFIX}{id}>")
}
