//! Text segmentation for long-form synthesis.
//!
//! Splits input text into ordered, non-empty chunks no longer than
//! `max_chunk_chars` characters. Boundaries are tried from coarse to fine:
//! sentence terminators, then clause punctuation, then whitespace. Text with
//! no usable delimiter is hard-cut at the ceiling and the chunk is flagged as
//! a forced split so the stitcher can treat the seam after it more carefully.
//! Inline vocal-cue tags such as `<laugh>` are never cut.
//!
//! Chunk spans are byte ranges into the original input. Concatenating the
//! spans, with the whitespace between them, reproduces the input.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

/// Inline vocal-cue tag, e.g. `<sigh>`
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z_]+>").expect("tag pattern is valid"));

/// Floor for a chunk's generation budget
const MIN_TOKEN_BUDGET: usize = 256;

/// A contiguous span of input text synthesized as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position of the chunk within the request
    pub index: usize,
    /// Trimmed chunk text
    pub text: String,
    /// Byte range of `text` within the original input
    pub span: Range<usize>,
    /// Estimated acoustic token budget for generation
    pub token_budget: usize,
    /// The chunk ends at a hard cut rather than a delimiter
    pub forced_split: bool,
}

impl TextChunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Segmentation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmenterConfig {
    /// Hard ceiling on chunk length in characters
    pub max_chunk_chars: usize,
    /// Estimated acoustic tokens produced per input character
    pub tokens_per_char: usize,
    /// Upper bound for any chunk's token budget
    pub max_tokens: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 300,
            tokens_per_char: 8,
            max_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Sentence,
    Clause,
    Whitespace,
}

impl Boundary {
    fn finer(self) -> Option<Boundary> {
        match self {
            Boundary::Sentence => Some(Boundary::Clause),
            Boundary::Clause => Some(Boundary::Whitespace),
            Boundary::Whitespace => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Piece {
    span: Range<usize>,
    forced: bool,
}

/// Splits text into synthesizable chunks
#[derive(Debug, Clone, Default)]
pub struct TextSegmenter {
    config: SegmenterConfig,
}

impl TextSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config: SegmenterConfig {
                max_chunk_chars: config.max_chunk_chars.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Segment `text` into ordered chunks.
    ///
    /// Returns an empty vector when the input holds no visible characters.
    pub fn segment(&self, text: &str) -> Vec<TextChunk> {
        let tags: Vec<Range<usize>> = TAG_RE.find_iter(text).map(|m| m.range()).collect();

        let mut pieces = Vec::new();
        self.pack(text, 0..text.len(), Boundary::Sentence, &tags, &mut pieces);

        pieces
            .into_iter()
            .filter_map(|piece| {
                let span = trim_span(text, &piece.span);
                (!span.is_empty()).then_some((span, piece.forced))
            })
            .enumerate()
            .map(|(index, (span, forced_split))| {
                let chars = text[span.clone()].chars().count();
                TextChunk {
                    index,
                    text: text[span.clone()].to_string(),
                    span,
                    token_budget: self.token_budget(chars),
                    forced_split,
                }
            })
            .collect()
    }

    fn token_budget(&self, chars: usize) -> usize {
        chars
            .saturating_mul(self.config.tokens_per_char)
            .max(MIN_TOKEN_BUDGET)
            .min(self.config.max_tokens)
    }

    /// Greedily merge the pieces found at `level`, descending to a finer
    /// boundary for any piece that alone exceeds the ceiling.
    fn pack(
        &self,
        text: &str,
        span: Range<usize>,
        level: Boundary,
        tags: &[Range<usize>],
        out: &mut Vec<Piece>,
    ) {
        let max = self.config.max_chunk_chars;
        let cuts = cut_positions(text, &span, level);
        let mut current: Option<Range<usize>> = None;

        for piece in split_at(&span, &cuts) {
            let candidate = match &current {
                Some(c) => c.start..piece.end,
                None => piece.clone(),
            };
            if visible_len(text, &candidate) <= max {
                current = Some(candidate);
                continue;
            }

            if let Some(done) = current.take() {
                out.push(Piece {
                    span: done,
                    forced: false,
                });
            }

            if visible_len(text, &piece) <= max {
                current = Some(piece);
            } else {
                match level.finer() {
                    Some(finer) => self.pack(text, piece, finer, tags, out),
                    None => self.force_split(text, piece, tags, out),
                }
            }
        }

        if let Some(done) = current {
            out.push(Piece {
                span: done,
                forced: false,
            });
        }
    }

    /// Hard-cut a delimiter-free run at the ceiling, stepping around tags.
    fn force_split(
        &self,
        text: &str,
        span: Range<usize>,
        tags: &[Range<usize>],
        out: &mut Vec<Piece>,
    ) {
        let span = trim_span(text, &span);
        let mut start = span.start;

        while start < span.end {
            let mut end = advance_chars(text, start, span.end, self.config.max_chunk_chars);
            if end < span.end {
                if let Some(tag) = tags.iter().find(|t| t.start < end && end < t.end) {
                    end = if tag.start > start { tag.start } else { tag.end };
                }
            }

            tracing::debug!(start, end, "Forced split of delimiter-free text");
            out.push(Piece {
                span: start..end,
                forced: end < span.end,
            });
            start = end;
        }
    }
}

/// Segment `text` with default budgets and the given ceiling.
pub fn segment(text: &str, max_chunk_chars: usize) -> Vec<TextChunk> {
    TextSegmenter::new(SegmenterConfig {
        max_chunk_chars,
        ..Default::default()
    })
    .segment(text)
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…' | '。' | '！' | '？')
}

fn is_wide_sentence_end(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | '”' | '’' | ')' | ']' | '»')
}

fn is_clause_end(c: char) -> bool {
    matches!(c, ',' | ';' | ':' | '，' | '；' | '：' | '、')
}

fn is_wide_clause_end(c: char) -> bool {
    matches!(c, '，' | '；' | '：' | '、')
}

/// Byte offsets within `span` where a piece at `level` ends.
fn cut_positions(text: &str, span: &Range<usize>, level: Boundary) -> Vec<usize> {
    let chars: Vec<(usize, char)> = text[span.clone()]
        .char_indices()
        .map(|(i, c)| (span.start + i, c))
        .collect();
    let offset_at = |j: usize| chars.get(j).map_or(span.end, |(p, _)| *p);
    let breaks_at = |j: usize| j >= chars.len() || chars[j].1.is_whitespace();

    let mut cuts = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i].1;
        match level {
            Boundary::Sentence if is_sentence_end(c) => {
                let mut j = i + 1;
                while j < chars.len() && (is_sentence_end(chars[j].1) || is_closing(chars[j].1)) {
                    j += 1;
                }
                if breaks_at(j) || is_wide_sentence_end(c) {
                    cuts.push(offset_at(j));
                }
                i = j;
                continue;
            }
            Boundary::Clause if is_clause_end(c) => {
                if breaks_at(i + 1) || is_wide_clause_end(c) {
                    cuts.push(offset_at(i + 1));
                }
            }
            Boundary::Whitespace if c.is_whitespace() => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].1.is_whitespace() {
                    j += 1;
                }
                cuts.push(offset_at(j));
                i = j;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    cuts
}

fn split_at(span: &Range<usize>, cuts: &[usize]) -> Vec<Range<usize>> {
    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = span.start;
    for &cut in cuts {
        if cut > start && cut < span.end {
            pieces.push(start..cut);
            start = cut;
        }
    }
    if start < span.end {
        pieces.push(start..span.end);
    }
    pieces
}

fn trim_span(text: &str, span: &Range<usize>) -> Range<usize> {
    let slice = &text[span.clone()];
    let start = span.start + (slice.len() - slice.trim_start().len());
    let end = span.end - (slice.len() - slice.trim_end().len());
    if start >= end {
        span.start..span.start
    } else {
        start..end
    }
}

fn visible_len(text: &str, span: &Range<usize>) -> usize {
    text[trim_span(text, span)].chars().count()
}

fn advance_chars(text: &str, start: usize, limit: usize, n: usize) -> usize {
    text[start..limit]
        .char_indices()
        .nth(n)
        .map_or(limit, |(i, _)| start + i)
}
