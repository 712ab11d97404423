//! Sliding token windows aligned to the codec frame size.

use serde::{Deserialize, Serialize};

use crate::core::emotion::MarkerAt;
use crate::core::tokens::AcousticToken;

/// Window geometry and codec frame size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Tokens per window (W)
    pub size: usize,
    /// Tokens advanced between consecutive windows
    pub stride: usize,
    /// Waveform samples produced per stride of tokens
    pub samples_per_frame: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            size: 49,
            stride: 7,
            samples_per_frame: 2048,
        }
    }
}

impl WindowConfig {
    /// Square alignment, `size = stride²`.
    pub fn aligned(stride: usize, samples_per_frame: usize) -> Self {
        Self {
            size: stride * stride,
            stride,
            samples_per_frame,
        }
    }

    pub fn frames_per_window(&self) -> usize {
        self.size / self.stride
    }

    /// Nominal duration of one decoded window, in samples
    pub fn segment_samples(&self) -> usize {
        self.frames_per_window() * self.samples_per_frame
    }

    /// Samples shared by two consecutive windows
    pub fn overlap_samples(&self) -> usize {
        (self.size - self.stride) / self.stride * self.samples_per_frame
    }

    /// Output samples attributable to `tokens` zero-padded tokens
    pub fn padding_samples(&self, tokens: usize) -> usize {
        tokens * self.samples_per_frame / self.stride
    }

    /// Number of windows covering `len` audio tokens
    pub fn window_count(&self, len: usize) -> usize {
        match len {
            0 => 0,
            l if l <= self.size => 1,
            l => (l - self.size).div_ceil(self.stride) + 1,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.stride > 0 && self.size >= self.stride && self.size % self.stride == 0
    }
}

/// A fixed-length run of codes handed to the codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenWindow {
    pub chunk: usize,
    /// Ordinal within the chunk
    pub index: usize,
    /// Audio position of the first code
    pub start: usize,
    /// Exactly W codes, zero-padded at the tail when `padded_tokens > 0`
    pub codes: Vec<u32>,
    pub padded_tokens: usize,
    /// Markers whose position this window introduces
    pub markers: Vec<MarkerAt>,
}

impl TokenWindow {
    pub fn real_tokens(&self) -> usize {
        self.codes.len() - self.padded_tokens
    }
}

/// Incrementally cuts an acoustic token stream into overlapping windows.
///
/// Windows start every `stride` tokens. A trailing run that no full window
/// covers is emitted as one zero-padded window. The most recent window is
/// held back until the next one is ready so that markers at the very end of
/// the stream can still attach to it.
#[derive(Debug)]
pub struct WindowPlanner {
    config: WindowConfig,
    chunk: usize,
    /// Codes from `base` onwards
    codes: Vec<u32>,
    base: usize,
    total: usize,
    next_index: usize,
    pending_markers: Vec<MarkerAt>,
    held: Option<TokenWindow>,
}

impl WindowPlanner {
    pub fn new(chunk: usize, config: WindowConfig) -> Self {
        Self {
            config,
            chunk,
            codes: Vec::with_capacity(config.size * 2),
            base: 0,
            total: 0,
            next_index: 0,
            pending_markers: Vec::new(),
            held: None,
        }
    }

    fn next_start(&self) -> usize {
        self.next_index * self.config.stride
    }

    /// Feed one token; returns a window once a later one supersedes it.
    pub fn push(&mut self, token: AcousticToken) -> Option<TokenWindow> {
        match token {
            AcousticToken::Control(at) => {
                self.pending_markers.push(at);
                None
            }
            AcousticToken::Audio { code, .. } => {
                self.codes.push(code);
                self.total += 1;
                if self.total == self.next_start() + self.config.size {
                    let window = self.cut(self.total);
                    self.held.replace(window)
                } else {
                    None
                }
            }
        }
    }

    /// Flush the held window and any padded tail window, in order.
    pub fn finish(mut self) -> Vec<TokenWindow> {
        let mut out = Vec::with_capacity(2);
        let covered = self.held.as_ref().map_or(0, |w| w.start + self.config.size);

        if self.total > covered {
            let tail = self.cut(self.total);
            out.extend(self.held.take());
            out.push(tail);
        } else {
            out.extend(self.held.take());
        }

        if let Some(last) = out.last_mut() {
            last.markers.append(&mut self.pending_markers);
        } else if !self.pending_markers.is_empty() {
            tracing::debug!(
                chunk = self.chunk,
                markers = self.pending_markers.len(),
                "Dropping markers from a stream without audio"
            );
        }
        out
    }

    /// Cut the window at `next_start` ending at audio position `end`.
    fn cut(&mut self, end: usize) -> TokenWindow {
        let size = self.config.size;
        let start = self.next_start();
        let offset = start - self.base;

        let real = (end - start).min(size);
        let mut codes = Vec::with_capacity(size);
        codes.extend_from_slice(&self.codes[offset..offset + real]);
        codes.resize(size, 0);

        let markers = {
            let (now, later): (Vec<_>, Vec<_>) = self
                .pending_markers
                .drain(..)
                .partition(|m| m.position < end);
            self.pending_markers = later;
            now
        };

        let window = TokenWindow {
            chunk: self.chunk,
            index: self.next_index,
            start,
            codes,
            padded_tokens: size - real,
            markers,
        };

        self.next_index += 1;
        let next_start = self.next_start();
        if next_start > self.base {
            let drop = (next_start - self.base).min(self.codes.len());
            self.codes.drain(..drop);
            self.base += drop;
        }
        window
    }
}

/// Cut a complete token sequence into windows.
pub fn plan_windows(
    chunk: usize,
    tokens: impl IntoIterator<Item = AcousticToken>,
    config: WindowConfig,
) -> Vec<TokenWindow> {
    let mut planner = WindowPlanner::new(chunk, config);
    let mut windows: Vec<TokenWindow> = tokens
        .into_iter()
        .filter_map(|t| planner.push(t))
        .collect();
    windows.extend(planner.finish());
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::emotion::ControlMarker;

    fn audio(n: usize) -> Vec<AcousticToken> {
        (0..n)
            .map(|i| AcousticToken::Audio {
                code: i as u32,
                position: i,
            })
            .collect()
    }

    #[test]
    fn test_geometry() {
        let config = WindowConfig::default();
        assert!(config.is_valid());
        assert_eq!(config.segment_samples(), 7 * 2048);
        assert_eq!(config.overlap_samples(), 6 * 2048);
        assert_eq!(WindowConfig::aligned(7, 2048), config);
        assert!(!WindowConfig { size: 50, ..config }.is_valid());
    }

    #[test]
    fn test_exactly_one_window() {
        let windows = plan_windows(0, audio(49), WindowConfig::default());
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].padded_tokens, 0);
        assert_eq!(windows[0].codes, (0..49).collect::<Vec<u32>>());
    }

    #[test]
    fn test_window_count_and_coverage() {
        let config = WindowConfig::default();
        for len in [49, 50, 55, 56, 57, 98, 100, 343, 350] {
            let windows = plan_windows(0, audio(len), config);
            assert_eq!(
                windows.len(),
                (len - 49).div_ceil(7) + 1,
                "window count for L={len}"
            );
            assert_eq!(windows.len(), config.window_count(len));

            let mut covered = vec![false; len];
            for (i, w) in windows.iter().enumerate() {
                assert_eq!(w.index, i);
                assert_eq!(w.start, i * 7);
                assert_eq!(w.codes.len(), 49);
                for (k, code) in w.codes[..w.real_tokens()].iter().enumerate() {
                    assert_eq!(*code as usize, w.start + k);
                    covered[w.start + k] = true;
                }
            }
            assert!(covered.iter().all(|c| *c), "uncovered token for L={len}");
        }
    }

    #[test]
    fn test_tail_window_is_zero_padded() {
        let windows = plan_windows(0, audio(52), WindowConfig::default());
        assert_eq!(windows.len(), 2);
        let tail = &windows[1];
        assert_eq!(tail.start, 7);
        assert_eq!(tail.real_tokens(), 45);
        assert_eq!(tail.padded_tokens, 4);
        assert!(tail.codes[45..].iter().all(|c| *c == 0));
    }

    #[test]
    fn test_short_stream_yields_one_padded_window() {
        let windows = plan_windows(3, audio(20), WindowConfig::default());
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].chunk, 3);
        assert_eq!(windows[0].padded_tokens, 29);
        assert!(plan_windows(0, Vec::new(), WindowConfig::default()).is_empty());
    }

    #[test]
    fn test_markers_attach_to_introducing_window() {
        let mut tokens = audio(63);
        let marker = |position| {
            AcousticToken::Control(MarkerAt {
                position,
                marker: ControlMarker::Laugh,
            })
        };
        tokens.insert(10, marker(10));
        tokens.insert(56, marker(55));
        tokens.push(marker(63));

        let windows = plan_windows(0, tokens, WindowConfig::default());
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].markers.len(), 1);
        assert_eq!(windows[0].markers[0].position, 10);
        assert_eq!(windows[1].markers[0].position, 55);
        assert_eq!(windows[2].markers[0].position, 63);
    }
}
