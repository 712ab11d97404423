//! Crossfade stitching.
//!
//! Two kinds of joins are handled:
//!
//! - **Window joins** inside a chunk. Consecutive windows share an overlap of
//!   `O` samples, which appears once in the output. A crossfade of
//!   `fade_samples` is centred in the overlap; the earlier window is used
//!   before it and the later window after it. N windows of duration D
//!   therefore stitch to `N·D − (N−1)·O` samples, minus trimmed padding.
//! - **Chunk seams** between chunks. There is no shared audio, so a short
//!   fade-out/fade-in is applied and an optional silence gap is inserted.
//!   Forced splits get a longer gap.
//!
//! Tail padding is always trimmed before any fade is computed.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

use crate::core::decoder::{AudioSegment, WindowConfig};

/// Crossfade gain curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    #[default]
    Linear,
    EqualPower,
}

impl FadeCurve {
    /// Gains (outgoing, incoming) at progress `t` in `[0, 1]`
    #[inline]
    pub fn gains(&self, t: f32) -> (f32, f32) {
        match self {
            FadeCurve::Linear => (1.0 - t, t),
            FadeCurve::EqualPower => ((t * FRAC_PI_2).cos(), (t * FRAC_PI_2).sin()),
        }
    }
}

/// Chunk seam policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StitchConfig {
    pub chunk_fade_ms: u32,
    pub chunk_gap_ms: u32,
    pub forced_split_gap_ms: u32,
    /// Default curve for window joins
    pub curve: FadeCurve,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            chunk_fade_ms: 10,
            chunk_gap_ms: 0,
            forced_split_gap_ms: 50,
            curve: FadeCurve::Linear,
        }
    }
}

/// How a plan entry joins the audio before it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Junction {
    /// First entry, nothing to join
    Start,
    /// Shared overlap region blended with a centred crossfade
    Crossfade {
        overlap: usize,
        fade: usize,
        curve: FadeCurve,
    },
    /// Disjoint audio joined with fades around an optional gap
    Seam { fade: usize, gap: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSegment {
    pub junction: Junction,
    /// Samples with tail padding already trimmed
    pub samples: Vec<f32>,
}

/// Ordered segments with the junction computed for each
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StitchPlan {
    pub entries: Vec<PlannedSegment>,
}

impl StitchPlan {
    /// Output length the plan renders to
    pub fn rendered_len(&self) -> usize {
        self.entries.iter().fold(0, |len, entry| match entry.junction {
            Junction::Start => len + entry.samples.len(),
            Junction::Crossfade { overlap, .. } => {
                let overlap = overlap.min(len).min(entry.samples.len());
                len + entry.samples.len() - overlap
            }
            Junction::Seam { gap, .. } => len + gap + entry.samples.len(),
        })
    }

    /// Consume the plan and produce one waveform.
    pub fn render(self) -> Vec<f32> {
        let mut out: Vec<f32> = Vec::with_capacity(self.rendered_len());
        for entry in self.entries {
            match entry.junction {
                Junction::Start => out.extend_from_slice(&entry.samples),
                Junction::Crossfade {
                    overlap,
                    fade,
                    curve,
                } => crossfade_into(&mut out, &entry.samples, overlap, fade, curve),
                Junction::Seam { fade, gap } => seam_into(&mut out, &entry.samples, fade, gap),
            }
        }
        out
    }
}

fn crossfade_into(out: &mut Vec<f32>, next: &[f32], overlap: usize, fade: usize, curve: FadeCurve) {
    let overlap = overlap.min(out.len()).min(next.len());
    let fade = fade.min(overlap);
    let lead = (overlap - fade) / 2;
    let base = out.len() - overlap;

    for i in 0..overlap {
        let idx = base + i;
        if i < lead {
            continue;
        } else if i < lead + fade {
            let t = (i - lead) as f32 / fade as f32;
            let (gain_out, gain_in) = curve.gains(t);
            out[idx] = out[idx] * gain_out + next[i] * gain_in;
        } else {
            out[idx] = next[i];
        }
    }
    out.extend_from_slice(&next[overlap..]);
}

fn seam_into(out: &mut Vec<f32>, next: &[f32], fade: usize, gap: usize) {
    let tail = fade.min(out.len());
    let base = out.len() - tail;
    for i in 0..tail {
        out[base + i] *= 1.0 - (i + 1) as f32 / tail as f32;
    }

    out.resize(out.len() + gap, 0.0);

    let head = fade.min(next.len());
    out.extend(next.iter().enumerate().map(|(i, s)| {
        if i < head {
            s * i as f32 / head as f32
        } else {
            *s
        }
    }));
}

/// One chunk's stitched audio, ready to be joined to its neighbours
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkAudio {
    pub index: usize,
    pub samples: Vec<f32>,
    /// The chunk ends at a hard text cut
    pub forced_split: bool,
}

/// Builds and renders stitch plans
#[derive(Debug, Clone, Copy)]
pub struct Stitcher {
    window: WindowConfig,
    sample_rate: u32,
    config: StitchConfig,
}

impl Stitcher {
    pub fn new(window: WindowConfig, sample_rate: u32, config: StitchConfig) -> Self {
        Self {
            window,
            sample_rate,
            config,
        }
    }

    /// Default window crossfade length: one codec frame.
    pub fn default_fade_samples(&self) -> usize {
        self.window.samples_per_frame
    }

    pub fn ms_to_samples(&self, ms: u32) -> usize {
        (u64::from(ms) * u64::from(self.sample_rate) / 1000) as usize
    }

    /// Plan the window joins of one chunk.
    pub fn plan_chunk(&self, segments: &[AudioSegment], fade_samples: usize) -> StitchPlan {
        let overlap = self.window.overlap_samples();
        let entries = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let junction = if i == 0 {
                    Junction::Start
                } else {
                    let curve = if segment.markers.iter().any(|m| m.marker.prefers_equal_power()) {
                        FadeCurve::EqualPower
                    } else {
                        self.config.curve
                    };
                    Junction::Crossfade {
                        overlap,
                        fade: fade_samples.min(overlap),
                        curve,
                    }
                };
                PlannedSegment {
                    junction,
                    samples: segment.trimmed().to_vec(),
                }
            })
            .collect();
        StitchPlan { entries }
    }

    /// Stitch one chunk's ordered segments into a waveform.
    pub fn stitch(&self, segments: &[AudioSegment], fade_samples: usize) -> Vec<f32> {
        self.plan_chunk(segments, fade_samples).render()
    }

    /// Plan the seams between ordered chunk outputs.
    pub fn plan_chunks(&self, chunks: Vec<ChunkAudio>) -> StitchPlan {
        let fade = self.ms_to_samples(self.config.chunk_fade_ms);
        let mut forced_before = false;
        let entries = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let junction = if i == 0 {
                    Junction::Start
                } else {
                    let gap_ms = if forced_before {
                        self.config.forced_split_gap_ms
                    } else {
                        self.config.chunk_gap_ms
                    };
                    Junction::Seam {
                        fade,
                        gap: self.ms_to_samples(gap_ms),
                    }
                };
                forced_before = chunk.forced_split;
                PlannedSegment {
                    junction,
                    samples: chunk.samples,
                }
            })
            .collect();
        StitchPlan { entries }
    }

    /// Join ordered chunk outputs into the final waveform.
    pub fn join_chunks(&self, chunks: Vec<ChunkAudio>) -> Vec<f32> {
        self.plan_chunks(chunks).render()
    }
}
