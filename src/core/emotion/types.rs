//! Vocal cue types embedded in acoustic token streams.
//!
//! The language model can emit non-speech directives such as `<laugh>` or
//! `<sigh>` between audio tokens. These carry no codec codes of their own;
//! they are tracked by position so later stages can change how the seam
//! around them is blended.

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Control Marker Enum
// =============================================================================

/// Non-audio-bearing control directive emitted inline by the language model.
///
/// # Example
///
/// ```rust
/// use tts_engine::core::emotion::ControlMarker;
///
/// let marker = ControlMarker::Laugh;
/// assert_eq!(marker.to_string(), "laugh");
/// assert_eq!(marker.tag(), "<laugh>");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMarker {
    Laugh,
    Chuckle,
    Sigh,
    Cough,
    Sniffle,
    Groan,
    Yawn,
    Gasp,
}

impl ControlMarker {
    /// Returns every known marker.
    #[inline]
    pub const fn all() -> &'static [ControlMarker] {
        &[
            ControlMarker::Laugh,
            ControlMarker::Chuckle,
            ControlMarker::Sigh,
            ControlMarker::Cough,
            ControlMarker::Sniffle,
            ControlMarker::Groan,
            ControlMarker::Yawn,
            ControlMarker::Gasp,
        ]
    }

    /// Returns the marker name as used inside its tag.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ControlMarker::Laugh => "laugh",
            ControlMarker::Chuckle => "chuckle",
            ControlMarker::Sigh => "sigh",
            ControlMarker::Cough => "cough",
            ControlMarker::Sniffle => "sniffle",
            ControlMarker::Groan => "groan",
            ControlMarker::Yawn => "yawn",
            ControlMarker::Gasp => "gasp",
        }
    }

    /// Returns the inline tag form, e.g. `<sigh>`.
    pub fn tag(&self) -> String {
        format!("<{}>", self.as_str())
    }

    /// Sustained vocal cues blend with an equal-power curve.
    #[inline]
    pub fn prefers_equal_power(&self) -> bool {
        matches!(
            self,
            ControlMarker::Laugh
                | ControlMarker::Chuckle
                | ControlMarker::Sigh
                | ControlMarker::Groan
                | ControlMarker::Yawn
                | ControlMarker::Gasp
        )
    }

    /// Parses a marker name (case-insensitive, without angle brackets).
    ///
    /// # Example
    ///
    /// ```rust
    /// use tts_engine::core::emotion::ControlMarker;
    ///
    /// assert_eq!(ControlMarker::from_name("SIGH"), Some(ControlMarker::Sigh));
    /// assert_eq!(ControlMarker::from_name("whistle"), None);
    /// ```
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "laugh" => Some(ControlMarker::Laugh),
            "chuckle" => Some(ControlMarker::Chuckle),
            "sigh" => Some(ControlMarker::Sigh),
            "cough" => Some(ControlMarker::Cough),
            "sniffle" => Some(ControlMarker::Sniffle),
            "groan" => Some(ControlMarker::Groan),
            "yawn" => Some(ControlMarker::Yawn),
            "gasp" => Some(ControlMarker::Gasp),
            _ => None,
        }
    }

    /// Parses a full tag such as `<laugh>`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        tag.strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .and_then(Self::from_name)
    }
}

impl fmt::Display for ControlMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Positioned Marker
// =============================================================================

/// A control marker anchored to the audio-token position it precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerAt {
    /// Number of audio tokens emitted before the marker
    pub position: usize,
    pub marker: ControlMarker,
}
