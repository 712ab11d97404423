//! Output encoding for synthesized waveforms.

use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::errors::{SynthesisError, SynthesisResult};

/// Response payload format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// 16-bit mono RIFF/WAVE
    #[default]
    Wav,
    /// Raw 16-bit little-endian mono samples
    Pcm,
}

impl ResponseFormat {
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Wav => "wav",
            ResponseFormat::Pcm => "pcm",
        }
    }

    #[inline]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            ResponseFormat::Wav => "audio/wav",
            ResponseFormat::Pcm => "audio/pcm",
        }
    }

    /// Parse a format name. Formats the engine cannot encode are rejected.
    pub fn parse(s: &str) -> SynthesisResult<Self> {
        match s.to_lowercase().as_str() {
            "wav" => Ok(ResponseFormat::Wav),
            "pcm" => Ok(ResponseFormat::Pcm),
            other => Err(SynthesisError::InvalidRequest(format!(
                "unsupported response format: {other}"
            ))),
        }
    }
}

impl std::str::FromStr for ResponseFormat {
    type Err = SynthesisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[inline]
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

/// Raw 16-bit little-endian PCM
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| to_i16(*s).to_le_bytes()).collect()
}

/// 16-bit mono WAV
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> SynthesisResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut wav), spec)
            .map_err(|e| SynthesisError::Encoding(format!("Failed to create WAV writer: {e}")))?;
        for sample in samples {
            writer
                .write_sample(to_i16(*sample))
                .map_err(|e| SynthesisError::Encoding(format!("Failed to write sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SynthesisError::Encoding(format!("Failed to finalize WAV data: {e}")))?;
    }
    Ok(wav)
}

/// Encode a waveform in the requested format.
pub fn encode(samples: &[f32], sample_rate: u32, format: ResponseFormat) -> SynthesisResult<Vec<u8>> {
    match format {
        ResponseFormat::Wav => encode_wav(samples, sample_rate),
        ResponseFormat::Pcm => Ok(encode_pcm16(samples)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!(ResponseFormat::parse("WAV").unwrap(), ResponseFormat::Wav);
        assert_eq!("pcm".parse::<ResponseFormat>().unwrap(), ResponseFormat::Pcm);
        assert!(matches!(
            ResponseFormat::parse("mp3"),
            Err(SynthesisError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_pcm_clamps() {
        let bytes = encode_pcm16(&[0.0, 1.5, -1.5]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -i16::MAX);
    }

    #[test]
    fn test_wav_header_and_samples() {
        let samples = vec![0.25f32; 2400];
        let wav = encode_wav(&samples, 24000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 2400);
    }
}
