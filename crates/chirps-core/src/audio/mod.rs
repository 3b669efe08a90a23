//! Audio decode/encode collaborators
//!
//! The pipeline only touches audio files through [`AudioCodec`]. The default
//! [`FileCodec`] decodes WAV, MP3, FLAC and OGG with pure Rust decoders (anything
//! else is probed with Symphonia) and writes 16-bit mono WAV.

mod decoder;
mod encoder;
mod probe;

pub use decoder::decode_file;
pub use encoder::encode_wav;

use crate::error::{CorpusError, Result};
use crate::window::PowerWindow;
use std::path::Path;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Number of samples covering `seconds` at this buffer's rate
    pub fn samples_for(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate as f64).round() as usize
    }

    /// Copy out the samples of `window` as a new buffer at the same rate
    pub fn slice(&self, window: &PowerWindow) -> SampleBuffer {
        SampleBuffer::new(self.samples[window.range()].to_vec(), self.sample_rate)
    }
}

/// Supported input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("wav") | Some("wave") => AudioFormat::Wav,
            Some("mp3") => AudioFormat::Mp3,
            Some("flac") => AudioFormat::Flac,
            Some("ogg") => AudioFormat::Ogg,
            _ => AudioFormat::Unknown,
        }
    }
}

/// Decode/encode primitives used by the converter
pub trait AudioCodec: Send + Sync {
    /// Decode a file to mono samples at its native rate
    fn decode(&self, path: &Path) -> Result<SampleBuffer>;

    /// Write `buffer` to `path`; a partially written file is never left at `path`
    fn encode(&self, buffer: &SampleBuffer, path: &Path) -> Result<()>;

    /// Extension used for short recordings produced by [`AudioCodec::encode`]
    fn short_extension(&self) -> &str;
}

/// Default codec backed by the bundled decoders and a WAV writer
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCodec;

impl AudioCodec for FileCodec {
    fn decode(&self, path: &Path) -> Result<SampleBuffer> {
        decode_file(path).map_err(|e| CorpusError::Decode {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    fn encode(&self, buffer: &SampleBuffer, path: &Path) -> Result<()> {
        encode_wav(buffer, path).map_err(|e| CorpusError::Encode {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    fn short_extension(&self) -> &str {
        "wav"
    }
}

/// Average interleaved channels into a mono signal
pub(crate) fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}
