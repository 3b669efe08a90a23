//! WAV writer for short recordings

use super::SampleBuffer;
use crate::layout::partial_path;
use anyhow::{Context, Result};
use std::path::Path;

/// Write `buffer` as 16-bit mono PCM.
///
/// Samples go to a `.part` sibling first and are renamed onto `path` once the
/// header is finalised, so `path` either doesn't exist or is complete.
pub fn encode_wav(buffer: &SampleBuffer, path: &Path) -> Result<()> {
    if buffer.sample_rate == 0 {
        anyhow::bail!("Cannot encode audio with a sample rate of 0");
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let partial = partial_path(path);
    let result = write_samples(&partial, spec, &buffer.samples).and_then(|()| {
        std::fs::rename(&partial, path)
            .with_context(|| format!("Failed to move {} into place", partial.display()))
    });

    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

fn write_samples(path: &Path, spec: hound::WavSpec, samples: &[f32]) -> Result<()> {
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32).round() as i16)?;
    }

    writer.finalize()?;
    Ok(())
}
