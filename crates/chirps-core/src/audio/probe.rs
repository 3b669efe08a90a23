//! Fallback decoding through Symphonia's format probe
//!
//! Used for extensions the dedicated decoders don't cover (m4a/aac uploads,
//! files saved without an extension).

use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal, SignalSpec};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decode the first audio track of `path` into interleaved samples.
///
/// Returns `(samples, sample_rate, channels)`.
pub(super) fn decode_probed(path: &Path) -> Result<(Vec<f32>, u32, u16)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| format!("Unrecognised audio container: {}", path.display()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow::anyhow!("No audio track in {}", path.display()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0) as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(anyhow::anyhow!("Error reading packet: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // A damaged packet costs a few milliseconds of audio, not the file
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(anyhow::anyhow!("Decode failed: {}", e)),
        };

        let spec = *decoded.spec();
        fill_stream_params(&spec, &mut sample_rate, &mut channels);
        push_interleaved(&decoded, spec.channels.count(), &mut samples)?;
    }

    Ok((samples, sample_rate, channels.max(1)))
}

/// Take rate and channel count from decoded audio when the container left them out
fn fill_stream_params(spec: &SignalSpec, sample_rate: &mut u32, channels: &mut u16) {
    if *sample_rate == 0 {
        *sample_rate = spec.rate;
    }
    if *channels == 0 {
        *channels = spec.channels.count() as u16;
    }
}

fn push_interleaved(decoded: &AudioBufferRef<'_>, channels: usize, out: &mut Vec<f32>) -> Result<()> {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            for frame in 0..$buf.frames() {
                for ch in 0..channels {
                    out.push($convert($buf.chan(ch)[frame]));
                }
            }
        }};
    }

    match decoded {
        AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / i32::MAX as f32),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / i16::MAX as f32),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => anyhow::bail!("Unsupported sample format"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::Channels;

    #[test]
    fn test_missing_stream_params_come_from_decoded_audio() {
        let spec = SignalSpec::new(44100, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);

        let (mut rate, mut channels) = (0, 0);
        fill_stream_params(&spec, &mut rate, &mut channels);
        assert_eq!((rate, channels), (44100, 2));

        let (mut rate, mut channels) = (22050, 1);
        fill_stream_params(&spec, &mut rate, &mut channels);
        assert_eq!((rate, channels), (22050, 1));
    }
}
