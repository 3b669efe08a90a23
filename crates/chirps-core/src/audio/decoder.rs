//! Audio decoding for multiple formats

use super::{downmix, probe, AudioFormat, SampleBuffer};
use anyhow::{Context, Result};
use std::path::Path;

/// Interleaved samples straight out of a format decoder
struct RawAudio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

/// Decode an audio file to mono at its native sample rate
pub fn decode_file(path: &Path) -> Result<SampleBuffer> {
    if !path.exists() {
        anyhow::bail!("Audio file not found: {}", path.display());
    }

    let raw = match AudioFormat::from_path(path) {
        AudioFormat::Wav => decode_wav(path)?,
        AudioFormat::Mp3 => decode_mp3(path)?,
        AudioFormat::Flac => decode_flac(path)?,
        AudioFormat::Ogg => decode_ogg(path)?,
        AudioFormat::Unknown => {
            let (samples, sample_rate, channels) = probe::decode_probed(path)?;
            RawAudio {
                samples,
                sample_rate,
                channels,
            }
        }
    };

    if raw.sample_rate == 0 {
        anyhow::bail!("No audio frames in {}", path.display());
    }

    Ok(SampleBuffer::new(
        downmix(raw.samples, raw.channels),
        raw.sample_rate,
    ))
}

fn decode_wav(path: &Path) -> Result<RawAudio> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(RawAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_mp3(path: &Path) -> Result<RawAudio> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read MP3 file: {}", path.display()))?;

    let mut decoder = minimp3::Decoder::new(&data[..]);
    let mut samples = Vec::new();
    let mut sample_rate = 0;
    let mut channels = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if sample_rate == 0 {
                    sample_rate = frame.sample_rate as u32;
                    channels = frame.channels as u16;
                }
                samples.extend(frame.data.iter().map(|&s| s as f32 / 32768.0));
            }
            Err(minimp3::Error::Eof) => break,
            // Xeno-canto uploads occasionally carry junk between frames
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => anyhow::bail!("MP3 decode error: {}", e),
        }
    }

    Ok(RawAudio {
        samples,
        sample_rate,
        channels,
    })
}

fn decode_flac(path: &Path) -> Result<RawAudio> {
    let mut reader = claxon::FlacReader::open(path)
        .with_context(|| format!("Failed to open FLAC file: {}", path.display()))?;

    let info = reader.streaminfo();
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;
    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawAudio {
        samples,
        sample_rate: info.sample_rate,
        channels: info.channels as u16,
    })
}

fn decode_ogg(path: &Path) -> Result<RawAudio> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open OGG file: {}", path.display()))?;

    let mut reader = lewton::inside_ogg::OggStreamReader::new(file)?;

    let sample_rate = reader.ident_hdr.audio_sample_rate;
    let channels = reader.ident_hdr.audio_channels as u16;

    let mut samples = Vec::new();
    while let Some(packet) = reader.read_dec_packet_itl()? {
        samples.extend(packet.iter().map(|&s| s as f32 / 32768.0));
    }

    Ok(RawAudio {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_stereo_wav(path: &Path, frames: &[(i16, i16)], sample_rate: u32) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &(l, r) in frames {
            writer.write_sample(l).unwrap();
            writer.write_sample(r).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_wav_downmixes_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo_wav(&path, &[(16384, 16384), (16384, -16384), (0, 0)], 8000);

        let buffer = decode_file(&path).unwrap();
        assert_eq!(buffer.sample_rate, 8000);
        assert_eq!(buffer.len(), 3);
        assert!((buffer.samples[0] - 0.5).abs() < 1e-6);
        assert!(buffer.samples[1].abs() < 1e-6);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_file(&dir.path().join("absent.mp3")).is_err());
    }

    #[test]
    fn test_corrupt_wav_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFF????not really a wave file").unwrap();

        assert!(decode_file(&path).is_err());
    }
}
