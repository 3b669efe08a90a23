//! Magnitude spectra for the model stage
//!
//! Stateless transforms applied to a short recording after extraction.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::Serialize;
use std::f32::consts::PI;

/// Short-time magnitude spectrogram
#[derive(Debug, Clone, Serialize)]
pub struct Spectrogram {
    /// Magnitude values [time_frame][frequency_bin]
    pub magnitudes: Vec<Vec<f32>>,
    pub num_frames: usize,
    pub num_bins: usize,
}

impl Spectrogram {
    pub fn shape(&self) -> (usize, usize) {
        (self.num_frames, self.num_bins)
    }
}

/// Absolute value of the real FFT of `signal` (`len / 2 + 1` bins)
pub fn magnitude_spectrum(signal: &[f32]) -> Vec<f32> {
    if signal.is_empty() {
        return Vec::new();
    }

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(signal.len());

    let mut buffer: Vec<Complex<f32>> = signal.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buffer);

    buffer.truncate(signal.len() / 2 + 1);
    buffer.iter().map(|c| c.norm()).collect()
}

/// Hann-windowed STFT magnitudes.
///
/// Frames start every `hop` samples; the last frame is zero-padded. Returns an
/// empty spectrogram when `fft_size` or `hop` is zero or there are no samples.
pub fn spectrogram(samples: &[f32], fft_size: usize, hop: usize) -> Spectrogram {
    let num_bins = fft_size / 2 + 1;
    if fft_size == 0 || hop == 0 || samples.is_empty() {
        return Spectrogram {
            magnitudes: Vec::new(),
            num_frames: 0,
            num_bins: if fft_size == 0 { 0 } else { num_bins },
        };
    }

    let num_frames = if samples.len() <= fft_size {
        1
    } else {
        (samples.len() - fft_size).div_ceil(hop) + 1
    };

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    let window = hann_window(fft_size);

    let mut magnitudes = Vec::with_capacity(num_frames);
    let mut frame = vec![Complex::new(0.0f32, 0.0); fft_size];

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop;
        let end = (start + fft_size).min(samples.len());

        frame.fill(Complex::new(0.0, 0.0));
        for (i, &s) in samples[start..end].iter().enumerate() {
            frame[i] = Complex::new(s * window[i], 0.0);
        }

        fft.process(&mut frame);
        magnitudes.push(frame[..num_bins].iter().map(|c| c.norm()).collect());
    }

    Spectrogram {
        magnitudes,
        num_frames,
        num_bins,
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}
