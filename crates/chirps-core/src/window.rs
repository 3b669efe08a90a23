//! Loudest-window search
//!
//! Finds the contiguous run of `n` samples with the highest mean power
//! (mean of squared amplitudes) in a single pass. The running sum of squares is
//! updated one sample at a time, so the search is O(len) regardless of `n`.

use crate::error::{CorpusError, Result};
use serde::Serialize;
use std::ops::Range;

/// Steps between exact recomputations of the running energy.
///
/// Incremental add/subtract on arbitrary floats accumulates rounding error over
/// millions of samples; resyncing keeps it bounded. The effective interval is
/// never shorter than the window itself so the resync cost stays O(len).
const RESYNC_INTERVAL: usize = 1 << 16;

/// A contiguous range of samples and its mean power
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerWindow {
    /// Index of the first sample in the window
    pub start_index: usize,
    /// Window length in samples
    pub length: usize,
    /// Mean of squared amplitudes over the window
    pub power: f64,
}

impl PowerWindow {
    pub fn range(&self) -> Range<usize> {
        self.start_index..self.start_index + self.length
    }
}

/// Mean of squared amplitudes, 0.0 for an empty slice
pub fn window_power(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    energy(samples) / samples.len() as f64
}

/// Find the loudest window of `n` samples.
///
/// Returns the window's samples and its position. When several windows share the
/// maximum power the earliest one is returned. Fails with
/// [`CorpusError::InvalidWindowSize`] when `n` is zero or longer than `samples`.
pub fn find_loudest_window(samples: &[f32], n: usize) -> Result<(&[f32], PowerWindow)> {
    let len = samples.len();
    if n == 0 || n > len {
        return Err(CorpusError::InvalidWindowSize {
            window: n,
            available: len,
        });
    }

    let resync_every = RESYNC_INTERVAL.max(n);

    let mut current = energy(&samples[..n]);
    let mut best = current;
    let mut best_start = 0;

    for start in 1..=len - n {
        if start % resync_every == 0 {
            current = energy(&samples[start..start + n]);
        } else {
            let outgoing = samples[start - 1] as f64;
            let incoming = samples[start + n - 1] as f64;
            current += incoming * incoming - outgoing * outgoing;
        }

        // Strict comparison keeps the earliest window on ties
        if current > best {
            best = current;
            best_start = start;
        }
    }

    let window = PowerWindow {
        start_index: best_start,
        length: n,
        power: best / n as f64,
    };
    Ok((&samples[window.range()], window))
}

fn energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&s| (s as f64) * (s as f64)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Reference O(len * n) search used to cross-check the sliding version
    fn brute_force(samples: &[f32], n: usize) -> (usize, f64) {
        let mut best_start = 0;
        let mut best = f64::NEG_INFINITY;
        for start in 0..=samples.len() - n {
            let power = window_power(&samples[start..start + n]);
            if power > best {
                best = power;
                best_start = start;
            }
        }
        (best_start, best)
    }

    /// Small deterministic generator so the cross-check needs no extra crates
    fn pseudo_random(len: usize, seed: u64) -> Vec<f32> {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 40) as i32 - (1 << 23)) as f32 / (1 << 23) as f32
            })
            .collect()
    }

    #[test]
    fn test_finds_unique_maximum() {
        let samples = [0.0, 1.0, 10.0, 11.0, 12.0, 2.0, 4.0, 3.0, 2.0];
        let (window, position) = find_loudest_window(&samples, 3).unwrap();

        assert_eq!(window, &[10.0, 11.0, 12.0]);
        assert_eq!(position.start_index, 2);
        assert_eq!(position.length, 3);
        assert_relative_eq!(position.power, (100.0 + 121.0 + 144.0) / 3.0);
    }

    #[test]
    fn test_whole_buffer_when_window_matches_length() {
        let samples = [0.5, -0.25, 0.75];
        let (window, position) = find_loudest_window(&samples, 3).unwrap();

        assert_eq!(window, &samples);
        assert_eq!(position.start_index, 0);
    }

    #[test]
    fn test_window_longer_than_buffer_fails() {
        let samples = [0.1; 4];
        let err = find_loudest_window(&samples, 5).unwrap_err();

        assert!(err.is_invalid_window());
        match err {
            CorpusError::InvalidWindowSize { window, available } => {
                assert_eq!(window, 5);
                assert_eq!(available, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_window_fails() {
        assert!(find_loudest_window(&[1.0, 2.0], 0)
            .unwrap_err()
            .is_invalid_window());
        assert!(find_loudest_window(&[], 1).unwrap_err().is_invalid_window());
    }

    #[test]
    fn test_ties_resolve_to_earliest_window() {
        let flat = [1.0; 6];
        let (_, position) = find_loudest_window(&flat, 2).unwrap();
        assert_eq!(position.start_index, 0);

        // Same magnitude with opposite sign has the same power
        let mirrored = [0.0, 3.0, 0.0, -3.0, 0.0];
        let (_, position) = find_loudest_window(&mirrored, 2).unwrap();
        assert_eq!(position.start_index, 0);

        let (_, position) = find_loudest_window(&mirrored, 1).unwrap();
        assert_eq!(position.start_index, 1);
    }

    #[test]
    fn test_loudest_window_at_end() {
        let samples = [0.0, 0.0, 0.0, 0.1, 0.9, 0.9];
        let (window, position) = find_loudest_window(&samples, 2).unwrap();

        assert_eq!(position.start_index, 4);
        assert_eq!(window, &[0.9, 0.9]);
    }

    #[test]
    fn test_matches_brute_force() {
        for (seed, len) in [(1u64, 17usize), (7, 64), (42, 301), (99, 1000)] {
            let samples = pseudo_random(len, seed);
            for n in [1, 2, 3, 8, len / 2, len] {
                let (window, position) = find_loudest_window(&samples, n).unwrap();
                let (expected_start, expected_power) = brute_force(&samples, n);

                assert_eq!(window.len(), n);
                assert_eq!(position.start_index, expected_start, "len={len} n={n}");
                assert_relative_eq!(position.power, expected_power, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_long_buffer_crosses_resync_boundary() {
        let len = RESYNC_INTERVAL * 3 + 123;
        let mut samples = pseudo_random(len, 5);
        for s in samples.iter_mut() {
            *s *= 0.1;
        }
        // Burst placed just after the second resync point
        let burst = RESYNC_INTERVAL * 2 + 10;
        for s in &mut samples[burst..burst + 16] {
            *s = 0.95;
        }

        let (window, position) = find_loudest_window(&samples, 16).unwrap();
        assert_eq!(window.len(), 16);
        assert_eq!(position.start_index, burst);
    }
}
