//! Long-to-short batch conversion
//!
//! Each long recording is decoded, searched for its loudest window and the
//! window written to the short directory. Files are independent: work is spread
//! over a rayon pool and every file ends up in exactly one bucket of the
//! [`ConversionReport`]. Clips shorter than the window are skipped with a
//! warning; any other error is recorded against that file only.

use crate::audio::{AudioCodec, SampleBuffer};
use crate::error::{CorpusError, Result};
use crate::layout::short_path_for;
use crate::window::{find_loudest_window, PowerWindow};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loudest window of a decoded recording
#[derive(Debug, Clone)]
pub struct Extraction {
    pub window: PowerWindow,
    pub clip: SampleBuffer,
}

/// Decode `input`, cut its loudest `window_seconds` and encode them to `output`
pub fn extract_loudest_to_file(
    codec: &dyn AudioCodec,
    input: &Path,
    output: &Path,
    window_seconds: f64,
) -> Result<Extraction> {
    let buffer = codec.decode(input)?;
    let n = buffer.samples_for(window_seconds);
    let (_, window) = find_loudest_window(&buffer.samples, n)?;

    let clip = buffer.slice(&window);
    codec.encode(&clip, output)?;

    Ok(Extraction { window, clip })
}

/// Why a file produced no new short recording
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The short file already exists
    AlreadyConverted,
    /// The recording is shorter than the window
    TooShort { samples: usize, required: usize },
}

/// Per-file result
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionOutcome {
    Converted { short_path: PathBuf, window: PowerWindow },
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvertedFile {
    pub long_path: PathBuf,
    pub short_path: PathBuf,
    pub start_index: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Successes, skips and failures of a conversion batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversionReport {
    pub converted: Vec<ConvertedFile>,
    pub skipped: Vec<SkippedFile>,
    pub failed: Vec<FailedFile>,
}

impl ConversionReport {
    pub fn record(&mut self, long_path: PathBuf, outcome: ConversionOutcome) {
        match outcome {
            ConversionOutcome::Converted { short_path, window } => {
                self.converted.push(ConvertedFile {
                    long_path,
                    short_path,
                    start_index: window.start_index,
                    length: window.length,
                })
            }
            ConversionOutcome::Skipped(reason) => self.skipped.push(SkippedFile {
                path: long_path,
                reason,
            }),
            ConversionOutcome::Failed(reason) => self.failed.push(FailedFile {
                path: long_path,
                reason,
            }),
        }
    }

    pub fn merge(&mut self, other: ConversionReport) {
        self.converted.extend(other.converted);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn total(&self) -> usize {
        self.converted.len() + self.skipped.len() + self.failed.len()
    }

    /// Skips caused by clips shorter than the window
    pub fn too_short(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::TooShort { .. }))
            .count()
    }
}

/// Parallel converter over a set of long recordings
#[derive(Clone)]
pub struct BatchConverter {
    codec: Arc<dyn AudioCodec>,
    window_seconds: f64,
    workers: usize,
}

impl BatchConverter {
    /// `workers == 0` uses one worker per available CPU
    pub fn new(codec: Arc<dyn AudioCodec>, window_seconds: f64, workers: usize) -> Self {
        Self {
            codec,
            window_seconds,
            workers,
        }
    }

    pub fn codec(&self) -> &Arc<dyn AudioCodec> {
        &self.codec
    }

    /// Short path that `long_path` converts to
    pub fn short_path(&self, long_path: &Path) -> PathBuf {
        short_path_for(long_path, self.codec.short_extension())
    }

    /// Convert one file; never panics on bad input and never returns an error
    pub fn convert_file(&self, long_path: &Path) -> ConversionOutcome {
        let short_path = self.short_path(long_path);
        if short_path.exists() {
            log::debug!("{} already converted", long_path.display());
            return ConversionOutcome::Skipped(SkipReason::AlreadyConverted);
        }

        match extract_loudest_to_file(self.codec.as_ref(), long_path, &short_path, self.window_seconds) {
            Ok(extraction) => {
                log::debug!(
                    "{} -> {} (samples {}..{})",
                    long_path.display(),
                    short_path.display(),
                    extraction.window.start_index,
                    extraction.window.start_index + extraction.window.length
                );
                ConversionOutcome::Converted {
                    short_path,
                    window: extraction.window,
                }
            }
            Err(CorpusError::InvalidWindowSize { window, available }) => {
                log::warn!(
                    "{} is shorter than {}s ({} of {} samples), skipping",
                    long_path.display(),
                    self.window_seconds,
                    available,
                    window
                );
                ConversionOutcome::Skipped(SkipReason::TooShort {
                    samples: available,
                    required: window,
                })
            }
            Err(e) => {
                log::warn!("Failed to convert {}: {}", long_path.display(), e);
                ConversionOutcome::Failed(e.to_string())
            }
        }
    }

    /// Convert all `long_files` in parallel and collect the outcomes
    pub fn convert_corpus(&self, long_files: &[PathBuf]) -> ConversionReport {
        let run = || -> Vec<(PathBuf, ConversionOutcome)> {
            long_files
                .par_iter()
                .map(|path| (path.clone(), self.convert_file(path)))
                .collect()
        };

        let outcomes = if self.workers == 0 {
            run()
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    log::warn!("Could not build a {}-thread pool ({}), using the global pool", self.workers, e);
                    run()
                }
            }
        };

        let mut report = ConversionReport::default();
        for (path, outcome) in outcomes {
            report.record(path, outcome);
        }

        log::info!(
            "Converted {} of {} files ({} skipped, {} failed)",
            report.converted.len(),
            report.total(),
            report.skipped.len(),
            report.failed.len()
        );
        report
    }
}
