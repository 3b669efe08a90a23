//! Error types for corpus acquisition and conversion

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CorpusError>;

/// Errors raised by the download and conversion pipeline
#[derive(Debug, Error)]
pub enum CorpusError {
    /// The remote endpoint answered with a non-success status
    #[error("request to {url} returned status {status}")]
    Remote { status: u16, url: String },

    /// The request never produced a response (DNS, TLS, timeout, oversized body)
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    /// The metadata response could not be parsed
    #[error("invalid metadata from {url}: {reason}")]
    Metadata { url: String, reason: String },

    /// The requested window is longer than the buffer
    #[error("window of {window} samples does not fit in {available} samples")]
    InvalidWindowSize { window: usize, available: usize },

    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("failed to encode {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background task failed: {0}")]
    Task(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CorpusError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CorpusError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error means the clip was too short for the window
    pub fn is_invalid_window(&self) -> bool {
        matches!(self, CorpusError::InvalidWindowSize { .. })
    }
}
