//! chirps core - recording corpus acquisition and preprocessing
//!
//! Downloads recordings per category under a shared rate limit, then cuts the
//! loudest fixed-length window out of every recording in parallel. Both phases
//! are idempotent: existing outputs are never redone.

pub mod audio;
pub mod config;
pub mod convert;
pub mod download;
pub mod error;
pub mod features;
pub mod layout;
pub mod orchestrator;
pub mod rate_limit;
pub mod window;

pub use audio::{AudioCodec, FileCodec, SampleBuffer};
pub use config::{Category, CorpusConfig};
pub use convert::{extract_loudest_to_file, BatchConverter, ConversionReport, Extraction, SkipReason};
pub use download::{CategoryMetadata, Downloader, FetchOutcome, FetchReport, Recording, Transport};
pub use error::{CorpusError, Result};
pub use layout::CorpusLayout;
pub use orchestrator::{CategorySummary, CorpusOrchestrator, CorpusReport};
pub use rate_limit::RateLimiter;
pub use window::{find_loudest_window, PowerWindow};
