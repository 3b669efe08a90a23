//! Per-category download-then-convert driver

use crate::audio::{AudioCodec, FileCodec};
use crate::config::{Category, CorpusConfig};
use crate::convert::{BatchConverter, ConversionReport};
use crate::download::{AmbiguousQuery, Downloader, FetchReport, Recording, Transport, UreqTransport};
use crate::error::{CorpusError, Result};
use crate::layout::CorpusLayout;
use crate::rate_limit::RateLimiter;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Outcome of one category
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategorySummary {
    pub category: String,
    /// Recordings the API reported for the query
    pub matched: Option<u64>,
    pub ambiguous: Option<AmbiguousQuery>,
    pub fetch: Option<FetchReport>,
    pub conversion: Option<ConversionReport>,
    /// Set when the category was abandoned
    pub error: Option<String>,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusReport {
    pub categories: Vec<CategorySummary>,
    /// Conversion outcomes of all categories together
    pub conversion: ConversionReport,
}

/// Drives download and conversion for every configured category
pub struct CorpusOrchestrator {
    config: CorpusConfig,
    layout: CorpusLayout,
    base_url: Url,
    transport: Arc<dyn Transport>,
    converter: BatchConverter,
}

impl CorpusOrchestrator {
    /// Orchestrator using HTTP through `ureq` and the bundled codecs
    pub fn new(config: CorpusConfig) -> Result<Self> {
        let transport = Arc::new(UreqTransport::new(config.timeout(), config.api.max_response_bytes));
        Self::with_collaborators(config, transport, Arc::new(FileCodec))
    }

    /// Orchestrator with explicit network and codec collaborators
    pub fn with_collaborators(
        config: CorpusConfig,
        transport: Arc<dyn Transport>,
        codec: Arc<dyn AudioCodec>,
    ) -> Result<Self> {
        config.validate()?;
        let base_url = config.base_url()?;
        let layout = CorpusLayout::new(&config.corpus.data_dir);
        let converter = BatchConverter::new(codec, config.convert.window_seconds, config.convert.workers);

        Ok(Self {
            config,
            layout,
            base_url,
            transport,
            converter,
        })
    }

    pub fn layout(&self) -> &CorpusLayout {
        &self.layout
    }

    /// Process every category in order.
    ///
    /// Each run gets a fresh rate limiter shared by all categories. A failing
    /// category is reported and the next one proceeds.
    pub async fn run(&self) -> Result<CorpusReport> {
        let limiter = Arc::new(RateLimiter::new(self.config.api.queries_per_second)?);
        let downloader = Downloader::new(Arc::clone(&self.transport), limiter, self.base_url.clone());

        let mut report = CorpusReport::default();
        for category in &self.config.categories {
            let summary = self.run_category(&downloader, category).await;
            if let Some(conversion) = &summary.conversion {
                report.conversion.merge(conversion.clone());
            }
            log_summary(&summary);
            report.categories.push(summary);
        }

        Ok(report)
    }

    async fn run_category(&self, downloader: &Downloader, category: &Category) -> CategorySummary {
        let mut summary = CategorySummary {
            category: category.name.clone(),
            ..Default::default()
        };

        if let Err(e) = self.layout.ensure(&category.name) {
            log::warn!("Cannot prepare folders for {}: {}", category.name, e);
            summary.error = Some(e.to_string());
            return summary;
        }

        if self.config.corpus.download {
            match self.download_category(downloader, category).await {
                Ok((matched, ambiguous, fetch)) => {
                    summary.matched = Some(matched);
                    summary.ambiguous = ambiguous;
                    summary.fetch = Some(fetch);
                }
                Err(e) => {
                    // Nothing to iterate over without metadata
                    log::warn!("Giving up on {}: {}", category.name, e);
                    summary.error = Some(e.to_string());
                    return summary;
                }
            }
        }

        if self.config.corpus.convert {
            match self.convert_category(category).await {
                Ok(conversion) => summary.conversion = Some(conversion),
                Err(e) => {
                    log::warn!("Conversion of {} failed: {}", category.name, e);
                    summary.error = Some(e.to_string());
                }
            }
        }

        summary
    }

    /// Fetch metadata, then the first `max_recordings` recordings
    pub async fn download_category(
        &self,
        downloader: &Downloader,
        category: &Category,
    ) -> Result<(u64, Option<AmbiguousQuery>, FetchReport)> {
        let metadata = downloader.fetch_metadata(&category.query).await?;

        let max = self.config.corpus.max_recordings;
        log::info!("Using first {} recordings of {}", max, category.name);

        let short_extension = self.converter.codec().short_extension().to_string();
        let recordings: Vec<Recording> = metadata
            .recordings
            .iter()
            .take(max)
            .map(|descriptor| {
                Recording::new(
                    &category.name,
                    descriptor,
                    &self.layout,
                    &self.config.corpus.long_extension,
                    &short_extension,
                )
            })
            .collect();

        let fetch = downloader.fetch_all(recordings).await;
        Ok((metadata.num_recordings, metadata.ambiguous, fetch))
    }

    /// Convert everything currently in the category's `long/` directory
    pub async fn convert_category(&self, category: &Category) -> Result<ConversionReport> {
        let files = self.layout.list_long_files(&category.name)?;
        log::info!("Converting {} {} recordings", files.len(), category.name);

        let converter = self.converter.clone();
        tokio::task::spawn_blocking(move || converter.convert_corpus(&files))
            .await
            .map_err(|e| CorpusError::Task(e.to_string()))
    }
}

fn log_summary(summary: &CategorySummary) {
    let (fetched, skipped, failed) = summary
        .fetch
        .as_ref()
        .map(|f| (f.fetched, f.skipped, f.failed.len()))
        .unwrap_or_default();
    let (converted, conversion_skipped, conversion_failed) = summary
        .conversion
        .as_ref()
        .map(|c| (c.converted.len(), c.skipped.len(), c.failed.len()))
        .unwrap_or_default();

    log::info!(
        "{}: fetched {}, already present {}, fetch failures {}; converted {}, skipped {}, conversion failures {}",
        summary.category,
        fetched,
        skipped,
        failed,
        converted,
        conversion_skipped,
        conversion_failed
    );
}
