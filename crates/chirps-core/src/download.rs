//! Recording metadata and file downloads
//!
//! Every outbound request goes through the shared [`RateLimiter`]. Recordings
//! whose long file already exists are skipped before the limiter is touched, so a
//! re-run over a complete corpus makes no network calls for them.

use crate::error::{CorpusError, Result};
use crate::layout::{partial_path, short_path_for, CorpusLayout};
use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Status and body of an HTTP GET
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP seam.
///
/// Non-success statuses come back as responses; only failures to get any
/// response at all are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse>;
}

/// Blocking `ureq` agent driven from the async side via `spawn_blocking`
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    max_response_bytes: usize,
}

impl UreqTransport {
    pub fn new(timeout: Duration, max_response_bytes: usize) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(concat!("chirps/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            max_response_bytes,
        }
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        let max_bytes = self.max_response_bytes;
        let target = url.clone();

        tokio::task::spawn_blocking(move || blocking_get(&agent, &target, max_bytes))
            .await
            .map_err(|e| CorpusError::Http {
                url: url.to_string(),
                reason: format!("request task failed: {e}"),
            })?
    }
}

fn blocking_get(agent: &ureq::Agent, url: &Url, max_bytes: usize) -> Result<HttpResponse> {
    let http_error = |reason: String| CorpusError::Http {
        url: url.to_string(),
        reason,
    };

    let response = match agent.get(url.as_str()).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => return Err(http_error(transport.to_string())),
    };

    let status = response.status();
    let mut body = Vec::new();
    response
        .into_reader()
        .take(max_bytes as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| http_error(e.to_string()))?;
    if body.len() > max_bytes {
        return Err(http_error(format!("response exceeded {max_bytes} bytes")));
    }

    Ok(HttpResponse { status, body })
}

/// One entry of the metadata listing
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingDescriptor {
    pub id: String,
    pub file: Url,
}

/// Warning raised when a query matched recordings of more than one species
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmbiguousQuery {
    pub query: String,
    pub num_species: u64,
}

impl fmt::Display for AmbiguousQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "query {:?} matched recordings of {} species, you might want to make the search more precise",
            self.query, self.num_species
        )
    }
}

/// Parsed metadata response for one category query
#[derive(Debug, Clone)]
pub struct CategoryMetadata {
    pub num_recordings: u64,
    pub num_species: u64,
    pub recordings: Vec<RecordingDescriptor>,
    pub ambiguous: Option<AmbiguousQuery>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataPayload {
    #[serde(deserialize_with = "flexible_count")]
    num_recordings: u64,
    #[serde(deserialize_with = "flexible_count")]
    num_species: u64,
    #[serde(default)]
    recordings: Vec<RecordingEntry>,
}

#[derive(Deserialize)]
struct RecordingEntry {
    #[serde(deserialize_with = "flexible_string")]
    id: String,
    // Restricted recordings come with an empty or missing link
    #[serde(default)]
    file: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

// The live API serialises counts and ids as strings
fn flexible_count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn flexible_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => n.to_string(),
        NumberOrText::Text(s) => s,
    })
}

impl CategoryMetadata {
    /// Parse a metadata body fetched from `source`.
    ///
    /// File links are resolved against `source`, so absolute, protocol-relative
    /// and path-only links all work. Entries with unusable links are dropped.
    pub fn parse(body: &[u8], source: &Url, query: &str) -> Result<Self> {
        let payload: MetadataPayload =
            serde_json::from_slice(body).map_err(|e| CorpusError::Metadata {
                url: source.to_string(),
                reason: e.to_string(),
            })?;

        let mut recordings = Vec::with_capacity(payload.recordings.len());
        for entry in payload.recordings {
            let link = match entry.file.as_deref().map(str::trim) {
                Some(link) if !link.is_empty() => link,
                _ => {
                    log::warn!("Ignoring recording {} without a file link", entry.id);
                    continue;
                }
            };
            match source.join(link) {
                Ok(file) => recordings.push(RecordingDescriptor { id: entry.id, file }),
                Err(e) => log::warn!("Ignoring recording {} with bad link {:?}: {}", entry.id, link, e),
            }
        }

        let ambiguous = (payload.num_species > 1).then(|| AmbiguousQuery {
            query: query.to_string(),
            num_species: payload.num_species,
        });

        Ok(Self {
            num_recordings: payload.num_recordings,
            num_species: payload.num_species,
            recordings,
            ambiguous,
        })
    }
}

/// A recording scheduled for download and conversion
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub category: String,
    pub remote_id: String,
    pub source_url: Url,
    pub long_path: PathBuf,
    pub short_path: PathBuf,
}

impl Recording {
    pub fn new(
        category: &str,
        descriptor: &RecordingDescriptor,
        layout: &CorpusLayout,
        long_extension: &str,
        short_extension: &str,
    ) -> Self {
        let long_path = layout.long_path(category, &descriptor.id, long_extension);
        let short_path = short_path_for(&long_path, short_extension);
        Self {
            category: category.to_string(),
            remote_id: descriptor.id.clone(),
            source_url: descriptor.file.clone(),
            long_path,
            short_path,
        }
    }
}

/// Result of a single recording fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The long file was already on disk; no request was made
    AlreadyPresent,
    /// The body was downloaded and written
    Fetched { bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub remote_id: String,
    pub reason: String,
}

/// Counts for one category's download phase
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FetchReport {
    pub fetched: usize,
    pub skipped: usize,
    pub bytes: u64,
    pub failed: Vec<FetchFailure>,
}

/// Metadata and recording fetcher sharing one rate limiter
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    base_url: Url,
}

impl Downloader {
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>, base_url: Url) -> Self {
        Self {
            transport,
            limiter,
            base_url,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// `<base_url>/recordings?query=<query>`
    pub fn metadata_url(&self, query: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CorpusError::Config(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push("recordings");
        url.query_pairs_mut().append_pair("query", query);
        Ok(url)
    }

    /// Fetch and parse the recording listing for `query`.
    ///
    /// No retry on failure: a non-success status is returned as
    /// [`CorpusError::Remote`] for the caller to log.
    pub async fn fetch_metadata(&self, query: &str) -> Result<CategoryMetadata> {
        let url = self.metadata_url(query)?;

        let permit = self.limiter.acquire().await;
        log::debug!("{:?}: -> {}", permit.dispatched_at(), url);
        let response = self.transport.get(&url).await?;

        if !response.is_success() {
            return Err(CorpusError::Remote {
                status: response.status,
                url: url.to_string(),
            });
        }

        let metadata = CategoryMetadata::parse(&response.body, &url, query)?;
        if let Some(ambiguous) = &metadata.ambiguous {
            log::warn!("{}", ambiguous);
        }
        log::info!(
            "Found {} recordings for {:?} ({} listed)",
            metadata.num_recordings,
            query,
            metadata.recordings.len()
        );

        Ok(metadata)
    }

    /// Download one recording unless its long file already exists
    pub async fn fetch_recording(&self, recording: &Recording) -> Result<FetchOutcome> {
        if exists(&recording.long_path).await? {
            log::info!(
                "{} already exists, skipping {}",
                recording.long_path.display(),
                recording.source_url
            );
            return Ok(FetchOutcome::AlreadyPresent);
        }

        let permit = self.limiter.acquire().await;
        log::debug!("{:?}: -> {}", permit.dispatched_at(), recording.source_url);
        let bytes = self.download(recording).await?;
        Ok(FetchOutcome::Fetched { bytes })
    }

    /// Fetch every recording concurrently.
    ///
    /// Missing recordings reserve their limiter slot in list order before any
    /// task starts, so dispatch follows list order while responses overlap.
    /// One failed recording never affects the others.
    pub async fn fetch_all(&self, recordings: Vec<Recording>) -> FetchReport {
        let mut report = FetchReport::default();
        let mut tasks = Vec::new();
        let mut claimed: HashMap<PathBuf, String> = HashMap::new();

        for recording in recordings {
            // Ids that sanitize to the same file name would shadow each other
            if let Some(owner) = claimed.get(&recording.long_path) {
                let reason = format!(
                    "{} is already claimed by recording {}",
                    recording.long_path.display(),
                    owner
                );
                log::warn!("Recording {} skipped: {}", recording.remote_id, reason);
                report.failed.push(FetchFailure {
                    remote_id: recording.remote_id,
                    reason,
                });
                continue;
            }
            claimed.insert(recording.long_path.clone(), recording.remote_id.clone());

            match exists(&recording.long_path).await {
                Ok(true) => {
                    log::info!("{} already exists, skipping", recording.long_path.display());
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed.push(FetchFailure {
                        remote_id: recording.remote_id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }

            let reservation = self.limiter.reserve();
            let this = self.clone();
            let remote_id = recording.remote_id.clone();
            let handle = tokio::spawn(async move {
                let permit = reservation.wait().await;
                log::debug!("{:?}: -> {}", permit.dispatched_at(), recording.source_url);
                this.download(&recording).await
            });
            tasks.push((remote_id, handle));
        }

        for (remote_id, handle) in tasks {
            let outcome = match handle.await {
                Ok(outcome) => outcome.map_err(|e| e.to_string()),
                Err(e) => Err(format!("download task failed: {e}")),
            };
            match outcome {
                Ok(bytes) => {
                    report.fetched += 1;
                    report.bytes += bytes;
                }
                Err(reason) => {
                    log::warn!("Recording {} failed: {}", remote_id, reason);
                    report.failed.push(FetchFailure { remote_id, reason });
                }
            }
        }

        report
    }

    /// Issue the request and write the body to the long path
    async fn download(&self, recording: &Recording) -> Result<u64> {
        let response = self.transport.get(&recording.source_url).await?;
        log::debug!("<- {} for {}", response.status, recording.source_url);

        if !response.is_success() {
            return Err(CorpusError::Remote {
                status: response.status,
                url: recording.source_url.to_string(),
            });
        }

        write_atomically(&recording.long_path, &response.body).await?;
        Ok(response.body.len() as u64)
    }
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| CorpusError::io(path, e))
}

/// Write to `<path>.part` then rename, so `path` never holds a partial body
async fn write_atomically(path: &Path, body: &[u8]) -> Result<()> {
    let partial = partial_path(path);
    if let Err(e) = tokio::fs::write(&partial, body).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(CorpusError::io(&partial, e));
    }
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|e| CorpusError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> Url {
        Url::parse("https://www.xeno-canto.org/api/2/recordings?query=parus+major").unwrap()
    }

    #[test]
    fn test_parse_string_counts_and_links() {
        let body = br#"{
            "numRecordings": "3",
            "numSpecies": "1",
            "page": 1,
            "recordings": [
                {"id": "1001", "file": "https://xeno-canto.org/1001/download", "en": "Great Tit"},
                {"id": 1002, "file": "//www.xeno-canto.org/1002/download"},
                {"id": "1003", "file": "/1003/download"}
            ]
        }"#;

        let metadata = CategoryMetadata::parse(body, &source(), "parus major").unwrap();
        assert_eq!(metadata.num_recordings, 3);
        assert_eq!(metadata.num_species, 1);
        assert!(metadata.ambiguous.is_none());

        let files: Vec<&str> = metadata.recordings.iter().map(|r| r.file.as_str()).collect();
        assert_eq!(
            files,
            vec![
                "https://xeno-canto.org/1001/download",
                "https://www.xeno-canto.org/1002/download",
                "https://www.xeno-canto.org/1003/download",
            ]
        );
        assert_eq!(metadata.recordings[1].id, "1002");
    }

    #[test]
    fn test_entries_without_link_are_dropped() {
        let body = br#"{
            "numRecordings": "5",
            "numSpecies": "1",
            "recordings": [
                {"id": "1", "file": "https://xeno-canto.org/1/download"},
                {"id": "2", "file": ""},
                {"id": "3", "file": "   "},
                {"id": "4", "file": null},
                {"id": "5"}
            ]
        }"#;

        let metadata = CategoryMetadata::parse(body, &source(), "parus major").unwrap();
        assert_eq!(metadata.num_recordings, 5);
        assert_eq!(metadata.recordings.len(), 1);
        assert_eq!(metadata.recordings[0].id, "1");
        assert!(metadata.recordings.iter().all(|r| r.file.query().is_none()));
    }

    #[test]
    fn test_multiple_species_is_flagged() {
        let body = br#"{"numRecordings": 10, "numSpecies": 2, "recordings": []}"#;
        let metadata = CategoryMetadata::parse(body, &source(), "tit").unwrap();

        let ambiguous = metadata.ambiguous.unwrap();
        assert_eq!(ambiguous.num_species, 2);
        assert!(ambiguous.to_string().contains("\"tit\""));
    }

    #[test]
    fn test_malformed_metadata_is_an_error() {
        let err = CategoryMetadata::parse(b"<html>busy</html>", &source(), "q").unwrap_err();
        assert!(matches!(err, CorpusError::Metadata { .. }));

        let err = CategoryMetadata::parse(br#"{"numRecordings": "many", "numSpecies": 1}"#, &source(), "q")
            .unwrap_err();
        assert!(matches!(err, CorpusError::Metadata { .. }));
    }

    #[test]
    fn test_recording_paths_follow_layout() {
        let layout = CorpusLayout::new("data");
        let descriptor = RecordingDescriptor {
            id: "42".to_string(),
            file: Url::parse("https://xeno-canto.org/42/download").unwrap(),
        };
        let recording = Recording::new("blue_tit", &descriptor, &layout, "mp3", "wav");

        assert_eq!(recording.long_path, PathBuf::from("data/blue_tit/long/blue_tit_42_long.mp3"));
        assert_eq!(recording.short_path, PathBuf::from("data/blue_tit/short/blue_tit_42_short.wav"));
    }

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn get(&self, url: &Url) -> Result<HttpResponse> {
            Err(CorpusError::Http {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_colliding_ids_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let layout = CorpusLayout::new(dir.path());
        let downloader = Downloader::new(
            Arc::new(Unreachable),
            Arc::new(RateLimiter::new(1.0).unwrap()),
            Url::parse("https://www.xeno-canto.org/api/2").unwrap(),
        );

        let recordings: Vec<Recording> = ["a.b", "a_b"]
            .iter()
            .map(|id| RecordingDescriptor {
                id: id.to_string(),
                file: Url::parse(&format!("https://xeno-canto.org/{id}/download")).unwrap(),
            })
            .map(|descriptor| Recording::new("wren", &descriptor, &layout, "mp3", "wav"))
            .collect();
        assert_eq!(recordings[0].long_path, recordings[1].long_path);

        let report = downloader.fetch_all(recordings).await;
        assert_eq!(report.fetched, 0);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed.len(), 2);

        let collision = report.failed.iter().find(|f| f.remote_id == "a_b").unwrap();
        assert!(collision.reason.contains("claimed by recording a.b"));
        let offline = report.failed.iter().find(|f| f.remote_id == "a.b").unwrap();
        assert!(offline.reason.contains("offline"));
    }

    #[test]
    fn test_metadata_url_encodes_query() {
        let downloader = Downloader::new(
            Arc::new(Unreachable),
            Arc::new(RateLimiter::new(1.0).unwrap()),
            Url::parse("https://www.xeno-canto.org/api/2").unwrap(),
        );

        let url = downloader.metadata_url("parus major type:song q:A").unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.xeno-canto.org/api/2/recordings?query=parus+major+type%3Asong+q%3AA"
        );

        let trailing = Downloader::new(
            Arc::new(Unreachable),
            Arc::new(RateLimiter::new(1.0).unwrap()),
            Url::parse("https://example.org/api/").unwrap(),
        );
        assert_eq!(
            trailing.metadata_url("x").unwrap().as_str(),
            "https://example.org/api/recordings?query=x"
        );
    }
}
