//! MusicBrainz recording search.
//!
//! Rate limited to 1 request per 1.1 seconds per MusicBrainz API policy.

use crate::retry::{is_retryable_status, Retryable};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub const MUSICBRAINZ_API_BASE: &str = "https://musicbrainz.org/ws/2";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum MusicBrainzError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("MusicBrainz returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to parse MusicBrainz response: {0}")]
    Parse(String),

    #[error("MusicBrainz request cancelled")]
    Cancelled,
}

impl Retryable for MusicBrainzError {
    fn is_retryable(&self) -> bool {
        match self {
            MusicBrainzError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            MusicBrainzError::Status { status, .. } => is_retryable_status(*status),
            MusicBrainzError::Parse(_) | MusicBrainzError::Cancelled => false,
        }
    }
}

/// One search hit, flattened to what the matcher needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingHit {
    pub recording_id: String,
    /// Search relevance reported by MusicBrainz, 0-100.
    pub score: u8,
    pub title: String,
    /// Name of the first credited artist.
    pub artist: String,
    pub artist_id: Option<String>,
    /// Full credit including join phrases ("A feat. B").
    pub artist_credit: String,
    pub duration_ms: Option<i64>,
    pub album: Option<String>,
    pub release_id: Option<String>,
    pub release_group_id: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingQuery {
    pub track: String,
    pub artist: Option<String>,
}

impl RecordingQuery {
    /// Lucene query: `recording:"T" AND artist:"A"`.
    pub fn to_lucene(&self) -> String {
        let quote = |s: &str| s.replace(['"', '\\'], " ").trim().to_string();
        match self.artist.as_deref().filter(|a| !a.trim().is_empty()) {
            Some(artist) => format!(
                "recording:\"{}\" AND artist:\"{}\"",
                quote(&self.track),
                quote(artist)
            ),
            None => format!("recording:\"{}\"", quote(&self.track)),
        }
    }
}

/// Source of candidate recordings.
#[async_trait]
pub trait MetadataSearch: Send + Sync {
    async fn search_recordings(
        &self,
        query: &RecordingQuery,
        limit: usize,
    ) -> Result<Vec<RecordingHit>, MusicBrainzError>;
}

#[derive(Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

#[derive(Deserialize)]
struct MbRecording {
    id: String,
    #[serde(default)]
    score: u8,
    title: String,
    length: Option<i64>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    releases: Vec<MbRelease>,
}

#[derive(Deserialize)]
struct MbArtistCredit {
    name: String,
    artist: Option<MbArtistRef>,
    #[serde(default)]
    joinphrase: String,
}

#[derive(Deserialize)]
struct MbArtistRef {
    id: String,
}

#[derive(Deserialize)]
struct MbRelease {
    id: String,
    title: String,
    date: Option<String>,
    #[serde(rename = "release-group")]
    release_group: Option<MbReleaseGroup>,
}

#[derive(Deserialize)]
struct MbReleaseGroup {
    id: String,
}

impl From<MbRecording> for RecordingHit {
    fn from(rec: MbRecording) -> Self {
        let first_credit = rec.artist_credit.first();
        let artist_credit = rec
            .artist_credit
            .iter()
            .map(|c| format!("{}{}", c.name, c.joinphrase))
            .collect::<String>();
        let release = rec.releases.first();
        RecordingHit {
            recording_id: rec.id.clone(),
            score: rec.score,
            title: rec.title.clone(),
            artist: first_credit.map(|c| c.name.clone()).unwrap_or_default(),
            artist_id: first_credit.and_then(|c| c.artist.as_ref().map(|a| a.id.clone())),
            artist_credit,
            duration_ms: rec.length.filter(|l| *l > 0),
            album: release.map(|r| r.title.clone()),
            release_id: release.map(|r| r.id.clone()),
            release_group_id: release.and_then(|r| r.release_group.as_ref().map(|g| g.id.clone())),
            release_date: release.and_then(|r| r.date.clone()),
        }
    }
}

pub struct MusicBrainzClient {
    client: Client,
    base_url: String,
    rate_limit_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl MusicBrainzClient {
    pub fn new(user_agent: &str, base_url: &str) -> Result<Self, MusicBrainzError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limit_interval: RATE_LIMIT_INTERVAL,
            last_request: Mutex::new(None),
        })
    }

    pub fn with_rate_limit_interval(mut self, interval: Duration) -> Self {
        self.rate_limit_interval = interval;
        self
    }

    /// Waits until the next request slot. The lock is held while sleeping
    /// so concurrent callers queue up behind each other.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.rate_limit_interval {
                let wait = self.rate_limit_interval - elapsed;
                debug!("MusicBrainz rate limit: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn search_url(&self, query: &RecordingQuery, limit: usize) -> String {
        format!(
            "{}/recording?query={}&limit={}&fmt=json",
            self.base_url,
            urlencoding::encode(&query.to_lucene()),
            limit.clamp(1, MAX_LIMIT)
        )
    }
}

#[async_trait]
impl MetadataSearch for MusicBrainzClient {
    async fn search_recordings(
        &self,
        query: &RecordingQuery,
        limit: usize,
    ) -> Result<Vec<RecordingHit>, MusicBrainzError> {
        self.rate_limit().await;

        let url = self.search_url(query, limit);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MusicBrainzError::Status {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: RecordingSearchResponse = response
            .json()
            .await
            .map_err(|e| MusicBrainzError::Parse(e.to_string()))?;
        Ok(body.recordings.into_iter().map(RecordingHit::from).collect())
    }
}
