//! Matches downloaded media against MusicBrainz recordings.

use super::models::{CandidateMetadata, MatchCandidate, MatchOutcome, MatchReason};
use super::musicbrainz::{MetadataSearch, MusicBrainzError, RecordingHit, RecordingQuery};
use super::similarity::{calculate_score, MatchScore, ScoreWeights};
use super::title_parser::{clean_artist, parse_title};
use crate::config::MatcherSettings;
use crate::retry::{self, RetryError, RetryPolicy};
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const REASON_THRESHOLD: f64 = 80.0;
const DURATION_REASON_THRESHOLD: f64 = 90.0;

const NON_MUSIC_KEYWORDS: &[&str] = &[
    "podcast",
    "interview",
    "tutorial",
    "review",
    "unboxing",
    "vlog",
    "gameplay",
    "lets play",
    "stream",
    "reaction",
    "commentary",
    "news",
    "lecture",
    "audiobook",
    "asmr",
];

lazy_static::lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{N}]+").unwrap();
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("metadata search cancelled")]
    Cancelled,

    #[error("metadata search failed: {0}")]
    Search(MusicBrainzError),
}

impl From<RetryError<MusicBrainzError>> for MatchError {
    fn from(err: RetryError<MusicBrainzError>) -> Self {
        match err.into_inner() {
            Some(e) => MatchError::Search(e),
            None => MatchError::Cancelled,
        }
    }
}

pub struct MetadataMatcher {
    search: Arc<dyn MetadataSearch>,
    settings: MatcherSettings,
    weights: ScoreWeights,
    retry_policy: RetryPolicy,
}

impl MetadataMatcher {
    pub fn new(search: Arc<dyn MetadataSearch>, settings: MatcherSettings) -> Self {
        Self {
            search,
            settings,
            weights: ScoreWeights::default(),
            retry_policy: RetryPolicy::metadata_service(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    /// Cheap pre-filter run before any network call. Looks for spoken-word
    /// keywords in the title and the first line of the description, and
    /// for durations longer than anything that is likely a song.
    pub fn is_non_music(&self, metadata: &CandidateMetadata) -> bool {
        let max_ms = self.settings.max_music_duration_secs as i64 * 1000;
        if metadata.duration_ms.is_some_and(|d| d > max_ms) {
            return true;
        }

        if contains_keyword(&metadata.title) {
            return true;
        }
        metadata
            .description
            .as_deref()
            .and_then(|d| d.lines().find(|l| !l.trim().is_empty()))
            .is_some_and(contains_keyword)
    }

    /// Searches the metadata service and ranks the results.
    ///
    /// A top candidate at or above the auto-match threshold yields a
    /// verified outcome with no suggestions; otherwise the best
    /// `max_suggestions` candidates are returned as suggestions.
    pub async fn match_track(
        &self,
        cancel: &CancellationToken,
        metadata: &CandidateMetadata,
    ) -> Result<MatchOutcome, MatchError> {
        let parsed = parse_title(&metadata.title);
        let artist = if parsed.artist.is_empty() {
            metadata
                .uploader
                .as_deref()
                .map(clean_artist)
                .unwrap_or_default()
        } else {
            parsed.artist.clone()
        };

        if parsed.track.is_empty() {
            debug!("No track name parsed from '{}', skipping search", metadata.title);
            return Ok(MatchOutcome::unmatched(parsed));
        }

        let query = RecordingQuery {
            track: parsed.track.clone(),
            artist: (!artist.is_empty()).then(|| artist.clone()),
        };
        let limit = self.settings.search_limit;
        let search = self.search.clone();
        let hits = retry::execute(
            "musicbrainz search",
            &self.retry_policy,
            cancel,
            |_| {
                let search = search.clone();
                let query = query.clone();
                async move { search.search_recordings(&query, limit).await }
            },
        )
        .await?;

        let mut candidates: Vec<MatchCandidate> = hits
            .iter()
            .map(|hit| {
                let score = calculate_score(
                    &artist,
                    &parsed.track,
                    &parsed.featuring,
                    metadata.duration_ms,
                    &hit.artist,
                    &hit.artist_credit,
                    &hit.title,
                    hit.duration_ms,
                    &self.weights,
                );
                to_candidate(hit, &score)
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let Some(best) = candidates.first().cloned() else {
            info!("No MusicBrainz results for '{}'", metadata.title);
            return Ok(MatchOutcome::unmatched(parsed));
        };

        let verified = best.confidence * 100.0 >= self.settings.auto_match_threshold;
        info!(
            "Best match for '{}': {} - {} ({:.2}, verified: {})",
            metadata.title, best.artist, best.title, best.confidence, verified
        );

        let suggestions = if verified {
            Vec::new()
        } else {
            candidates.truncate(self.settings.max_suggestions);
            candidates
        };

        Ok(MatchOutcome {
            verified,
            best_match: Some(best),
            suggestions,
            parsed,
        })
    }
}

fn to_candidate(hit: &RecordingHit, score: &MatchScore) -> MatchCandidate {
    let mut reasons = Vec::new();
    if score.track >= REASON_THRESHOLD {
        reasons.push(MatchReason::TitleMatch);
    }
    if score.artist >= REASON_THRESHOLD {
        reasons.push(MatchReason::ArtistMatch);
    }
    if score.duration >= DURATION_REASON_THRESHOLD {
        reasons.push(MatchReason::DurationMatch);
    }
    if score.featuring > 0.0 {
        reasons.push(MatchReason::FeaturedArtist);
    }

    MatchCandidate {
        recording_id: hit.recording_id.clone(),
        title: hit.title.clone(),
        artist: hit.artist.clone(),
        artist_id: hit.artist_id.clone(),
        album: hit.album.clone(),
        album_id: hit.release_id.clone(),
        duration_ms: hit.duration_ms,
        confidence: (score.overall * 10.0).round() / 1000.0,
        reasons,
    }
}

fn contains_keyword(text: &str) -> bool {
    let lowered = text.to_lowercase().replace(['\'', '’'], "");
    let words = NON_WORD.replace_all(&lowered, " ");
    let padded = format!(" {} ", words.trim());
    NON_MUSIC_KEYWORDS
        .iter()
        .any(|keyword| padded.contains(&format!(" {} ", keyword)))
}
