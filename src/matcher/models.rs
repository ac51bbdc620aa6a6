use super::title_parser::ParsedTitle;
use crate::extractor::MediaMetadata;
use serde::{Deserialize, Serialize};

/// Machine-readable reason a candidate was considered a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    TitleMatch,
    ArtistMatch,
    DurationMatch,
    FeaturedArtist,
}

/// A scored recording from the metadata service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub recording_id: String,
    pub title: String,
    pub artist: String,
    pub artist_id: Option<String>,
    pub album: Option<String>,
    pub album_id: Option<String>,
    pub duration_ms: Option<i64>,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub reasons: Vec<MatchReason>,
}

/// What the matcher knows about a piece of downloaded media.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateMetadata {
    pub title: String,
    pub uploader: Option<String>,
    pub duration_ms: Option<i64>,
    pub description: Option<String>,
}

impl From<&MediaMetadata> for CandidateMetadata {
    fn from(metadata: &MediaMetadata) -> Self {
        CandidateMetadata {
            title: metadata.title.clone(),
            uploader: metadata
                .uploader
                .clone()
                .or_else(|| metadata.channel.clone()),
            duration_ms: metadata.duration_ms,
            description: metadata.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub verified: bool,
    pub best_match: Option<MatchCandidate>,
    /// Empty when `verified` is true.
    pub suggestions: Vec<MatchCandidate>,
    pub parsed: ParsedTitle,
}

impl MatchOutcome {
    pub fn unmatched(parsed: ParsedTitle) -> Self {
        MatchOutcome {
            verified: false,
            best_match: None,
            suggestions: Vec::new(),
            parsed,
        }
    }
}
