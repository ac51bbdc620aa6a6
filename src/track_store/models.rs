use crate::matcher::MatchCandidate;
use serde::Serialize;

/// One distinct recording, shared by every user who ingested it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: String,
    pub identity_hash: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: Option<i64>,
    pub source_url: String,
    pub source_type: String,
    /// Set once the audio is in the object store.
    pub storage_key: Option<String>,
    pub file_size: Option<i64>,
    pub content_type: Option<String>,
    pub mb_verified: bool,
    pub mb_recording_id: Option<String>,
    pub mb_release_id: Option<String>,
    pub mb_artist_id: Option<String>,
    pub mb_suggestions: Option<Vec<MatchCandidate>>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields needed to materialize a track row.
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub identity_hash: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: Option<i64>,
    pub source_url: String,
    pub source_type: String,
}

/// Metadata accepted from the metadata service.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedMetadata {
    pub recording_id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub release_id: Option<String>,
    pub artist_id: Option<String>,
}

impl VerifiedMetadata {
    pub fn from_candidate(candidate: &MatchCandidate) -> Self {
        Self {
            recording_id: candidate.recording_id.clone(),
            title: Some(candidate.title.clone()),
            artist: Some(candidate.artist.clone()),
            album: candidate.album.clone(),
            release_id: candidate.album_id.clone(),
            artist_id: candidate.artist_id.clone(),
        }
    }

    /// Only the recording id is known, other fields are left as they are.
    pub fn recording_only(recording_id: &str) -> Self {
        Self {
            recording_id: recording_id.to_string(),
            title: None,
            artist: None,
            album: None,
            release_id: None,
            artist_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryAttach {
    Added,
    AlreadyPresent,
}
