//! Metadata Matcher: parses media titles, searches MusicBrainz and scores
//! candidate recordings.

mod metadata_matcher;
mod models;
pub mod musicbrainz;
pub mod similarity;
pub mod title_parser;

pub use metadata_matcher::{MatchError, MetadataMatcher};
pub use models::{CandidateMetadata, MatchCandidate, MatchOutcome, MatchReason};
pub use musicbrainz::{
    MetadataSearch, MusicBrainzClient, MusicBrainzError, RecordingHit, RecordingQuery,
    MUSICBRAINZ_API_BASE,
};
pub use title_parser::{parse_title, ParsedTitle};
