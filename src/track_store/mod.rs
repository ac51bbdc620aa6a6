//! Track records and library membership.

mod models;
mod schema;
mod store;

pub use models::{LibraryAttach, NewTrack, Track, VerifiedMetadata};
pub use schema::TRACK_VERSIONED_SCHEMAS;
pub use store::{LibraryStore, SqliteTrackStore, TrackStore};
