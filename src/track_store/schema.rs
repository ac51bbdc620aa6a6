//! Database schema for tracks.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

// =============================================================================
// Tracks Table - Version 1
// =============================================================================

const TRACKS_TABLE_V1: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "identity_hash",
            &SqlType::Text,
            non_null = true,
            is_unique = true
        ),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("artist", &SqlType::Text, non_null = true),
        sqlite_column!("album", &SqlType::Text),
        sqlite_column!("duration_ms", &SqlType::Integer),
        sqlite_column!("source_url", &SqlType::Text, non_null = true),
        sqlite_column!("source_type", &SqlType::Text, non_null = true),
        sqlite_column!("storage_key", &SqlType::Text),
        sqlite_column!("file_size", &SqlType::Integer),
        sqlite_column!("content_type", &SqlType::Text),
        sqlite_column!(
            "mb_verified",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("mb_recording_id", &SqlType::Text),
        sqlite_column!("mb_release_id", &SqlType::Text),
        sqlite_column!("mb_artist_id", &SqlType::Text),
        sqlite_column!("mb_suggestions", &SqlType::Text),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_tracks_recording", "mb_recording_id")],
    unique_constraints: &[],
};

/// Library membership, owned by the library service in a full deployment.
const LIBRARY_TRACKS_TABLE_V1: Table = Table {
    name: "library_tracks",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "added_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_library_user", "user_id, added_at")],
    unique_constraints: &[&["user_id", "track_id"]],
};

pub const TRACK_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[TRACKS_TABLE_V1, LIBRARY_TRACKS_TABLE_V1],
    migration: None,
}];
