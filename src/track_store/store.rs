use super::models::{LibraryAttach, NewTrack, Track, VerifiedMetadata};
use super::schema::TRACK_VERSIONED_SCHEMAS;
use crate::matcher::{MatchCandidate, MatchOutcome};
use crate::sqlite_persistence::open_versioned_db;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub trait TrackStore: Send + Sync {
    /// Inserts the track unless one with the same identity hash exists.
    /// Returns the stored row and whether it was created by this call.
    fn find_or_create(&self, track: NewTrack) -> Result<(Track, bool)>;

    fn get_track(&self, id: &str) -> Result<Option<Track>>;

    fn get_by_identity_hash(&self, identity_hash: &str) -> Result<Option<Track>>;

    fn set_storage(
        &self,
        id: &str,
        storage_key: &str,
        file_size: Option<i64>,
        content_type: Option<&str>,
    ) -> Result<()>;

    /// Marks the track verified, overwriting the provided fields and
    /// clearing suggestions.
    fn apply_verified_metadata(&self, id: &str, metadata: &VerifiedMetadata) -> Result<()>;

    /// Stores ranked suggestions, leaving the track unverified.
    fn set_suggestions(&self, id: &str, suggestions: &[MatchCandidate]) -> Result<()>;

    /// Persists a matcher result: the verified best match, otherwise the
    /// suggestions. An outcome with neither leaves the track untouched.
    fn store_match_outcome(&self, id: &str, outcome: &MatchOutcome) -> Result<()> {
        match (&outcome.best_match, outcome.verified) {
            (Some(best), true) => {
                self.apply_verified_metadata(id, &VerifiedMetadata::from_candidate(best))
            }
            _ if !outcome.suggestions.is_empty() => self.set_suggestions(id, &outcome.suggestions),
            _ => Ok(()),
        }
    }
}

/// The library collaborator. Attaching is idempotent.
pub trait LibraryStore: Send + Sync {
    fn attach(&self, user_id: &str, track_id: &str) -> Result<LibraryAttach>;

    fn library_contains(&self, user_id: &str, track_id: &str) -> Result<bool>;
}

pub struct SqliteTrackStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTrackStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, TRACK_VERSIONED_SCHEMAS, "tracks")?;
        Ok(SqliteTrackStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        TRACK_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(SqliteTrackStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<Track> {
        let suggestions: Option<String> = row.get("mb_suggestions")?;
        Ok(Track {
            id: row.get("id")?,
            identity_hash: row.get("identity_hash")?,
            title: row.get("title")?,
            artist: row.get("artist")?,
            album: row.get("album")?,
            duration_ms: row.get("duration_ms")?,
            source_url: row.get("source_url")?,
            source_type: row.get("source_type")?,
            storage_key: row.get("storage_key")?,
            file_size: row.get("file_size")?,
            content_type: row.get("content_type")?,
            mb_verified: row.get::<_, i64>("mb_verified")? != 0,
            mb_recording_id: row.get("mb_recording_id")?,
            mb_release_id: row.get("mb_release_id")?,
            mb_artist_id: row.get("mb_artist_id")?,
            mb_suggestions: suggestions.and_then(|s| serde_json::from_str(&s).ok()),
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn query_track(conn: &Connection, column: &str, value: &str) -> Result<Option<Track>> {
        let mut stmt = conn.prepare(&format!("SELECT * FROM tracks WHERE {} = ?1", column))?;
        Ok(stmt.query_row([value], Self::row_to_track).optional()?)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl TrackStore for SqliteTrackStore {
    fn find_or_create(&self, track: NewTrack) -> Result<(Track, bool)> {
        let conn = self.conn.lock().unwrap();
        let now = Self::now();
        let inserted = conn.execute(
            r#"INSERT INTO tracks (
                id, identity_hash, title, artist, album, duration_ms,
                source_url, source_type, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
            ON CONFLICT(identity_hash) DO NOTHING"#,
            params![
                uuid::Uuid::new_v4().to_string(),
                track.identity_hash,
                track.title,
                track.artist,
                track.album,
                track.duration_ms,
                track.source_url,
                track.source_type,
                now,
            ],
        )?;
        let stored = Self::query_track(&conn, "identity_hash", &track.identity_hash)?
            .context("Track missing after insert")?;
        Ok((stored, inserted == 1))
    }

    fn get_track(&self, id: &str) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        Self::query_track(&conn, "id", id)
    }

    fn get_by_identity_hash(&self, identity_hash: &str) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        Self::query_track(&conn, "identity_hash", identity_hash)
    }

    fn set_storage(
        &self,
        id: &str,
        storage_key: &str,
        file_size: Option<i64>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE tracks SET
                storage_key = ?2,
                file_size = COALESCE(?3, file_size),
                content_type = COALESCE(?4, content_type),
                updated_at = ?5
            WHERE id = ?1"#,
            params![id, storage_key, file_size, content_type, Self::now()],
        )?;
        Ok(())
    }

    fn apply_verified_metadata(&self, id: &str, metadata: &VerifiedMetadata) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE tracks SET
                title = COALESCE(?2, title),
                artist = COALESCE(?3, artist),
                album = COALESCE(?4, album),
                mb_recording_id = ?5,
                mb_release_id = COALESCE(?6, mb_release_id),
                mb_artist_id = COALESCE(?7, mb_artist_id),
                mb_verified = 1,
                mb_suggestions = NULL,
                updated_at = ?8
            WHERE id = ?1"#,
            params![
                id,
                metadata.title,
                metadata.artist,
                metadata.album,
                metadata.recording_id,
                metadata.release_id,
                metadata.artist_id,
                Self::now(),
            ],
        )?;
        Ok(())
    }

    fn set_suggestions(&self, id: &str, suggestions: &[MatchCandidate]) -> Result<()> {
        let json = if suggestions.is_empty() {
            None
        } else {
            Some(serde_json::to_string(suggestions)?)
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET mb_suggestions = ?2, mb_verified = 0, updated_at = ?3 WHERE id = ?1",
            params![id, json, Self::now()],
        )?;
        Ok(())
    }
}

impl LibraryStore for SqliteTrackStore {
    fn attach(&self, user_id: &str, track_id: &str) -> Result<LibraryAttach> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO library_tracks (user_id, track_id, added_at) VALUES (?1, ?2, ?3)",
            params![user_id, track_id, Self::now()],
        )?;
        Ok(if inserted == 1 {
            LibraryAttach::Added
        } else {
            LibraryAttach::AlreadyPresent
        })
    }

    fn library_contains(&self, user_id: &str, track_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM library_tracks WHERE user_id = ?1 AND track_id = ?2",
                params![user_id, track_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
