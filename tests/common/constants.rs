//! Shared constants for end-to-end tests
//!
//! When test data changes (URLs, users, fake metadata), update only this file.

#![allow(dead_code)]

// ============================================================================
// Test Users
// ============================================================================

/// Sent as `X-User-Id` by most tests
pub const TEST_USER: &str = "alice";

/// A second user, to check per-user visibility
pub const OTHER_USER: &str = "bob";

// ============================================================================
// Source URLs
// ============================================================================

pub const YOUTUBE_VIDEO_1_ID: &str = "dQw4w9WgXcQ";
pub const YOUTUBE_URL_1: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const YOUTUBE_SHORT_URL_1: &str = "https://youtu.be/dQw4w9WgXcQ";

pub const YOUTUBE_VIDEO_2_ID: &str = "9bZkp7q19f0";
pub const YOUTUBE_URL_2: &str = "https://www.youtube.com/watch?v=9bZkp7q19f0";

pub const YOUTUBE_PLAYLIST_URL: &str =
    "https://www.youtube.com/playlist?list=PLFgquLnL59alCl_2TQvOiD5Vgm1hCaGSI";

pub const SOUNDCLOUD_TRACK_URL: &str = "https://soundcloud.com/daftpunkofficialmusic/get-lucky";

pub const UNSUPPORTED_URL: &str = "https://example.com/some/song.mp3";

// ============================================================================
// Fake extractor output
// ============================================================================

pub const FAKE_ARTIST: &str = "Daft Punk";
pub const FAKE_TRACK_TITLE: &str = "Get Lucky";
pub const FAKE_DURATION_MS: i64 = 248_000;

/// Size of the audio file the fake extractor writes (bytes)
pub const TEST_AUDIO_SIZE_BYTES: usize = 8192;

/// MusicBrainz recording returned by the scripted search
pub const MB_RECORDING_ID: &str = "6a1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Maximum time to wait for a job to reach a given status (milliseconds)
pub const JOB_SETTLE_TIMEOUT_MS: u64 = 5000;

/// How often workers poll the queue in tests (milliseconds)
pub const WORKER_POLL_MS: u64 = 20;
