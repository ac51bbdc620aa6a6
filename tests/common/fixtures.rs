//! In-process stand-ins for yt-dlp and MusicBrainz
//!
//! The server under test is wired with these instead of the real
//! subprocess and HTTP clients, so tests never touch the network.

#![allow(dead_code)]

use super::constants::*;
use async_trait::async_trait;
use pezzottify_ingest_server::extractor::{
    classify_failure, ExtractedAudio, ExtractorError, ExtractorProgress, ExtractorStage,
    MediaExtractor, MediaMetadata, ProgressCallback,
};
use pezzottify_ingest_server::matcher::{
    MetadataSearch, MusicBrainzError, RecordingHit, RecordingQuery,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Deterministic fake MP3 payload: an ID3 header followed by a byte ramp,
/// so range responses can be checked against exact offsets.
pub fn fake_audio_bytes() -> Vec<u8> {
    let mut bytes = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    let mut i = 0u32;
    while bytes.len() < TEST_AUDIO_SIZE_BYTES {
        bytes.push((i % 251) as u8);
        i += 1;
    }
    bytes
}

/// Extractor that writes [`fake_audio_bytes`] into the temp directory and
/// reports "Daft Punk - Get Lucky" for every URL.
pub struct ScriptedExtractor {
    temp_dir: PathBuf,
    /// When set, downloads park until their job is cancelled.
    hold_downloads: AtomicBool,
    failure: Mutex<Option<String>>,
    downloads: AtomicUsize,
    started: Notify,
}

impl ScriptedExtractor {
    pub fn new(temp_dir: PathBuf) -> Self {
        Self {
            temp_dir,
            hold_downloads: AtomicBool::new(false),
            failure: Mutex::new(None),
            downloads: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }

    pub fn hold_downloads(&self) {
        self.hold_downloads.store(true, Ordering::SeqCst);
    }

    /// Every following download fails with this yt-dlp stderr.
    pub fn fail_with_stderr(&self, stderr: &str) {
        *self.failure.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn download_calls(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Resolves once a download has started.
    pub async fn download_started(&self) {
        self.started.notified().await
    }

    fn media_id(url: &str) -> String {
        url.rsplit(['=', '/']).next().unwrap_or("media").to_string()
    }

    fn metadata(id: &str) -> MediaMetadata {
        MediaMetadata {
            id: id.to_string(),
            title: format!("{} - {} (Official Video)", FAKE_ARTIST, FAKE_TRACK_TITLE),
            artist: FAKE_ARTIST.to_string(),
            track: FAKE_TRACK_TITLE.to_string(),
            uploader: Some("DaftPunkVEVO".to_string()),
            duration_ms: Some(FAKE_DURATION_MS),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaExtractor for ScriptedExtractor {
    async fn download(
        &self,
        cancel: &CancellationToken,
        url: &str,
        on_progress: ProgressCallback,
    ) -> Result<ExtractedAudio, ExtractorError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        if self.hold_downloads.load(Ordering::SeqCst) {
            on_progress(ExtractorProgress {
                percent: 10.0,
                stage: ExtractorStage::Downloading,
            });
            cancel.cancelled().await;
            return Err(ExtractorError::Cancelled);
        }

        let failure = self.failure.lock().unwrap().clone();
        if let Some(stderr) = failure {
            return Err(classify_failure(&stderr));
        }

        let id = Self::media_id(url);
        for percent in [25.0, 75.0, 100.0] {
            on_progress(ExtractorProgress {
                percent,
                stage: ExtractorStage::Downloading,
            });
        }
        let workdir = tempfile::TempDir::new_in(&self.temp_dir)?;
        let audio = ExtractedAudio::in_workdir(workdir, &format!("{}.mp3", id), Self::metadata(&id));
        tokio::fs::write(&audio.path, fake_audio_bytes()).await?;
        Ok(audio)
    }

    async fn get_metadata(
        &self,
        _cancel: &CancellationToken,
        url: &str,
    ) -> Result<MediaMetadata, ExtractorError> {
        Ok(Self::metadata(&Self::media_id(url)))
    }
}

/// Metadata search that answers every query with one exact hit.
#[derive(Default)]
pub struct ScriptedSearch {
    calls: AtomicUsize,
}

impl ScriptedSearch {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSearch for ScriptedSearch {
    async fn search_recordings(
        &self,
        _query: &RecordingQuery,
        _limit: usize,
    ) -> Result<Vec<RecordingHit>, MusicBrainzError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RecordingHit {
            recording_id: MB_RECORDING_ID.to_string(),
            score: 100,
            title: FAKE_TRACK_TITLE.to_string(),
            artist: FAKE_ARTIST.to_string(),
            artist_id: Some("056e4f3e-d505-4dad-8ec1-d04f521cbb56".to_string()),
            artist_credit: FAKE_ARTIST.to_string(),
            duration_ms: Some(FAKE_DURATION_MS),
            album: Some("Random Access Memories".to_string()),
            release_id: Some("1b3c5d7e-9f1a-4b2c-8d3e-5f7a9b1c3d5e".to_string()),
            release_group_id: None,
            release_date: None,
        }])
    }
}
