//! In-process fakes for the extractor and the metadata service.

use crate::extractor::{
    ExtractedAudio, ExtractorError, ExtractorProgress, ExtractorStage, MediaExtractor,
    MediaMetadata, ProgressCallback,
};
use crate::matcher::{MetadataSearch, MusicBrainzError, RecordingHit, RecordingQuery};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

type ErrorFactory = Box<dyn Fn() -> ExtractorError + Send + Sync>;

/// Writes a small fake audio file named after the media id, in a fresh
/// scratch directory per call, and reports "Daft Punk - Get Lucky"
/// metadata for every URL.
pub struct FakeExtractor {
    temp_dir: PathBuf,
    failure: Mutex<Option<ErrorFactory>>,
    downloads: Mutex<usize>,
}

impl FakeExtractor {
    pub fn new(temp_dir: &Path) -> Self {
        Self {
            temp_dir: temp_dir.to_path_buf(),
            failure: Mutex::new(None),
            downloads: Mutex::new(0),
        }
    }

    pub fn download_calls(&self) -> usize {
        *self.downloads.lock().unwrap()
    }

    pub fn fail_with(&self, factory: impl Fn() -> ExtractorError + Send + Sync + 'static) {
        *self.failure.lock().unwrap() = Some(Box::new(factory));
    }

    pub fn leftover_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.temp_dir)
            .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
            .unwrap_or_default()
    }

    fn media_id(url: &str) -> String {
        url.rsplit(['=', '/']).next().unwrap_or("media").to_string()
    }

    fn metadata(id: &str) -> MediaMetadata {
        MediaMetadata {
            id: id.to_string(),
            title: "Daft Punk - Get Lucky (Official Video)".to_string(),
            artist: "Daft Punk".to_string(),
            track: "Get Lucky".to_string(),
            uploader: Some("DaftPunkVEVO".to_string()),
            duration_ms: Some(248_000),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaExtractor for FakeExtractor {
    async fn download(
        &self,
        cancel: &CancellationToken,
        url: &str,
        on_progress: ProgressCallback,
    ) -> Result<ExtractedAudio, ExtractorError> {
        if cancel.is_cancelled() {
            return Err(ExtractorError::Cancelled);
        }
        *self.downloads.lock().unwrap() += 1;
        let failure = self.failure.lock().unwrap().as_ref().map(|factory| factory());
        if let Some(err) = failure {
            return Err(err);
        }

        let id = Self::media_id(url);
        for percent in [50.0, 100.0] {
            on_progress(ExtractorProgress {
                percent,
                stage: ExtractorStage::Downloading,
            });
        }
        let workdir = tempfile::TempDir::new_in(&self.temp_dir)?;
        let audio = ExtractedAudio::in_workdir(workdir, &format!("{}.mp3", id), Self::metadata(&id));
        tokio::fs::write(&audio.path, format!("ID3 fake audio for {}", id)).await?;
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

#[derive(Default)]
pub struct FakeSearch {
    hits: Mutex<Vec<RecordingHit>>,
    failure: Mutex<Option<(u16, String)>>,
    calls: Mutex<usize>,
}

impl FakeSearch {
    pub fn hit(id: &str, artist: &str, title: &str, duration_ms: i64) -> RecordingHit {
        RecordingHit {
            recording_id: id.to_string(),
            score: 100,
            title: title.to_string(),
            artist: artist.to_string(),
            artist_id: Some(format!("{}-artist", id)),
            artist_credit: artist.to_string(),
            duration_ms: Some(duration_ms),
            album: Some("Random Access Memories".to_string()),
            release_id: Some(format!("{}-release", id)),
            release_group_id: None,
            release_date: None,
        }
    }

    pub fn set_hits(&self, hits: Vec<RecordingHit>) {
        *self.hits.lock().unwrap() = hits;
    }

    /// Only status errors are supported, since they are the only kind
    /// that can be rebuilt for every call.
    pub fn fail_with(&self, error: MusicBrainzError) {
        if let MusicBrainzError::Status { status, message } = error {
            *self.failure.lock().unwrap() = Some((status, message));
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl MetadataSearch for FakeSearch {
    async fn search_recordings(
        &self,
        _query: &RecordingQuery,
        _limit: usize,
    ) -> Result<Vec<RecordingHit>, MusicBrainzError> {
        *self.calls.lock().unwrap() += 1;
        let failure = self.failure.lock().unwrap().clone();
        match failure {
            Some((status, message)) => Err(MusicBrainzError::Status { status, message }),
            None => Ok(self.hits.lock().unwrap().clone()),
        }
    }
}
