//! The per-job ingestion pipeline.
//!
//! Drives one claimed job through download, track materialization,
//! metadata matching, upload and library attach, persisting a progress
//! checkpoint at each stage boundary.

use super::models::{checkpoints, job_error_codes, DownloadJob, JobError, JobStatus};
use super::progress::{ProgressEvent, ProgressNotifier};
use super::queue_store::DownloadQueueStore;
use crate::extractor::{ExtractedAudio, ExtractorError, ExtractorProgress, MediaExtractor};
use crate::matcher::{CandidateMetadata, MatchError, MetadataMatcher};
use crate::object_store::{
    identity_hash, ContentAddressedStore, SidecarMetadata, StoreError, UploadSource,
};
use crate::retry::{self, RetryError, RetryPolicy};
use crate::source_validator::SourceRegistry;
use crate::track_store::{LibraryAttach, LibraryStore, NewTrack, Track, TrackStore, VerifiedMetadata};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a job touches. Shared by all workers.
pub struct JobPipeline {
    pub queue: Arc<dyn DownloadQueueStore>,
    pub tracks: Arc<dyn TrackStore>,
    pub library: Arc<dyn LibraryStore>,
    pub extractor: Arc<dyn MediaExtractor>,
    /// `None` when matching is disabled.
    pub matcher: Option<Arc<MetadataMatcher>>,
    pub storage: Arc<ContentAddressedStore>,
    pub sources: Arc<SourceRegistry>,
    pub notifier: ProgressNotifier,
    /// Applied to the extractor's download step.
    pub download_retry: RetryPolicy,
}

fn no_longer_active() -> JobError {
    JobError::new(job_error_codes::CANCELLED, "job is no longer active")
}

fn database_error(e: anyhow::Error) -> JobError {
    JobError::new(job_error_codes::DATABASE_ERROR, e.to_string())
}

impl From<ExtractorError> for JobError {
    fn from(e: ExtractorError) -> Self {
        JobError::new(e.code(), e.to_string())
    }
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Cancelled => no_longer_active(),
            other => JobError::new(job_error_codes::STORAGE_ERROR, other.to_string()),
        }
    }
}

impl From<RetryError<ExtractorError>> for JobError {
    fn from(e: RetryError<ExtractorError>) -> Self {
        match e.into_inner() {
            Some(inner) => inner.into(),
            None => no_longer_active(),
        }
    }
}

impl JobPipeline {
    /// Runs a job that was just claimed (status `downloading`).
    pub async fn run(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
    ) -> Result<Track, JobError> {
        self.publish(ProgressEvent::new(
            job,
            JobStatus::Downloading,
            checkpoints::DOWNLOAD_STARTED,
        ));

        let validation = self.sources.validate(&job.canonical_url);
        if !validation.valid {
            return Err(JobError::new(
                job_error_codes::VALIDATION_ERROR,
                validation
                    .reason
                    .unwrap_or_else(|| "URL is no longer valid".to_string()),
            ));
        }

        let extractor = self.extractor.as_ref();
        let url = job.canonical_url.as_str();
        let on_progress = self.download_progress(job);
        let audio = retry::execute("extractor download", &self.download_retry, cancel, |_| {
            extractor.download(cancel, url, on_progress.clone())
        })
        .await?;

        let result = self.process_download(job, cancel, &audio).await;
        audio.discard();
        result
    }

    async fn process_download(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
        audio: &ExtractedAudio,
    ) -> Result<Track, JobError> {
        let metadata = &audio.metadata;
        self.transition(
            job,
            JobStatus::Downloading,
            JobStatus::Processing,
            checkpoints::DOWNLOADED,
        )?;

        // === Track materialization ===
        let title = [&metadata.track, &metadata.title]
            .into_iter()
            .find(|t| !t.trim().is_empty())
            .cloned()
            .or_else(|| job.page_title.clone())
            .unwrap_or_else(|| job.media_id.clone());
        let artist = metadata.artist.clone();
        let hash = identity_hash(&title, &artist, metadata.duration_ms);

        let (track, created) = self
            .tracks
            .find_or_create(NewTrack {
                identity_hash: hash,
                title: title.clone(),
                artist: artist.clone(),
                album: metadata.album.clone(),
                duration_ms: metadata.duration_ms,
                source_url: job.canonical_url.clone(),
                source_type: job.source_type.as_str().to_string(),
            })
            .map_err(database_error)?;
        self.queue
            .set_track(&job.id, &track.id)
            .map_err(database_error)?;
        debug!(
            "Job {}: track {} ({})",
            job.id,
            track.id,
            if created { "new" } else { "existing" }
        );
        self.checkpoint(
            job,
            JobStatus::Processing,
            checkpoints::TRACK_CREATED,
            Some(&track),
        )?;

        // === Metadata matching (best effort) ===
        self.match_metadata(job, cancel, &track, CandidateMetadata::from(metadata))
            .await;
        if cancel.is_cancelled() {
            return Err(no_longer_active());
        }
        self.checkpoint(job, JobStatus::Processing, checkpoints::MATCHED, Some(&track))?;

        // === Upload ===
        self.transition(
            job,
            JobStatus::Processing,
            JobStatus::Uploading,
            checkpoints::MATCHED,
        )?;
        let sidecar = SidecarMetadata {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            duration_ms: track.duration_ms,
        };
        let upload = self
            .storage
            .upload(cancel, UploadSource::File(audio.path.clone()), &sidecar)
            .await?;
        self.tracks
            .set_storage(
                &track.id,
                &upload.storage_key,
                upload.size.map(|s| s as i64),
                upload.content_type.as_deref(),
            )
            .map_err(database_error)?;
        if !upload.is_new {
            info!("Job {}: audio already stored as {}", job.id, upload.storage_key);
        }

        // === Library attach ===
        match self.library.attach(&job.user_id, &track.id) {
            Ok(LibraryAttach::Added) => debug!("Added {} to library of {}", track.id, job.user_id),
            Ok(LibraryAttach::AlreadyPresent) => {
                debug!("{} already in library of {}", track.id, job.user_id)
            }
            Err(e) => warn!("Job {}: library attach failed: {}", job.id, e),
        }
        self.checkpoint(job, JobStatus::Uploading, checkpoints::ATTACHED, Some(&track))?;

        // === Done ===
        if !self
            .queue
            .mark_completed(&job.id, JobStatus::Uploading)
            .map_err(database_error)?
        {
            return Err(no_longer_active());
        }
        let track = self
            .tracks
            .get_track(&track.id)
            .map_err(database_error)?
            .unwrap_or(track);
        self.publish(
            ProgressEvent::new(job, JobStatus::Completed, checkpoints::DONE)
                .with_track(&track.title, &track.artist),
        );
        Ok(track)
    }

    /// Applies a preselected recording, or runs the matcher. Failures are
    /// logged and leave the track unverified.
    async fn match_metadata(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
        track: &Track,
        candidate: CandidateMetadata,
    ) {
        if let Some(recording_id) = &job.mb_recording_id {
            info!("Job {}: using preselected recording {}", job.id, recording_id);
            if let Err(e) = self
                .tracks
                .apply_verified_metadata(&track.id, &VerifiedMetadata::recording_only(recording_id))
            {
                warn!("Job {}: failed to store preselected recording: {}", job.id, e);
            }
            return;
        }

        if track.mb_verified {
            debug!("Track {} already verified, skipping match", track.id);
            return;
        }

        let Some(matcher) = &self.matcher else {
            return;
        };
        if matcher.is_non_music(&candidate) {
            info!("Job {}: '{}' looks like non-music, skipping match", job.id, candidate.title);
            return;
        }

        let outcome = match matcher.match_track(cancel, &candidate).await {
            Ok(outcome) => outcome,
            Err(MatchError::Cancelled) => return,
            Err(e) => {
                warn!("Job {}: metadata matching failed: {}", job.id, e);
                return;
            }
        };

        if let Err(e) = self.tracks.store_match_outcome(&track.id, &outcome) {
            warn!("Job {}: failed to store match result: {}", job.id, e);
        }
    }

    /// Records the final outcome of a job that did not complete.
    pub fn finish(&self, job: &DownloadJob, result: &Result<Track, JobError>) {
        let error = match result {
            Ok(track) => {
                info!("Job {} completed: track {}", job.id, track.id);
                return;
            }
            Err(e) => e,
        };

        let current = match self.queue.get_job(&job.id) {
            Ok(Some(current)) => current,
            Ok(None) => return,
            Err(e) => {
                error!("Job {}: failed to load job state: {}", job.id, e);
                return;
            }
        };
        if current.status.is_terminal() {
            info!("Job {} ended as {}", job.id, current.status.as_str());
            return;
        }

        // A cancellation that was not a client request means shutdown.
        let error = if error.is_cancelled() {
            JobError::new(job_error_codes::INTERRUPTED, "Job interrupted")
        } else {
            error.clone()
        };
        warn!("Job {} failed: {}", job.id, error);

        match self.queue.mark_failed(&job.id, &error) {
            Ok(true) => self.publish(
                ProgressEvent::new(job, JobStatus::Failed, current.progress)
                    .with_error(error.message.clone()),
            ),
            Ok(false) => {}
            Err(e) => error!("Job {}: failed to record failure: {}", job.id, e),
        }
    }

    fn transition(
        &self,
        job: &DownloadJob,
        from: JobStatus,
        to: JobStatus,
        progress: u8,
    ) -> Result<(), JobError> {
        if !self
            .queue
            .advance(&job.id, from, to, progress)
            .map_err(database_error)?
        {
            return Err(no_longer_active());
        }
        self.publish(ProgressEvent::new(job, to, progress));
        Ok(())
    }

    fn checkpoint(
        &self,
        job: &DownloadJob,
        status: JobStatus,
        progress: u8,
        track: Option<&Track>,
    ) -> Result<(), JobError> {
        if !self
            .queue
            .update_progress(&job.id, status, progress)
            .map_err(database_error)?
        {
            return Err(no_longer_active());
        }
        let mut event = ProgressEvent::new(job, status, progress);
        if let Some(track) = track {
            event = event.with_track(&track.title, &track.artist);
        }
        self.publish(event);
        Ok(())
    }

    fn publish(&self, event: ProgressEvent) {
        self.notifier.publish(event);
    }

    /// Maps extractor progress onto the 5..25 band. Only broadcast, never
    /// persisted, and only when the value goes up.
    fn download_progress(&self, job: &DownloadJob) -> Arc<dyn Fn(ExtractorProgress) + Send + Sync> {
        let notifier = self.notifier.clone();
        let job = job.clone();
        let last = Arc::new(AtomicU8::new(checkpoints::DOWNLOAD_STARTED));
        Arc::new(move |update: ExtractorProgress| {
            let band = (checkpoints::DOWNLOADED - checkpoints::DOWNLOAD_STARTED) as f32;
            let value = checkpoints::DOWNLOAD_STARTED as f32
                + update.percent.clamp(0.0, 100.0) / 100.0 * band;
            let value = (value as u8).min(checkpoints::DOWNLOADED - 1);
            if last.fetch_max(value, Ordering::SeqCst) < value {
                notifier.publish(ProgressEvent::new(&job, JobStatus::Downloading, value));
            }
        })
    }
}
