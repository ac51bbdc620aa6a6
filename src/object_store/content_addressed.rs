use super::{content_type_for_path, ObjectReader, ObjectStore, StoreError};
use crate::retry::{self, RetryPolicy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SIDECAR_CONTENT_TYPE: &str = "application/json";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Fingerprint of a recording: hex SHA-256 of
/// `lower(trim(title)) | lower(trim(artist)) | duration_ms`.
///
/// An unknown duration hashes as 0.
pub fn identity_hash(title: &str, artist: &str, duration_ms: Option<i64>) -> String {
    let input = format!(
        "{}|{}|{}",
        title.trim().to_lowercase(),
        artist.trim().to_lowercase(),
        duration_ms.unwrap_or(0)
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Where the audio bytes come from. Each attempt reopens the source, so
/// failed puts can be retried.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// A local temp file, removed once the object is safely stored.
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl UploadSource {
    async fn open(&self) -> Result<(ObjectReader, Option<u64>), StoreError> {
        match self {
            UploadSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                let size = file.metadata().await?.len();
                Ok((Box::new(file), Some(size)))
            }
            UploadSource::Bytes(bytes) => Ok((
                Box::new(std::io::Cursor::new(bytes.clone())),
                Some(bytes.len() as u64),
            )),
        }
    }

    async fn sniff_content_type(&self) -> Option<String> {
        let head = match self {
            UploadSource::File(path) => {
                let mut file = tokio::fs::File::open(path).await.ok()?;
                let mut buffer = vec![0u8; 8192];
                let n = file.read(&mut buffer).await.ok()?;
                buffer.truncate(n);
                buffer
            }
            UploadSource::Bytes(bytes) => bytes.iter().take(8192).copied().collect(),
        };
        infer::get(&head).map(|kind| kind.mime_type().to_string())
    }
}

/// JSON document stored next to each audio object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarMetadata {
    pub title: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

impl SidecarMetadata {
    pub fn identity_hash(&self) -> String {
        identity_hash(&self.title, &self.artist, self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub storage_key: String,
    pub identity_hash: String,
    /// False when an object already existed and nothing was uploaded.
    pub is_new: bool,
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

/// Deduplicating audio storage keyed by identity hash.
///
/// Layout: `audio/<hash>/audio.<ext>` and `audio/<hash>/metadata.json`.
pub struct ContentAddressedStore {
    store: Arc<dyn ObjectStore>,
    audio_extension: String,
    retry_policy: RetryPolicy,
}

impl ContentAddressedStore {
    pub fn new(store: Arc<dyn ObjectStore>, audio_extension: &str) -> Self {
        Self {
            store,
            audio_extension: audio_extension.trim_start_matches('.').to_string(),
            retry_policy: RetryPolicy::object_store(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn audio_key(&self, identity_hash: &str) -> String {
        format!("audio/{}/audio.{}", identity_hash, self.audio_extension)
    }

    pub fn metadata_key(&self, identity_hash: &str) -> String {
        format!("audio/{}/metadata.json", identity_hash)
    }

    async fn with_retry<T, F, Fut>(
        &self,
        name: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        retry::execute(name, &self.retry_policy, cancel, operation)
            .await
            .map_err(|e| e.into_inner().unwrap_or(StoreError::Cancelled))
    }

    /// True only when both the audio object and its sidecar are stored.
    /// Audio without a sidecar is incomplete and gets uploaded again.
    pub async fn exists(
        &self,
        cancel: &CancellationToken,
        identity_hash: &str,
    ) -> Result<bool, StoreError> {
        let keys = [self.audio_key(identity_hash), self.metadata_key(identity_hash)];
        let store = &self.store;
        self.with_retry("object store exists", cancel, |_| {
            let keys = &keys;
            async move {
                for key in keys {
                    if !store.exists(key).await? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        })
        .await
    }

    /// Stores the audio and its sidecar unless the identity hash is already
    /// present.
    ///
    /// A put that has started always runs to completion. Cancellation is
    /// observed between the two puts, and if the sidecar is then not
    /// written (cancelled or failed) the audio object is deleted again and
    /// the error is returned. A file source is removed after both objects
    /// are stored; failing to remove it is only logged.
    pub async fn upload(
        &self,
        cancel: &CancellationToken,
        source: UploadSource,
        metadata: &SidecarMetadata,
    ) -> Result<UploadResult, StoreError> {
        let hash = metadata.identity_hash();
        let audio_key = self.audio_key(&hash);

        if self.exists(cancel, &hash).await? {
            info!("Audio {} already stored, skipping upload", hash);
            remove_source(&source).await;
            return Ok(UploadResult {
                storage_key: audio_key,
                identity_hash: hash,
                is_new: false,
                size: None,
                content_type: None,
            });
        }

        let content_type = match source.sniff_content_type().await {
            Some(ct) => ct,
            None => content_type_for_path(&audio_key)
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
        };

        let store = &self.store;
        let size = self
            .with_retry("object store put audio", cancel, |_| {
                let (key, ct, source) = (&audio_key, &content_type, &source);
                async move {
                    let (reader, size_hint) = source.open().await?;
                    store.put(key, reader, size_hint, ct).await
                }
            })
            .await?;

        let sidecar = serde_json::to_vec(metadata)?;
        let metadata_key = self.metadata_key(&hash);
        let sidecar_result = self
            .with_retry("object store put metadata", cancel, |_| {
                let (key, body) = (&metadata_key, sidecar.clone());
                async move { store.put_bytes(key, body, SIDECAR_CONTENT_TYPE).await }
            })
            .await;

        if let Err(e) = sidecar_result {
            warn!(
                "Metadata upload for {} failed ({}), removing audio object",
                hash, e
            );
            if let Err(delete_err) = self.store.delete(&audio_key).await {
                warn!("Failed to roll back {}: {}", audio_key, delete_err);
            }
            return Err(e);
        }

        remove_source(&source).await;
        info!("Uploaded {} ({} bytes, {})", audio_key, size, content_type);

        Ok(UploadResult {
            storage_key: audio_key,
            identity_hash: hash,
            is_new: true,
            size: Some(size),
            content_type: Some(content_type),
        })
    }

    /// `<bucket>/<audio key>`.
    pub fn get_url(&self, identity_hash: &str) -> String {
        format!("{}/{}", self.store.bucket(), self.audio_key(identity_hash))
    }

    /// Removes both the audio object and its sidecar.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        identity_hash: &str,
    ) -> Result<(), StoreError> {
        let keys = [self.audio_key(identity_hash), self.metadata_key(identity_hash)];
        let store = &self.store;
        for key in &keys {
            self.with_retry("object store delete", cancel, |_| async move {
                store.delete(key).await
            })
            .await?;
        }
        debug!("Deleted stored audio {}", identity_hash);
        Ok(())
    }
}

async fn remove_source(source: &UploadSource) {
    if let UploadSource::File(path) = source {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove temp file {:?}: {}", path, e);
        }
    }
}
