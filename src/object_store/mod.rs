//! Object storage for audio blobs and their metadata sidecars.

mod content_addressed;
mod fs;
mod memory;

pub use content_addressed::{
    identity_hash, ContentAddressedStore, SidecarMetadata, UploadResult, UploadSource,
};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;

use crate::retry::Retryable;
use async_trait::async_trait;
use std::io::ErrorKind;
use thiserror::Error;
use tokio::io::AsyncRead;

pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store operation cancelled")]
    Cancelled,
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Io(e) => matches!(
                e.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: u64,
    pub content_type: Option<String>,
}

/// A flat key/value blob store.
///
/// Keys are `/`-separated relative paths such as `audio/<hash>/audio.mp3`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket (or root) the keys live in.
    fn bucket(&self) -> &str;

    /// Writes `body` under `key`, replacing any existing object.
    /// Returns the number of bytes written.
    async fn put(
        &self,
        key: &str,
        body: ObjectReader,
        size_hint: Option<u64>,
        content_type: &str,
    ) -> Result<u64, StoreError>;

    /// Size and content type, `None` when the object does not exist.
    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, StoreError>;

    /// Reader over `len` bytes starting at `start`.
    async fn get_range(&self, key: &str, start: u64, len: u64)
        -> Result<ObjectReader, StoreError>;

    /// Removes the object. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.stat(key).await?.is_some())
    }

    async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        let len = bytes.len() as u64;
        self.put(key, Box::new(std::io::Cursor::new(bytes)), Some(len), content_type)
            .await
    }
}

/// Rejects empty, absolute and parent-relative keys.
pub(crate) fn check_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|s| s.is_empty() || s == "." || s == "..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Audio content type from a file name's extension.
pub fn content_type_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let content_type = match ext.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" | "mp4" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" | "oga" | "opus" => "audio/ogg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "webm" => "audio/webm",
        "json" => "application/json",
        _ => return None,
    };
    Some(content_type)
}
