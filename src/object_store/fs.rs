use super::{check_key, ObjectInfo, ObjectReader, ObjectStore, StoreError};
use async_trait::async_trait;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tracing::debug;

const CONTENT_TYPE_SUFFIX: &str = ".content-type";
const SNIFF_LEN: usize = 8192;
const READ_BUFFER_SIZE: usize = 4096 * 16;

/// [`ObjectStore`] keeping each object as a file under a root directory.
///
/// Writes go to a temp file first and are renamed into place, so readers
/// never observe a partially written object. The content type given to
/// `put` is kept in a companion file next to the object.
pub struct FsObjectStore {
    root: PathBuf,
    bucket: String,
}

impl FsObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let bucket = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        Ok(Self { root, bucket })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.root.join(key))
    }

    fn content_type_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(CONTENT_TYPE_SUFFIX);
        PathBuf::from(name)
    }

    async fn sniff_content_type(path: &Path) -> Result<Option<String>, StoreError> {
        let mut file = File::open(path).await?;
        let mut buffer = vec![0u8; SNIFF_LEN];
        let n = file.read(&mut buffer).await?;
        Ok(infer::get(&buffer[..n]).map(|kind| kind.mime_type().to_string()))
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        mut body: ObjectReader,
        _size_hint: Option<u64>,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        let written = async {
            let mut file = File::create(&tmp_path).await?;
            let written = tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(written)
        }
        .await;

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(e.into());
            }
        };

        fs::write(Self::content_type_path(&path), content_type).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!("Stored {} ({} bytes)", key, written);
        Ok(written)
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, StoreError> {
        let path = self.path_for(key)?;
        let metadata = match fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(None);
        }

        let content_type = match fs::read_to_string(Self::content_type_path(&path)).await {
            Ok(ct) if !ct.trim().is_empty() => Some(ct.trim().to_string()),
            _ => Self::sniff_content_type(&path).await?,
        };

        Ok(Some(ObjectInfo {
            size: metadata.len(),
            content_type,
        }))
    }

    async fn get_range(
        &self,
        key: &str,
        start: u64,
        len: u64,
    ) -> Result<ObjectReader, StoreError> {
        let path = self.path_for(key)?;
        let mut file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        Ok(Box::new(BufReader::with_capacity(
            READ_BUFFER_SIZE,
            file.take(len),
        )))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        remove_if_exists(&path).await?;
        remove_if_exists(&Self::content_type_path(&path)).await?;
        if let Some(parent) = path.parent() {
            if parent != self.root {
                // Only succeeds once the directory is empty.
                let _ = fs::remove_dir(parent).await;
            }
        }
        Ok(())
    }
}
