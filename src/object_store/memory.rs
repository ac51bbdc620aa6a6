use super::{check_key, ObjectInfo, ObjectReader, ObjectStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncReadExt;

struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// [`ObjectStore`] held entirely in memory.
///
/// Puts whose key ends with a configured suffix can be made to fail,
/// which lets callers exercise partial-upload handling.
pub struct InMemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    failing_suffix: Mutex<Option<String>>,
    slow_suffix: Mutex<Option<(String, Duration)>>,
    put_count: Mutex<usize>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(HashMap::new()),
            failing_suffix: Mutex::new(None),
            slow_suffix: Mutex::new(None),
            put_count: Mutex::new(0),
        }
    }

    /// Makes every put whose key ends with `suffix` fail with an IO error.
    pub fn fail_puts_ending_with(&self, suffix: Option<&str>) {
        *self.failing_suffix.lock().unwrap() = suffix.map(str::to_string);
    }

    /// Makes every put whose key ends with `suffix` take `delay` before
    /// the object becomes visible.
    pub fn delay_puts_ending_with(&self, suffix: Option<&str>, delay: Duration) {
        *self.slow_suffix.lock().unwrap() = suffix.map(|s| (s.to_string(), delay));
    }

    /// Sorted list of stored keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of successful puts since creation.
    pub fn put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(
        &self,
        key: &str,
        mut body: ObjectReader,
        size_hint: Option<u64>,
        content_type: &str,
    ) -> Result<u64, StoreError> {
        check_key(key)?;
        let should_fail = self
            .failing_suffix
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|suffix| key.ends_with(suffix));
        if should_fail {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("put of {} rejected", key),
            )));
        }

        let delay = self
            .slow_suffix
            .lock()
            .unwrap()
            .as_ref()
            .filter(|(suffix, _)| key.ends_with(suffix.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut data = Vec::with_capacity(size_hint.unwrap_or(0) as usize);
        body.read_to_end(&mut data).await?;
        let len = data.len() as u64;
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        *self.put_count.lock().unwrap() += 1;
        Ok(len)
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectInfo>, StoreError> {
        check_key(key)?;
        Ok(self.objects.lock().unwrap().get(key).map(|o| ObjectInfo {
            size: o.data.len() as u64,
            content_type: Some(o.content_type.clone()),
        }))
    }

    async fn get_range(
        &self,
        key: &str,
        start: u64,
        len: u64,
    ) -> Result<ObjectReader, StoreError> {
        check_key(key)?;
        let objects = self.objects.lock().unwrap();
        let object = objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let size = object.data.len();
        let start = (start as usize).min(size);
        let end = start.saturating_add(len as usize).min(size);
        Ok(Box::new(std::io::Cursor::new(object.data[start..end].to_vec())))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}
