use std::collections::HashMap;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::{ObjectStore, StorageError, UploadOptions, UploadOutput};

/// How a [`MemoryBackend`] answers uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    #[default]
    None,
    /// Every upload fails as a plain request failure.
    SingleShot,
    /// Every upload fails as an aborted multipart transfer.
    Multipart,
}

struct StoredObject {
    data: Vec<u8>,
    options: UploadOptions,
}

/// In-memory object store. Thread-safe via Mutex.
///
/// Drains every upload body (so producers feeding a pipe never block),
/// optionally keeps the bytes, and can be told to fail or to report a fixed
/// content tag.
pub struct MemoryBackend {
    objects: Mutex<HashMap<String, StoredObject>>,
    failure: FailureMode,
    keep_bodies: bool,
    tag_override: Mutex<Option<String>>,
    read_delay: Option<Duration>,
    upload_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            failure: FailureMode::None,
            keep_bodies: true,
            tag_override: Mutex::new(None),
            read_delay: None,
            upload_calls: AtomicUsize::new(0),
        }
    }

    /// A store whose uploads all fail in the given way.
    pub fn failing(failure: FailureMode) -> Self {
        Self {
            failure,
            ..Self::new()
        }
    }

    /// Drain bodies without keeping them.
    pub fn discarding() -> Self {
        Self {
            keep_bodies: false,
            ..Self::new()
        }
    }

    /// Sleep between body reads to simulate a slow network.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Report `tag` for every object instead of the digest of its contents.
    pub fn set_tag_override(&self, tag: Option<&str>) {
        *self.tag_override.lock().unwrap() = tag.map(str::to_string);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let map = self.objects.lock().unwrap();
        map.get(key).map(|obj| obj.data.clone())
    }

    pub fn options_for(&self, key: &str) -> Option<UploadOptions> {
        let map = self.objects.lock().unwrap();
        map.get(key).map(|obj| obj.options.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let map = self.objects.lock().unwrap();
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of `upload` calls received, failed or not.
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    fn drain(&self, body: &mut dyn Read) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = vec![0u8; 32 * 1024];
        loop {
            let n = body.read(&mut buf)?;
            if n == 0 {
                return Ok(data);
            }
            if self.keep_bodies {
                data.extend_from_slice(&buf[..n]);
            }
            if let Some(delay) = self.read_delay {
                std::thread::sleep(delay);
            }
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MemoryBackend {
    fn upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        options: &UploadOptions,
    ) -> Result<UploadOutput, StorageError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            FailureMode::None => {}
            FailureMode::SingleShot => {
                return Err(StorageError::SingleShot("mock upload error".into()));
            }
            FailureMode::Multipart => {
                return Err(StorageError::Multipart {
                    upload_id: "mock-upload-id".into(),
                    reason: "multipart upload failure".into(),
                });
            }
        }

        let data = self.drain(body)?;
        let mut map = self.objects.lock().unwrap();
        map.insert(
            key.to_string(),
            StoredObject {
                data,
                options: options.clone(),
            },
        );
        Ok(UploadOutput {
            location: format!("memory://{key}"),
            version_id: None,
        })
    }

    fn object_tag(&self, key: &str) -> Result<Option<String>, StorageError> {
        if let Some(tag) = self.tag_override.lock().unwrap().clone() {
            return Ok(Some(tag));
        }
        let map = self.objects.lock().unwrap();
        Ok(map.get(key).map(|obj| crate::quoted_md5(&obj.data)))
    }
}
