pub mod local_backend;
pub mod memory_backend;
pub mod retry;

use std::io::Read;

use serde::{Deserialize, Serialize};

pub use local_backend::LocalBackend;
pub use memory_backend::{FailureMode, MemoryBackend};
pub use walpush_types::error::StorageError;

/// Per-object options passed through to the store on every upload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadOptions {
    pub storage_class: String,
    pub server_side_encryption: Option<String>,
    /// Only meaningful together with `server_side_encryption = "aws:kms"`.
    pub sse_kms_key_id: Option<String>,
}

/// Where an upload landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutput {
    pub location: String,
    pub version_id: Option<String>,
}

/// Object storage as seen by the push path: single-pass uploads plus a
/// content-tag lookup used for post-upload verification.
pub trait ObjectStore: Send + Sync {
    /// Consume `body` to its end and store it under `key`.
    fn upload(
        &self,
        key: &str,
        body: &mut dyn Read,
        options: &UploadOptions,
    ) -> Result<UploadOutput, StorageError>;

    /// Content tag (ETag) of a stored object, exactly as the store reports it.
    /// Returns `Ok(None)` when the object does not exist.
    fn object_tag(&self, key: &str) -> Result<Option<String>, StorageError>;
}

/// Backoff settings for idempotent storage calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Quote an MD5 digest the way S3 reports single-part ETags.
pub(crate) fn quoted_md5(data: &[u8]) -> String {
    use md5::{Digest, Md5};
    format!("\"{}\"", hex::encode(Md5::digest(data)))
}
