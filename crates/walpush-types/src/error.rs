use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WalpushError>;

/// Failure reported by an object store.
///
/// The multipart/single-shot split only drives how much context gets logged;
/// callers see a single [`WalpushError::Upload`] either way.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("multipart upload '{upload_id}' failed: {reason}")]
    Multipart { upload_id: String, reason: String },

    #[error("upload failed: {0}")]
    SingleShot(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

impl StorageError {
    /// Transfer identifier of a failed multipart upload, if any.
    pub fn upload_id(&self) -> Option<&str> {
        match self {
            StorageError::Multipart { upload_id, .. } => Some(upload_id),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum WalpushError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk failed at '{}': {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writer chain setup failed: {0}")]
    ChainSetup(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("encryption error: {0}")]
    Crypto(String),

    #[error("decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("failed to upload '{key}': {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("verification failed for '{key}': local md5 {expected}, stored tag {actual}")]
    VerificationFailed {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("delta tracking: {0}")]
    DeltaPrecondition(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("not a WAL segment name: '{0}'")]
    InvalidWalName(String),

    #[error("{0}")]
    Other(String),
}

impl WalpushError {
    /// Errors after which the backup must stop rather than continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WalpushError::VerificationFailed { .. } | WalpushError::ChainSetup(_)
        )
    }
}
