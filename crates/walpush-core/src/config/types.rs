use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use walpush_storage::RetryConfig;

use super::defaults::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    pub upload: UploadConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub delta: DeltaConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Destination prefix inside the bucket, e.g. `server-1/`.
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    /// e.g. `AES256` or `aws:kms`.
    #[serde(default)]
    pub server_side_encryption: Option<String>,
    /// Only valid with `server_side_encryption: aws:kms`.
    #[serde(default)]
    pub sse_kms_key_id: Option<String>,
    /// Compare each object's stored tag against a local MD5 after upload.
    #[serde(default)]
    pub verify: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            storage_class: default_storage_class(),
            server_side_encryption: None,
            sse_kms_key_id: None,
            verify: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    #[serde(default = "default_algorithm")]
    pub algorithm: CompressionAlgorithm,
    #[serde(default = "default_zstd_level")]
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            zstd_level: default_zstd_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    None,
    Lz4,
    Zstd,
    /// Accepted so configs written for other builds parse, rejected when used.
    Lzo,
}

impl CompressionAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Lzo => "lzo",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// A part is closed before the next entry once it holds more than this
    /// many archive bytes.
    #[serde(default = "default_min_part_size")]
    pub min_part_size: u64,
    /// Entry names (not paths) left out of the archive. Excluded directories
    /// are kept as empty directories.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,
    /// Control file held back during the walk and archived last.
    #[serde(default = "default_sentinel_name")]
    pub sentinel_name: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            min_part_size: default_min_part_size(),
            excludes: default_excludes(),
            sentinel_name: default_sentinel_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Local directory receiving one `.delta` file per uploaded segment.
    #[serde(default)]
    pub data_folder: Option<PathBuf>,
    #[serde(default = "default_delta_queue_depth")]
    pub queue_depth: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            data_folder: None,
            queue_depth: default_delta_queue_depth(),
        }
    }
}
