mod defaults;
mod types;

pub use types::*;
pub use walpush_storage::RetryConfig;

use walpush_storage::UploadOptions;

use crate::compress::Compression;
use crate::error::{Result, WalpushError};

impl PushConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: PushConfig = serde_yaml::from_str(text)
            .map_err(|e| WalpushError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.upload.validate()?;
        self.compression()?;
        if self.delta.enabled && self.delta.data_folder.is_none() {
            return Err(WalpushError::Config(
                "delta.enabled requires delta.data_folder".into(),
            ));
        }
        if self.delta.queue_depth == 0 {
            return Err(WalpushError::Config(
                "delta.queue_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn compression(&self) -> Result<Compression> {
        Compression::from_algorithm(self.compression.algorithm, self.compression.zstd_level)
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sse_kms_key_id.is_some()
            && self.server_side_encryption.as_deref() != Some("aws:kms")
        {
            return Err(WalpushError::Config(
                "sse_kms_key_id requires server_side_encryption: aws:kms".into(),
            ));
        }
        if self.storage_class.trim().is_empty() {
            return Err(WalpushError::Config("storage_class must not be empty".into()));
        }
        Ok(())
    }

    pub fn upload_options(&self) -> UploadOptions {
        let server_side_encryption = self
            .server_side_encryption
            .clone()
            .filter(|sse| !sse.is_empty());
        // The KMS key id only travels alongside an SSE mode.
        let sse_kms_key_id = server_side_encryption
            .as_ref()
            .and(self.sse_kms_key_id.clone())
            .filter(|id| !id.is_empty());
        UploadOptions {
            storage_class: self.storage_class.clone(),
            server_side_encryption,
            sse_kms_key_id,
        }
    }
}
