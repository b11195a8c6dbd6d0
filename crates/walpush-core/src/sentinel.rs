//! Backup-completion markers.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WalpushError};
use crate::upload::{Uploader, BASEBACKUP_PATH};

/// Written once per backup, after its data has been uploaded.
pub trait CompletionMarker: Send + Sync {
    fn mark_complete(&self, uploader: &Uploader, backup_name: &str) -> Result<()>;
}

/// Body of the stop sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSentinel {
    pub backup_name: String,
    pub finish_time: DateTime<Utc>,
    /// Extension of the compressor the backup was written with.
    pub compression: String,
}

/// Uploads a JSON stop sentinel next to the backup:
/// `basebackups_005/<name>_backup_stop_sentinel.json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageSentinel;

impl StorageSentinel {
    pub fn sentinel_path(backup_name: &str) -> String {
        format!("{BASEBACKUP_PATH}{backup_name}_backup_stop_sentinel.json")
    }
}

impl CompletionMarker for StorageSentinel {
    fn mark_complete(&self, uploader: &Uploader, backup_name: &str) -> Result<()> {
        let sentinel = BackupSentinel {
            backup_name: backup_name.to_string(),
            finish_time: Utc::now(),
            compression: uploader.compressor().file_extension().to_string(),
        };
        let body = serde_json::to_vec_pretty(&sentinel)
            .map_err(|e| WalpushError::Other(format!("encode sentinel: {e}")))?;
        let path = Self::sentinel_path(backup_name);
        uploader.upload_raw(&path, &mut Cursor::new(body))?;
        info!(backup = %backup_name, key = %uploader.object_key(&path), "wrote completion sentinel");
        Ok(())
    }
}
