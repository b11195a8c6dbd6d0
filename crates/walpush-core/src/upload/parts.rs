use tracing::debug;

use super::{UploadSummary, Uploader};
use crate::bundle::PartHandler;
use crate::error::Result;
use crate::tarball::CompletedPart;

/// Ships each closed part of a base backup on its own upload thread while
/// the walk continues.
pub struct PartUploader {
    uploader: Uploader,
    backup_name: String,
}

impl PartUploader {
    /// Uses a fresh clone of `uploader`, so [`finish`](Self::finish) waits
    /// only for this backup's parts.
    pub fn new(uploader: &Uploader, backup_name: impl Into<String>) -> Self {
        Self {
            uploader: uploader.clone(),
            backup_name: backup_name.into(),
        }
    }

    pub fn backup_name(&self) -> &str {
        &self.backup_name
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    /// Wait for every part upload started so far.
    pub fn finish(&self) -> UploadSummary {
        self.uploader.finish()
    }
}

impl PartHandler for PartUploader {
    fn handle_part(&mut self, part: CompletedPart) -> Result<()> {
        debug!(backup = %self.backup_name, part = part.number, "dispatching part upload");
        self.uploader.spawn_part_upload(part, &self.backup_name)
    }
}
