use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};
use walpush_types::WalSegmentName;

use super::{DeltaFileWriter, LocationSender};
use crate::config::DeltaConfig;
use crate::error::{Result, WalpushError};

/// Session-wide registry of per-segment delta writers.
///
/// A writer and its consumer are created on first reference to a segment and
/// live until that segment's upload completes, at which point the delta file
/// is flushed to `<data_folder>/<segment>.delta`.
pub struct DeltaFileManager {
    data_folder: PathBuf,
    queue_depth: usize,
    writers: Mutex<HashMap<WalSegmentName, DeltaFileWriter>>,
}

impl DeltaFileManager {
    pub fn new(data_folder: impl AsRef<Path>, queue_depth: usize) -> Self {
        Self {
            data_folder: data_folder.as_ref().to_path_buf(),
            queue_depth,
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// `None` when delta tracking is disabled.
    pub fn from_config(config: &DeltaConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let folder = config.data_folder.as_ref().ok_or_else(|| {
            WalpushError::Config("delta.enabled requires delta.data_folder".into())
        })?;
        Ok(Some(Self::new(folder, config.queue_depth)))
    }

    pub fn data_folder(&self) -> &Path {
        &self.data_folder
    }

    pub fn delta_path(&self, segment: &WalSegmentName) -> PathBuf {
        self.data_folder.join(format!("{segment}.delta"))
    }

    /// A producer handle for `segment`, creating its writer on first use.
    pub fn location_sender(&self, segment: &WalSegmentName) -> Result<LocationSender> {
        let mut writers = self.writers.lock().unwrap();
        if !writers.contains_key(segment) {
            let writer = DeltaFileWriter::new(segment.to_string(), self.queue_depth)?;
            writers.insert(*segment, writer);
        }
        match writers.get(segment) {
            Some(writer) => writer.sender(),
            None => Err(WalpushError::Other(format!(
                "delta writer for {segment} vanished"
            ))),
        }
    }

    /// Segments that still have an open writer.
    pub fn pending_segments(&self) -> Vec<WalSegmentName> {
        let mut segments: Vec<_> = self.writers.lock().unwrap().keys().copied().collect();
        segments.sort();
        segments
    }

    /// Drain `segment`'s writer and persist its delta file. Returns `None`
    /// when the segment was never referenced.
    ///
    /// A writer with live producers stays registered and the call fails.
    pub fn flush_segment(&self, segment: &WalSegmentName) -> Result<Option<PathBuf>> {
        let Some(mut writer) = self.writers.lock().unwrap().remove(segment) else {
            return Ok(None);
        };
        let file = match writer.close() {
            Ok(file) => file,
            Err(e) => {
                self.writers.lock().unwrap().insert(*segment, writer);
                return Err(e);
            }
        };
        let path = self.delta_path(segment);
        file.save(&path)?;
        info!(
            segment = %segment,
            locations = file.len(),
            path = %path.display(),
            "delta file flushed"
        );
        Ok(Some(path))
    }

    /// Forget `segment`'s writer without writing a delta file, so a later
    /// upload of the same segment starts from an empty one.
    pub fn discard_segment(&self, segment: &WalSegmentName) -> Result<()> {
        let Some(mut writer) = self.writers.lock().unwrap().remove(segment) else {
            return Ok(());
        };
        let dropped = writer.discard()?;
        warn!(segment = %segment, dropped, "delta locations discarded");
        Ok(())
    }

    /// Flush every pending segment in segment order.
    pub fn flush_all(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for segment in self.pending_segments() {
            if let Some(path) = self.flush_segment(&segment)? {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}
