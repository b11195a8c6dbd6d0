use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use walpush_types::BlockLocation;

use crate::error::{Result, WalpushError};

/// Block locations changed by one WAL segment, in the order they were found.
/// Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaFile {
    pub segment: String,
    pub locations: Vec<BlockLocation>,
}

impl DeltaFile {
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            locations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Write atomically: serialize into a temp file beside `path`, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            WalpushError::Other(format!("delta path has no parent: {}", path.display()))
        })?;
        fs::create_dir_all(dir)?;
        let bytes = rmp_serde::to_vec(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| WalpushError::Io(e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(rmp_serde::from_slice(&bytes)?)
    }
}
