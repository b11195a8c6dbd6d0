//! Directory walk and part sharding for base backups.
//!
//! The walk is a lazy [`EntryStream`] consumed by a [`PartSharder`]: entries
//! are archived into the current part until it holds more than `min_size`
//! archive bytes, at which point the part is closed and handed to a
//! [`PartHandler`] (typically an uploader) before the next entry starts a new
//! one. Parts are never split mid-entry.

mod archive;
mod walk;

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};

use crate::config::BundleConfig;
use crate::error::Result;
use crate::tarball::{CompletedPart, TarBall, TarBallMaker};

pub use archive::{archive_entry, archived_len};
pub use walk::{EntryKind, EntryStream, WalkEntry};

/// Receives each part as soon as it is closed.
pub trait PartHandler {
    fn handle_part(&mut self, part: CompletedPart) -> Result<()>;
}

impl<F> PartHandler for F
where
    F: FnMut(CompletedPart) -> Result<()>,
{
    fn handle_part(&mut self, part: CompletedPart) -> Result<()> {
        self(part)
    }
}

/// Outcome of one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub parts: u32,
    pub entries: u64,
    pub archived_bytes: u64,
    pub sentinel_archived: bool,
}

/// Stateful reducer turning archived entries into size-bounded parts.
pub struct PartSharder<'a> {
    maker: &'a mut dyn TarBallMaker,
    min_size: u64,
    current: Option<Box<dyn TarBall>>,
    last_closed: Option<Box<dyn TarBall>>,
}

impl<'a> PartSharder<'a> {
    pub fn new(maker: &'a mut dyn TarBallMaker, min_size: u64) -> Self {
        Self {
            maker,
            min_size,
            current: None,
            last_closed: None,
        }
    }

    /// Called before each entry. Closes the current part when it already
    /// holds more than `min_size` bytes.
    pub fn admit(&mut self) -> Result<Option<CompletedPart>> {
        let full = self
            .current
            .as_ref()
            .is_some_and(|tb| tb.size() > self.min_size);
        if full {
            self.seal()
        } else {
            Ok(None)
        }
    }

    /// The open part, creating and setting up a new one if needed.
    pub fn current(&mut self) -> Result<&mut Box<dyn TarBall>> {
        let tb = match self.current.take() {
            Some(tb) => tb,
            None => {
                let mut tb = self.maker.make();
                tb.set_up()?;
                debug!(part = tb.number(), "opened part");
                tb
            }
        };
        Ok(self.current.insert(tb))
    }

    /// Close the open part, if any.
    pub fn seal(&mut self) -> Result<Option<CompletedPart>> {
        let Some(mut tb) = self.current.take() else {
            return Ok(None);
        };
        let part = tb.close_tar()?;
        self.last_closed = Some(tb);
        Ok(Some(part))
    }

    /// Report completion through the last closed part.
    pub fn finish(&self) -> Result<()> {
        match &self.last_closed {
            Some(tb) => tb.finish(),
            None => Ok(()),
        }
    }
}

/// Walk state for one base backup.
pub struct Bundle {
    min_size: u64,
    excludes: HashSet<String>,
    sentinel_name: String,
    sentinel: Option<WalkEntry>,
}

impl Bundle {
    /// A bundle with no exclusions and the default control-file sentinel.
    pub fn new(min_size: u64) -> Self {
        Self {
            min_size,
            excludes: HashSet::new(),
            sentinel_name: BundleConfig::default().sentinel_name,
            sentinel: None,
        }
    }

    pub fn from_config(config: &BundleConfig) -> Self {
        Self {
            min_size: config.min_part_size,
            excludes: config.excludes.iter().cloned().collect(),
            sentinel_name: config.sentinel_name.clone(),
            sentinel: None,
        }
    }

    pub fn with_excludes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excludes.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_sentinel_name(mut self, name: impl Into<String>) -> Self {
        self.sentinel_name = name.into();
        self
    }

    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// The control file found by the last walk, if any.
    pub fn sentinel(&self) -> Option<&WalkEntry> {
        self.sentinel.as_ref()
    }

    /// Archive everything under `root`, handing each closed part to
    /// `handler`. The sentinel, when present, is archived alone in the final
    /// part.
    pub fn walk(
        &mut self,
        root: &Path,
        maker: &mut dyn TarBallMaker,
        handler: &mut dyn PartHandler,
    ) -> Result<WalkSummary> {
        let mut summary = WalkSummary::default();
        let mut sentinel = None;
        let mut sharder = PartSharder::new(maker, self.min_size);

        for entry in EntryStream::new(root, &self.excludes, &self.sentinel_name) {
            let entry = entry?;
            if entry.kind == EntryKind::Sentinel {
                debug!(path = %entry.path.display(), "holding back sentinel");
                sentinel = Some(entry);
                continue;
            }
            if let Some(part) = sharder.admit()? {
                summary.parts += 1;
                handler.handle_part(part)?;
            }
            let tb = sharder.current()?;
            let written = archive_entry(tb.as_mut(), &entry)?;
            tb.add_size(written);
            summary.entries += 1;
            summary.archived_bytes += written;
        }

        if let Some(part) = sharder.seal()? {
            summary.parts += 1;
            handler.handle_part(part)?;
        }

        self.sentinel = sentinel;
        if let Some(written) = self.handle_sentinel(&mut sharder, handler)? {
            summary.parts += 1;
            summary.entries += 1;
            summary.archived_bytes += written;
            summary.sentinel_archived = true;
        }

        sharder.finish()?;
        info!(
            root = %root.display(),
            parts = summary.parts,
            entries = summary.entries,
            bytes = summary.archived_bytes,
            "bundle walk complete"
        );
        Ok(summary)
    }

    /// Archive the held-back sentinel into a part of its own.
    fn handle_sentinel(
        &self,
        sharder: &mut PartSharder<'_>,
        handler: &mut dyn PartHandler,
    ) -> Result<Option<u64>> {
        let Some(entry) = &self.sentinel else {
            return Ok(None);
        };
        let tb = sharder.current()?;
        let written = archive_entry(tb.as_mut(), entry)?;
        tb.add_size(written);
        if let Some(part) = sharder.seal()? {
            handler.handle_part(part)?;
        }
        Ok(Some(written))
    }
}
