use std::collections::HashSet;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, WalpushError};

/// How the bundle treats a walked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// The control file; held back and archived after the walk.
    Sentinel,
    /// Excluded directory: archived header-only, descendants never visited.
    ExcludedDir,
    Archived,
}

#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    /// Path relative to the walk root; used as the archive member name.
    pub rel_path: PathBuf,
    pub metadata: Metadata,
    pub kind: EntryKind,
}

/// Lazy, depth-first, lexically sorted stream of entries under a root.
///
/// The root itself is not yielded. Excluded files are dropped here; excluded
/// directories are yielded once and their subtree is pruned.
pub struct EntryStream<'a> {
    root: PathBuf,
    inner: walkdir::IntoIter,
    excludes: &'a HashSet<String>,
    sentinel_name: &'a str,
}

impl<'a> EntryStream<'a> {
    pub fn new(root: &Path, excludes: &'a HashSet<String>, sentinel_name: &'a str) -> Self {
        let inner = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self {
            root: root.to_path_buf(),
            inner,
            excludes,
            sentinel_name,
        }
    }
}

fn walk_error(err: walkdir::Error, fallback: &Path) -> WalpushError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    let source = match err.into_io_error() {
        Some(source) => source,
        None => io::Error::other("filesystem loop detected"),
    };
    WalpushError::Walk { path, source }
}

impl Iterator for EntryStream<'_> {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(walk_error(e, &self.root))),
            };
            if entry.depth() == 0 {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => return Some(Err(walk_error(e, entry.path()))),
            };
            let name = entry.file_name().to_string_lossy();
            let is_dir = entry.file_type().is_dir();

            let kind = if name == self.sentinel_name && !is_dir {
                EntryKind::Sentinel
            } else if self.excludes.contains(name.as_ref()) {
                if !is_dir {
                    continue;
                }
                self.inner.skip_current_dir();
                EntryKind::ExcludedDir
            } else {
                EntryKind::Archived
            };

            let rel_path = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => entry.path().to_path_buf(),
            };
            return Some(Ok(WalkEntry {
                path: entry.path().to_path_buf(),
                rel_path,
                metadata,
                kind,
            }));
        }
    }
}
