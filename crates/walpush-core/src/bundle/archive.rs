use std::fs::File;
use std::io::{self, Read};

use tracing::trace;

use super::walk::{EntryKind, WalkEntry};
use crate::error::{Result, WalpushError};
use crate::tarball::TarBall;

const BLOCK: u64 = 512;

/// Archive bytes an entry of `data_len` payload bytes occupies: one header
/// block plus the payload rounded up to whole blocks.
pub fn archived_len(data_len: u64) -> u64 {
    BLOCK + data_len.div_ceil(BLOCK) * BLOCK
}

/// Write one entry into the part and return the archive bytes it took.
///
/// Regular files contribute exactly the size recorded in their header: a
/// file that shrank since it was stat'ed is padded with zeros, one that grew
/// is cut at the recorded size.
pub fn archive_entry(tarball: &mut dyn TarBall, entry: &WalkEntry) -> Result<u64> {
    let with_path = |source: io::Error| WalpushError::Walk {
        path: entry.path.clone(),
        source,
    };

    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(&entry.metadata, tar::HeaderMode::Complete);
    let file_type = entry.metadata.file_type();
    let builder = tarball.tar_writer()?;

    let data_len = if file_type.is_symlink() {
        let target = std::fs::read_link(&entry.path).map_err(with_path)?;
        header.set_size(0);
        builder
            .append_link(&mut header, &entry.rel_path, &target)
            .map_err(with_path)?;
        0
    } else if file_type.is_file() && entry.kind != EntryKind::ExcludedDir {
        let size = entry.metadata.len();
        header.set_size(size);
        let file = File::open(&entry.path).map_err(with_path)?;
        let padded = file.take(size).chain(io::repeat(0)).take(size);
        builder
            .append_data(&mut header, &entry.rel_path, padded)
            .map_err(with_path)?;
        size
    } else {
        header.set_size(0);
        builder
            .append_data(&mut header, &entry.rel_path, io::empty())
            .map_err(with_path)?;
        0
    };

    trace!(path = %entry.rel_path.display(), size = data_len, "archived");
    Ok(archived_len(data_len))
}
