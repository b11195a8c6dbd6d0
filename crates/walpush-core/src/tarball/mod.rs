//! Archive parts.
//!
//! A [`TarBall`] is one numbered part of a base backup: a tar stream written
//! through a [`ChainedSink`] of compressor, optional encryption and a sink.
//! Parts are produced by a [`TarBallMaker`] so the bundle never needs to know
//! where bytes end up.

mod buffer;
mod file;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::compress::pipe::build_chain;
use crate::compress::Compressor;
use crate::crypto::Crypter;
use crate::error::{Result, WalpushError};
use crate::sink::{ChainedSink, Layer, SharedBuffer};

pub use buffer::{BufferTarBall, BufferTarBallMaker};
pub use file::{FileTarBall, FileTarBallMaker};

pub type TarWriter = tar::Builder<ChainedSink>;

/// `part_<NNN>.tar.<ext>`.
pub fn part_name(number: u32, extension: &str) -> String {
    format!("part_{number:03}.tar.{extension}")
}

/// Where a closed part's bytes live.
#[derive(Debug, Clone)]
pub enum PartLocation {
    File(PathBuf),
    Memory(SharedBuffer),
}

/// A closed, fully flushed part ready for upload.
#[derive(Debug, Clone)]
pub struct CompletedPart {
    pub number: u32,
    pub name: String,
    /// Archive bytes accounted while filling the part (before compression).
    pub archived_bytes: u64,
    pub location: PartLocation,
}

pub trait TarBall: Send {
    /// Build the writer chain on first call; later calls are no-ops.
    fn set_up(&mut self) -> Result<()>;

    fn is_set_up(&self) -> bool;

    /// Write the tar trailer, then close the chain top-down.
    fn close_tar(&mut self) -> Result<CompletedPart>;

    /// Report that the backup's parts are all written.
    fn finish(&self) -> Result<()>;

    fn number(&self) -> u32;

    fn size(&self) -> u64;

    fn add_size(&mut self, n: u64);

    /// The archive writer. Only available between `set_up` and `close_tar`.
    fn tar_writer(&mut self) -> Result<&mut TarWriter>;
}

pub trait TarBallMaker: Send {
    /// Create the next part, numbered from 1.
    fn make(&mut self) -> Box<dyn TarBall>;
}

/// State shared by every tarball variant.
struct PartCore {
    number: u32,
    size: u64,
    compressor: Arc<dyn Compressor>,
    crypter: Arc<dyn Crypter>,
    writer: Option<TarWriter>,
    closed: bool,
}

impl PartCore {
    fn new(number: u32, compressor: Arc<dyn Compressor>, crypter: Arc<dyn Crypter>) -> Self {
        Self {
            number,
            size: 0,
            compressor,
            crypter,
            writer: None,
            closed: false,
        }
    }

    fn name(&self) -> String {
        part_name(self.number, self.compressor.file_extension())
    }

    fn open(&mut self, sink: Box<dyn Layer>) -> Result<()> {
        let chain = build_chain(sink, self.compressor.as_ref(), Some(self.crypter.as_ref()))?;
        debug!(part = self.number, layers = ?chain.close_order(), "part writer chain ready");
        let mut builder = tar::Builder::new(chain);
        builder.follow_symlinks(false);
        self.writer = Some(builder);
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut TarWriter> {
        self.writer.as_mut().ok_or_else(|| {
            WalpushError::Other(format!("part {} has no open tar writer", self.number))
        })
    }

    fn close(&mut self) -> Result<()> {
        let builder = self.writer.take().ok_or_else(|| {
            WalpushError::Other(format!("part {} closed before set up", self.number))
        })?;
        // into_inner writes the two zero blocks that end the archive.
        let mut chain = builder.into_inner()?;
        let closed = chain.close()?;
        self.closed = true;
        debug!(part = self.number, layers = ?closed, "part closed");
        Ok(())
    }
}
