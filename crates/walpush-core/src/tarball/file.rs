use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::{CompletedPart, PartCore, PartLocation, TarBall, TarBallMaker, TarWriter};
use crate::compress::Compressor;
use crate::crypto::Crypter;
use crate::error::{Result, WalpushError};
use crate::sink::FileSink;

/// A part written to `<out_dir>/part_NNN.tar.<ext>`.
pub struct FileTarBall {
    out_dir: PathBuf,
    core: PartCore,
}

impl FileTarBall {
    pub fn path(&self) -> PathBuf {
        self.out_dir.join(self.core.name())
    }
}

impl TarBall for FileTarBall {
    fn set_up(&mut self) -> Result<()> {
        if self.core.writer.is_some() || self.core.closed {
            return Ok(());
        }
        let path = self.path();
        let file = File::create(&path).map_err(|e| {
            WalpushError::ChainSetup(format!("create part file '{}': {e}", path.display()))
        })?;
        self.core.open(Box::new(FileSink::new(file)))
    }

    fn is_set_up(&self) -> bool {
        self.core.writer.is_some()
    }

    fn close_tar(&mut self) -> Result<CompletedPart> {
        self.core.close()?;
        Ok(CompletedPart {
            number: self.core.number,
            name: self.core.name(),
            archived_bytes: self.core.size,
            location: PartLocation::File(self.path()),
        })
    }

    fn finish(&self) -> Result<()> {
        info!(
            parts = self.core.number,
            out_dir = %self.out_dir.display(),
            "wrote compressed tar files"
        );
        Ok(())
    }

    fn number(&self) -> u32 {
        self.core.number
    }

    fn size(&self) -> u64 {
        self.core.size
    }

    fn add_size(&mut self, n: u64) {
        self.core.size += n;
    }

    fn tar_writer(&mut self) -> Result<&mut TarWriter> {
        self.core.writer()
    }
}

/// Makes [`FileTarBall`]s in one output directory.
pub struct FileTarBallMaker {
    out_dir: PathBuf,
    compressor: Arc<dyn Compressor>,
    crypter: Arc<dyn Crypter>,
    made: u32,
}

impl FileTarBallMaker {
    pub fn new(
        out_dir: impl AsRef<Path>,
        compressor: Arc<dyn Compressor>,
        crypter: Arc<dyn Crypter>,
    ) -> Self {
        Self {
            out_dir: out_dir.as_ref().to_path_buf(),
            compressor,
            crypter,
            made: 0,
        }
    }
}

impl TarBallMaker for FileTarBallMaker {
    fn make(&mut self) -> Box<dyn TarBall> {
        self.made += 1;
        Box::new(FileTarBall {
            out_dir: self.out_dir.clone(),
            core: PartCore::new(self.made, self.compressor.clone(), self.crypter.clone()),
        })
    }
}
