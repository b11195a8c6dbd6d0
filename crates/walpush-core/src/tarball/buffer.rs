use std::sync::{Arc, Mutex};

use super::{CompletedPart, PartCore, PartLocation, TarBall, TarBallMaker, TarWriter};
use crate::compress::Compressor;
use crate::crypto::Crypter;
use crate::error::Result;
use crate::sink::SharedBuffer;

/// A part kept in memory. Mostly useful for tests and for small archives
/// that are uploaded straight from RAM.
pub struct BufferTarBall {
    buffer: SharedBuffer,
    core: PartCore,
}

impl BufferTarBall {
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }
}

impl TarBall for BufferTarBall {
    fn set_up(&mut self) -> Result<()> {
        if self.core.writer.is_some() || self.core.closed {
            return Ok(());
        }
        self.core.open(Box::new(self.buffer.clone()))
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
            location: PartLocation::Memory(self.buffer.clone()),
        })
    }

    fn finish(&self) -> Result<()> {
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

/// Makes [`BufferTarBall`]s and remembers every buffer it handed out.
#[derive(Clone)]
pub struct BufferTarBallMaker {
    compressor: Arc<dyn Compressor>,
    crypter: Arc<dyn Crypter>,
    buffers: Arc<Mutex<Vec<SharedBuffer>>>,
}

impl BufferTarBallMaker {
    pub fn new(compressor: Arc<dyn Compressor>, crypter: Arc<dyn Crypter>) -> Self {
        Self {
            compressor,
            crypter,
            buffers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Buffers of every part made so far, in part order.
    pub fn buffers(&self) -> Vec<SharedBuffer> {
        self.buffers.lock().unwrap().clone()
    }
}

impl TarBallMaker for BufferTarBallMaker {
    fn make(&mut self) -> Box<dyn TarBall> {
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = SharedBuffer::new();
        buffers.push(buffer.clone());
        Box::new(BufferTarBall {
            buffer,
            core: PartCore::new(
                buffers.len() as u32,
                self.compressor.clone(),
                self.crypter.clone(),
            ),
        })
    }
}
