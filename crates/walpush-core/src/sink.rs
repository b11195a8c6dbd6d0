//! Ordered writer chains.
//!
//! A chain is a stack of owned [`Layer`]s: the byte sink at the bottom, then
//! an optional encryption layer, then the compressor. Bytes written to the
//! chain enter the top layer. Closing walks the stack top-down: every layer
//! flushes its own trailer into the layer beneath it before that layer is
//! closed, and the sink is always closed last.

use std::fs::File;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::error::{Result, WalpushError};

/// One owned stage of a writer chain.
pub trait Layer: Write + Send {
    /// Short label used in logs and close-order audits.
    fn name(&self) -> &'static str;

    /// Write this layer's trailer and hand back the layer beneath it.
    /// Sinks return `None`.
    fn close(self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>>;
}

/// A writer chain with an auditable close order.
pub struct ChainedSink {
    top: Option<Box<dyn Layer>>,
    /// Layer names, bottom (sink) first.
    layers: Vec<&'static str>,
}

impl ChainedSink {
    pub fn new(sink: Box<dyn Layer>) -> Self {
        let layers = vec![sink.name()];
        Self {
            top: Some(sink),
            layers,
        }
    }

    /// Wrap the current top of the chain in a new layer.
    pub fn push<F>(&mut self, wrap: F) -> Result<()>
    where
        F: FnOnce(Box<dyn Layer>) -> Result<Box<dyn Layer>>,
    {
        let below = self
            .top
            .take()
            .ok_or_else(|| WalpushError::ChainSetup("chain already closed".into()))?;
        let layer = wrap(below)?;
        self.layers.push(layer.name());
        self.top = Some(layer);
        Ok(())
    }

    /// Names in the order `close` will close them (top first).
    pub fn close_order(&self) -> Vec<&'static str> {
        self.layers.iter().rev().copied().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.top.is_none()
    }

    /// Close every layer top-down. Returns the names in the order they were
    /// closed. The first failing layer aborts the cascade; layers below it
    /// are dropped without their trailers.
    pub fn close(&mut self) -> io::Result<Vec<&'static str>> {
        let mut closed = Vec::with_capacity(self.layers.len());
        let mut current = self.top.take();
        while let Some(layer) = current {
            let name = layer.name();
            current = layer.close()?;
            closed.push(name);
        }
        Ok(closed)
    }
}

impl Write for ChainedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.top.as_mut() {
            Some(top) => top.write(buf),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "write to closed chain",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.top.as_mut() {
            Some(top) => top.flush(),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Disk-backed sink; closing syncs the file.
pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Layer for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    fn close(mut self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(None)
    }
}

/// Growable byte buffer that stays readable after the chain owning it is closed.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Layer for SharedBuffer {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn close(self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_after_close_is_broken_pipe() {
        let mut chain = ChainedSink::new(Box::new(SharedBuffer::new()));
        chain.write_all(b"abc").unwrap();
        chain.close().unwrap();
        assert!(chain.is_closed());
        let err = chain.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn push_after_close_is_setup_error() {
        let mut chain = ChainedSink::new(Box::new(SharedBuffer::new()));
        chain.close().unwrap();
        let err = chain.push(Ok).unwrap_err();
        assert!(matches!(err, WalpushError::ChainSetup(_)));
    }
}
