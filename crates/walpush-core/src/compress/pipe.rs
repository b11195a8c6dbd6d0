use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use super::Compressor;
use crate::crypto::Crypter;
use crate::error::{Result, WalpushError};
use crate::sink::{ChainedSink, Layer};

/// Number of unread writes the producer may queue before it blocks.
const PIPE_DEPTH: usize = 4;

enum Packet {
    Data(Vec<u8>),
    Failed(io::Error),
}

/// Write half of an in-process pipe. Also usable as the sink of a chain.
pub struct PipeWriter {
    tx: Sender<Packet>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(Packet::Data(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Layer for PipeWriter {
    fn name(&self) -> &'static str {
        "pipe"
    }

    fn close(self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
        Ok(None)
    }
}

/// Lets the producer hand a failure to the reader after the writer is gone.
struct FailureReporter {
    tx: Sender<Packet>,
}

impl FailureReporter {
    fn fail(&self, err: io::Error) {
        // The reader may already be gone; nobody is left to tell.
        let _ = self.tx.send(Packet::Failed(err));
    }
}

/// Read half of the compressing pipe.
///
/// Yields compressed bytes as the producer emits them and returns EOF once
/// the producer has closed its whole chain. A producer failure fails this
/// read and every later one.
pub struct PipeReader {
    rx: Receiver<Packet>,
    current: Vec<u8>,
    pos: usize,
    producer: Option<JoinHandle<()>>,
    /// Set once a producer failure has been reported; later reads fail too.
    failure: Option<(io::ErrorKind, String)>,
}

impl PipeReader {
    fn reap_producer(&mut self) -> io::Result<()> {
        if let Some(handle) = self.producer.take() {
            handle
                .join()
                .map_err(|_| io::Error::other("compression producer panicked"))?;
        }
        Ok(())
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some((kind, message)) = &self.failure {
            return Err(io::Error::new(
                *kind,
                format!("compressing pipe already failed: {message}"),
            ));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.current.len() {
                let n = buf.len().min(self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            match self.rx.recv() {
                Ok(Packet::Data(data)) => {
                    self.current = data;
                    self.pos = 0;
                }
                Ok(Packet::Failed(err)) => {
                    self.failure = Some((err.kind(), err.to_string()));
                    return Err(err);
                }
                Err(_) => {
                    self.reap_producer()?;
                    return Ok(0);
                }
            }
        }
    }
}

fn pipe() -> (PipeWriter, FailureReporter, Receiver<Packet>) {
    let (tx, rx) = crossbeam_channel::bounded(PIPE_DEPTH);
    (
        PipeWriter { tx: tx.clone() },
        FailureReporter { tx },
        rx,
    )
}

/// Streams an input through compression (and encryption, when the crypter
/// is active) on a dedicated producer thread.
#[derive(Clone)]
pub struct CompressingPipe {
    compressor: Arc<dyn Compressor>,
    crypter: Option<Arc<dyn Crypter>>,
}

impl CompressingPipe {
    pub fn new(compressor: Arc<dyn Compressor>, crypter: Option<Arc<dyn Crypter>>) -> Self {
        Self {
            compressor,
            crypter,
        }
    }

    /// Start compressing `input`. Chain setup failures are returned here;
    /// failures while streaming surface as read errors on the returned reader.
    pub fn spawn(&self, mut input: Box<dyn Read + Send>) -> Result<PipeReader> {
        let (writer, reporter, rx) = pipe();
        let mut chain = build_chain(
            Box::new(writer),
            self.compressor.as_ref(),
            self.crypter.as_deref(),
        )?;

        let producer = std::thread::Builder::new()
            .name("compress-pipe".into())
            .spawn(move || {
                let copied = io::copy(&mut input, &mut chain);
                // Release the input (and any taps on it) before signalling
                // end-of-stream to the reader.
                drop(input);
                let result = copied.and_then(|bytes| {
                    let closed = chain.close()?;
                    debug!(bytes, layers = ?closed, "compressing pipe drained");
                    Ok(())
                });
                if let Err(err) = result {
                    reporter.fail(err);
                }
            })
            .map_err(|e| WalpushError::ChainSetup(format!("spawn compress thread: {e}")))?;

        Ok(PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
            producer: Some(producer),
            failure: None,
        })
    }
}

/// Build `sink -> [encryption] -> compressor`, returning the chain with the
/// compressor on top.
pub fn build_chain(
    sink: Box<dyn Layer>,
    compressor: &dyn Compressor,
    crypter: Option<&dyn Crypter>,
) -> Result<ChainedSink> {
    let mut chain = ChainedSink::new(sink);
    if let Some(crypter) = crypter.filter(|c| c.is_used()) {
        chain.push(|below| crypter.encrypt(below))?;
    }
    chain.push(|below| compressor.new_writer(below))?;
    Ok(chain)
}
