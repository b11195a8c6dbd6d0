use std::io::{self, Read};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use tracing::{debug, warn};
use walpush_types::BlockLocation;

use super::LocationSender;
use crate::error::{Result, WalpushError};

/// WAL page size; the recording reader hands the parser whole pages.
pub const WAL_PAGE_SIZE: usize = 8192;

/// Pages queued for the parser before the upload read blocks.
const PAGE_QUEUE_DEPTH: usize = 16;

/// Discovers modified blocks in WAL pages.
pub trait WalParser: Send {
    /// Parse one page. The last page of a stream may be short.
    fn parse_page(&mut self, page: &[u8]) -> Result<Vec<BlockLocation>>;
}

/// Creates one parser per recorded segment.
pub trait ParserFactory: Send + Sync {
    fn new_parser(&self) -> Box<dyn WalParser>;
}

impl<F> ParserFactory for F
where
    F: Fn() -> Box<dyn WalParser> + Send + Sync,
{
    fn new_parser(&self) -> Box<dyn WalParser> {
        self()
    }
}

/// Parser thread fed with WAL pages; forwards discovered locations to a
/// delta writer.
pub struct PageTap {
    pages: Sender<Vec<u8>>,
    worker: JoinHandle<Result<usize>>,
}

impl PageTap {
    pub fn spawn(mut parser: Box<dyn WalParser>, sink: LocationSender) -> Result<Self> {
        let (pages, rx) = crossbeam_channel::bounded::<Vec<u8>>(PAGE_QUEUE_DEPTH);
        let worker = std::thread::Builder::new()
            .name("delta-parse".into())
            .spawn(move || {
                let mut sent = 0usize;
                for page in rx {
                    for location in parser.parse_page(&page)? {
                        sink.send(location)?;
                        sent += 1;
                    }
                }
                Ok(sent)
            })
            .map_err(|e| WalpushError::Other(format!("spawn delta parser: {e}")))?;
        Ok(Self { pages, worker })
    }
}

/// Read decorator that tees everything read through it to a [`PageTap`].
///
/// The upload read never fails because of the tap. If the parser dies, the
/// tap detaches and the error is reported by [`close`](Self::close).
pub struct DeltaRecordingReader<R> {
    inner: R,
    pages: Option<Sender<Vec<u8>>>,
    pending: Vec<u8>,
    worker: Option<JoinHandle<Result<usize>>>,
}

impl<R> DeltaRecordingReader<R> {
    pub fn new(inner: R, tap: PageTap) -> Self {
        Self {
            inner,
            pages: Some(tap.pages),
            pending: Vec::with_capacity(WAL_PAGE_SIZE),
            worker: Some(tap.worker),
        }
    }

    fn tap(&mut self, bytes: &[u8]) {
        if self.pages.is_none() {
            return;
        }
        self.pending.extend_from_slice(bytes);
        while self.pending.len() >= WAL_PAGE_SIZE {
            let rest = self.pending.split_off(WAL_PAGE_SIZE);
            let page = std::mem::replace(&mut self.pending, rest);
            self.send_page(page);
        }
    }

    fn send_page(&mut self, page: Vec<u8>) {
        let detached = match &self.pages {
            Some(tx) => tx.send(page).is_err(),
            None => false,
        };
        if detached {
            debug!("delta parser stopped; detaching tap");
            self.pages = None;
            self.pending.clear();
        }
    }

    /// Flush the trailing partial page, stop the parser and wait for every
    /// location to be handed to the delta writer. Returns how many were sent.
    pub fn close(&mut self) -> Result<usize> {
        if !self.pending.is_empty() {
            let page = std::mem::take(&mut self.pending);
            self.send_page(page);
        }
        drop(self.pages.take());
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WalpushError::Other("delta parser panicked".into()))?,
            None => Ok(0),
        }
    }
}

impl<R: Read> Read for DeltaRecordingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.tap(&buf[..n]);
        Ok(n)
    }
}

impl<R> Drop for DeltaRecordingReader<R> {
    fn drop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        match self.close() {
            Ok(sent) => debug!(locations = sent, "delta recording finished"),
            Err(e) => warn!(error = %e, "delta recording failed"),
        }
    }
}
