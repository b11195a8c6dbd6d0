use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::Sender;
use tracing::debug;
use walpush_types::BlockLocation;

use super::DeltaFile;
use crate::error::{Result, WalpushError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Accepting producers and locations.
    Open,
    /// Queue closed; the consumer is appending what is left.
    Draining,
    /// Consumer finished; the delta file is final.
    Closed,
}

struct WriterShared {
    state: WriterState,
    producers: usize,
}

/// Fans block locations from any number of producers into one [`DeltaFile`].
///
/// A dedicated consumer thread appends locations in receipt order. The queue
/// may only be closed once every [`LocationSender`] is gone; closing earlier
/// is refused rather than losing locations.
pub struct DeltaFileWriter {
    segment: String,
    tx: Option<Sender<BlockLocation>>,
    shared: Arc<Mutex<WriterShared>>,
    consumer: Option<JoinHandle<DeltaFile>>,
}

impl DeltaFileWriter {
    pub fn new(segment: impl Into<String>, queue_depth: usize) -> Result<Self> {
        let segment = segment.into();
        let (tx, rx) = crossbeam_channel::bounded::<BlockLocation>(queue_depth.max(1));
        let mut file = DeltaFile::new(segment.clone());
        let consumer = std::thread::Builder::new()
            .name(format!("delta-{segment}"))
            .spawn(move || {
                for location in rx {
                    file.locations.push(location);
                }
                file
            })
            .map_err(|e| WalpushError::Other(format!("spawn delta consumer: {e}")))?;

        Ok(Self {
            segment,
            tx: Some(tx),
            shared: Arc::new(Mutex::new(WriterShared {
                state: WriterState::Open,
                producers: 0,
            })),
            consumer: Some(consumer),
        })
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn state(&self) -> WriterState {
        self.shared.lock().unwrap().state
    }

    pub fn live_producers(&self) -> usize {
        self.shared.lock().unwrap().producers
    }

    /// Register a new producer.
    pub fn sender(&self) -> Result<LocationSender> {
        let mut shared = self.shared.lock().unwrap();
        let tx = match (&self.tx, shared.state) {
            (Some(tx), WriterState::Open) => tx.clone(),
            _ => {
                return Err(WalpushError::DeltaPrecondition(format!(
                    "delta writer for {} is no longer open",
                    self.segment
                )))
            }
        };
        shared.producers += 1;
        Ok(LocationSender {
            tx,
            shared: self.shared.clone(),
        })
    }

    /// Close the queue and wait for the consumer to drain it.
    ///
    /// Fails without side effects while any producer is still alive.
    pub fn close(&mut self) -> Result<DeltaFile> {
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.state != WriterState::Open {
                return Err(WalpushError::DeltaPrecondition(format!(
                    "delta writer for {} closed twice",
                    self.segment
                )));
            }
            if shared.producers > 0 {
                return Err(WalpushError::DeltaPrecondition(format!(
                    "delta writer for {} closed with {} live producer(s)",
                    self.segment, shared.producers
                )));
            }
            shared.state = WriterState::Draining;
        }

        drop(self.tx.take());
        let file = match self.consumer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WalpushError::Other("delta consumer panicked".into()))?,
            None => DeltaFile::new(self.segment.clone()),
        };

        self.shared.lock().unwrap().state = WriterState::Closed;
        debug!(segment = %self.segment, locations = file.len(), "delta writer drained");
        Ok(file)
    }

    /// Abandon the queue: later sends fail, whatever was already queued is
    /// dropped. Waits for live producers to let go of their senders and
    /// returns how many locations were thrown away.
    pub fn discard(&mut self) -> Result<usize> {
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.state == WriterState::Closed {
                return Ok(0);
            }
            shared.state = WriterState::Draining;
        }

        drop(self.tx.take());
        let dropped = match self.consumer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WalpushError::Other("delta consumer panicked".into()))?
                .len(),
            None => 0,
        };

        self.shared.lock().unwrap().state = WriterState::Closed;
        debug!(segment = %self.segment, dropped, "delta writer discarded");
        Ok(dropped)
    }
}

/// One producer's handle on a [`DeltaFileWriter`]. Dropping it retires the
/// producer.
pub struct LocationSender {
    tx: Sender<BlockLocation>,
    shared: Arc<Mutex<WriterShared>>,
}

impl LocationSender {
    /// Queue one location, blocking while the queue is full.
    pub fn send(&self, location: BlockLocation) -> Result<()> {
        if self.shared.lock().unwrap().state != WriterState::Open {
            return Err(WalpushError::DeltaPrecondition(
                "send on a closed delta writer".into(),
            ));
        }
        self.tx
            .send(location)
            .map_err(|_| WalpushError::DeltaPrecondition("delta consumer is gone".into()))
    }
}

impl Drop for LocationSender {
    fn drop(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        shared.producers = shared.producers.saturating_sub(1);
    }
}
