use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::compress::pipe::build_chain;
use crate::compress::Compression;
use crate::crypto::{AesGcmCrypter, NoCrypter};
use crate::sink::{ChainedSink, Layer, SharedBuffer};

/// Records its close in a shared journal.
struct RecordingLayer {
    name: &'static str,
    inner: Option<Box<dyn Layer>>,
    journal: Arc<Mutex<Vec<&'static str>>>,
}

impl Write for RecordingLayer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Layer for RecordingLayer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn close(self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
        self.journal.lock().unwrap().push(self.name);
        Ok(self.inner)
    }
}

#[test]
fn closes_top_down_with_sink_last() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let mut chain = ChainedSink::new(Box::new(RecordingLayer {
        name: "sink",
        inner: None,
        journal: journal.clone(),
    }));
    for name in ["encrypt", "compress"] {
        let journal = journal.clone();
        chain
            .push(move |below| {
                Ok(Box::new(RecordingLayer {
                    name,
                    inner: Some(below),
                    journal,
                }) as Box<dyn Layer>)
            })
            .unwrap();
    }

    assert_eq!(chain.close_order(), vec!["compress", "encrypt", "sink"]);
    chain.write_all(b"payload").unwrap();
    let closed = chain.close().unwrap();
    assert_eq!(closed, vec!["compress", "encrypt", "sink"]);
    assert_eq!(*journal.lock().unwrap(), vec!["compress", "encrypt", "sink"]);
}

#[test]
fn inactive_crypter_is_left_out_of_chain() {
    let chain = build_chain(
        Box::new(SharedBuffer::new()),
        &Compression::Lz4,
        Some(&NoCrypter),
    )
    .unwrap();
    assert_eq!(chain.close_order(), vec!["lz4", "buffer"]);
}

#[test]
fn active_crypter_sits_between_compressor_and_sink() {
    let crypter = AesGcmCrypter::new(&[3u8; 32]);
    let chain = build_chain(
        Box::new(SharedBuffer::new()),
        &Compression::Zstd { level: 1 },
        Some(&crypter),
    )
    .unwrap();
    assert_eq!(chain.close_order(), vec!["zstd", "aes-gcm", "buffer"]);
}

#[test]
fn failing_layer_stops_cascade() {
    struct Failing(Box<dyn Layer>);
    impl Write for Failing {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
    impl Layer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn close(self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
            Err(io::Error::other("trailer write failed"))
        }
    }

    let mut chain = ChainedSink::new(Box::new(SharedBuffer::new()));
    chain
        .push(|below| Ok(Box::new(Failing(below)) as Box<dyn Layer>))
        .unwrap();
    assert!(chain.close().is_err());
    assert!(chain.is_closed());
}
