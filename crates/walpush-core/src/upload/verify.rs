use std::io::{self, Read};

use md5::{Digest, Md5};

/// Passes bytes through while hashing them with MD5, the digest object
/// stores report as a single-part ETag.
pub struct Md5Reader<R> {
    inner: R,
    hasher: Md5,
    bytes: u64,
}

impl<R: Read> Md5Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
            bytes: 0,
        }
    }

    /// Lower-case hex digest of everything read so far.
    pub fn hex_digest(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }
}

impl<R: Read> Read for Md5Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Compare a stored content tag with a local digest, ignoring the quotes
/// stores wrap ETags in.
pub fn tag_matches(tag: &str, hex_digest: &str) -> bool {
    tag.trim_matches('"') == hex_digest
}
