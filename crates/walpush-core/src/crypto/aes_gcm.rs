use std::io::{self, Read, Write};

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use super::Crypter;
use crate::error::{Result, WalpushError};
use crate::sink::Layer;

/// Plaintext bytes sealed per frame.
pub const FRAME_SIZE: usize = 64 * 1024;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const FRAME_HEADER_LEN: usize = 1 + 4 + NONCE_LEN;
const FLAG_FINAL: u8 = 0x01;

/// AES-256-GCM stream encryption.
///
/// Wire format, repeated per frame:
/// `[1-byte flags][u32 LE ciphertext length][12-byte nonce][ciphertext + 16-byte tag]`.
/// The frame index and flags are bound as AAD, so reordered, dropped or
/// truncated frames fail authentication. Every stream ends with exactly one
/// frame carrying `FLAG_FINAL`, possibly empty.
#[derive(Clone)]
pub struct AesGcmCrypter {
    cipher: Aes256Gcm,
}

impl AesGcmCrypter {
    pub fn new(key: &[u8; 32]) -> Self {
        let key: &Key<Aes256Gcm> = key.into();
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Build from a hex-encoded 256-bit key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(hex_key.trim())
                .map_err(|e| WalpushError::Config(format!("encryption key is not hex: {e}")))?,
        );
        let key: &[u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            WalpushError::Config(format!(
                "encryption key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::new(key))
    }
}

impl Crypter for AesGcmCrypter {
    fn is_used(&self) -> bool {
        true
    }

    fn encrypt(&self, sink: Box<dyn Layer>) -> Result<Box<dyn Layer>> {
        Ok(Box::new(EncryptingLayer {
            cipher: self.cipher.clone(),
            inner: sink,
            pending: Vec::with_capacity(FRAME_SIZE),
            frame_index: 0,
        }))
    }

    fn decrypt(&self, source: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(DecryptingReader {
            cipher: self.cipher.clone(),
            inner: source,
            plain: Vec::new(),
            pos: 0,
            frame_index: 0,
            finished: false,
        }))
    }
}

fn frame_aad(index: u64, flags: u8) -> [u8; 9] {
    let mut aad = [0u8; 9];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8] = flags;
    aad
}

struct EncryptingLayer {
    cipher: Aes256Gcm,
    inner: Box<dyn Layer>,
    pending: Vec<u8>,
    frame_index: u64,
}

impl EncryptingLayer {
    fn seal(&mut self, len: usize, flags: u8) -> io::Result<()> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let aad = frame_aad(self.frame_index, flags);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &self.pending[..len],
                    aad: &aad,
                },
            )
            .map_err(|e| {
                io::Error::other(WalpushError::Crypto(format!("AES-GCM encrypt: {e}")))
            })?;

        let mut header = [0u8; FRAME_HEADER_LEN];
        header[0] = flags;
        header[1..5].copy_from_slice(&(ciphertext.len() as u32).to_le_bytes());
        header[5..].copy_from_slice(&nonce_bytes);
        self.inner.write_all(&header)?;
        self.inner.write_all(&ciphertext)?;

        self.pending.drain(..len);
        self.frame_index += 1;
        Ok(())
    }
}

impl Write for EncryptingLayer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while self.pending.len() >= FRAME_SIZE {
            self.seal(FRAME_SIZE, 0)?;
        }
        Ok(buf.len())
    }

    // Partial frames stay buffered; only the final frame may be short.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Layer for EncryptingLayer {
    fn name(&self) -> &'static str {
        "aes-gcm"
    }

    fn close(mut self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
        let len = self.pending.len();
        self.seal(len, FLAG_FINAL)?;
        self.inner.flush()?;
        Ok(Some(self.inner))
    }
}

struct DecryptingReader {
    cipher: Aes256Gcm,
    inner: Box<dyn Read + Send>,
    plain: Vec<u8>,
    pos: usize,
    frame_index: u64,
    finished: bool,
}

impl DecryptingReader {
    fn open_next(&mut self) -> io::Result<()> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        self.inner.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "encrypted stream truncated before final frame",
                )
            } else {
                e
            }
        })?;
        let flags = header[0];
        let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        if len < TAG_LEN || len > FRAME_SIZE + TAG_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("encrypted frame length {len} out of range"),
            ));
        }
        let mut ciphertext = vec![0u8; len];
        self.inner.read_exact(&mut ciphertext)?;

        let aad = frame_aad(self.frame_index, flags);
        self.plain = self
            .cipher
            .decrypt(
                Nonce::from_slice(&header[5..]),
                Payload {
                    msg: &ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, WalpushError::DecryptionFailed)
            })?;
        self.pos = 0;
        self.frame_index += 1;
        self.finished = flags & FLAG_FINAL != 0;
        Ok(())
    }
}

impl Read for DecryptingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.plain.len() {
                let n = buf.len().min(self.plain.len() - self.pos);
                buf[..n].copy_from_slice(&self.plain[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.open_next()?;
        }
    }
}
