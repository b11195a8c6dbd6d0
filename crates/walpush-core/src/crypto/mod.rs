pub mod aes_gcm;

use std::io::Read;

use crate::error::Result;
use crate::sink::Layer;

pub use self::aes_gcm::AesGcmCrypter;

/// Encryption capability applied between the compressor and the sink.
pub trait Crypter: Send + Sync {
    /// Whether this crypter actually encrypts. Inactive crypters are left
    /// out of writer chains entirely.
    fn is_used(&self) -> bool;

    /// Wrap `sink` so bytes written to the result arrive encrypted.
    fn encrypt(&self, sink: Box<dyn Layer>) -> Result<Box<dyn Layer>>;

    /// Reverse of [`encrypt`](Crypter::encrypt).
    fn decrypt(&self, source: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>>;
}

/// Crypter used when no key is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCrypter;

impl Crypter for NoCrypter {
    fn is_used(&self) -> bool {
        false
    }

    fn encrypt(&self, sink: Box<dyn Layer>) -> Result<Box<dyn Layer>> {
        Ok(sink)
    }

    fn decrypt(&self, source: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        Ok(source)
    }
}
