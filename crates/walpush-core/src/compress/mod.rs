pub mod pipe;

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::config::CompressionAlgorithm;
use crate::error::{Result, WalpushError};
use crate::sink::Layer;

pub use pipe::{CompressingPipe, PipeReader};

/// Streaming compressor capability.
pub trait Compressor: Send + Sync {
    /// Wrap `sink` so bytes written to the result arrive compressed.
    fn new_writer(&self, sink: Box<dyn Layer>) -> Result<Box<dyn Layer>>;

    /// Reverse of [`new_writer`](Compressor::new_writer).
    fn new_reader(&self, source: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>>;

    /// Extension appended to object and part names (`part_001.tar.<ext>`).
    fn file_extension(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Compression {
    None,
    #[default]
    Lz4,
    Zstd {
        level: i32,
    },
}

impl Compression {
    /// Parse from config string like "lz4", "zstd", "none".
    pub fn from_config(algorithm: &str, zstd_level: i32) -> Result<Self> {
        match algorithm {
            "none" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd { level: zstd_level }),
            "lzo" => Err(lzo_unsupported()),
            other => Err(WalpushError::Config(format!(
                "unknown compression algorithm: {other}"
            ))),
        }
    }

    pub fn from_algorithm(algorithm: CompressionAlgorithm, zstd_level: i32) -> Result<Self> {
        match algorithm {
            CompressionAlgorithm::None => Ok(Compression::None),
            CompressionAlgorithm::Lz4 => Ok(Compression::Lz4),
            CompressionAlgorithm::Zstd => Ok(Compression::Zstd { level: zstd_level }),
            CompressionAlgorithm::Lzo => Err(lzo_unsupported()),
        }
    }
}

fn lzo_unsupported() -> WalpushError {
    WalpushError::Config("lzo support is not compiled into this build".into())
}

impl Compressor for Compression {
    fn new_writer(&self, sink: Box<dyn Layer>) -> Result<Box<dyn Layer>> {
        match *self {
            Compression::None => Ok(sink),
            Compression::Lz4 => Ok(Box::new(Lz4Layer {
                encoder: lz4_flex::frame::FrameEncoder::new(sink),
            })),
            Compression::Zstd { level } => {
                let encoder = zstd::stream::write::Encoder::new(sink, level)
                    .map_err(|e| WalpushError::ChainSetup(format!("zstd init: {e}")))?;
                Ok(Box::new(ZstdLayer { encoder }))
            }
        }
    }

    fn new_reader(&self, source: Box<dyn Read + Send>) -> Result<Box<dyn Read + Send>> {
        match *self {
            Compression::None => Ok(source),
            Compression::Lz4 => Ok(Box::new(lz4_flex::frame::FrameDecoder::new(source))),
            Compression::Zstd { .. } => {
                let decoder = zstd::stream::read::Decoder::new(source)
                    .map_err(|e| WalpushError::Compression(format!("zstd init: {e}")))?;
                Ok(Box::new(decoder))
            }
        }
    }

    fn file_extension(&self) -> &'static str {
        match self {
            Compression::None => "raw",
            Compression::Lz4 => "lz4",
            Compression::Zstd { .. } => "zst",
        }
    }
}

struct Lz4Layer {
    encoder: lz4_flex::frame::FrameEncoder<Box<dyn Layer>>,
}

impl Write for Lz4Layer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl Layer for Lz4Layer {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn close(self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
        let inner = self.encoder.finish().map_err(io::Error::other)?;
        Ok(Some(inner))
    }
}

struct ZstdLayer {
    encoder: zstd::stream::write::Encoder<'static, Box<dyn Layer>>,
}

impl Write for ZstdLayer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl Layer for ZstdLayer {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn close(self: Box<Self>) -> io::Result<Option<Box<dyn Layer>>> {
        Ok(Some(self.encoder.finish()?))
    }
}
