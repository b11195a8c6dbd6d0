use std::collections::VecDeque;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use walpush_types::{BlockLocation, ForkNumber, Lsn, RelFileNode};

use crate::compress::{Compression, Compressor};
use crate::crypto::{Crypter, NoCrypter};
use crate::delta::WalParser;
use crate::error::Result;

/// One archive member read back from a part.
#[derive(Debug, Clone)]
pub struct TarMember {
    pub path: String,
    pub entry_type: tar::EntryType,
    pub declared_size: u64,
    pub data: Vec<u8>,
}

pub fn block(block_no: u32) -> BlockLocation {
    BlockLocation::new(
        RelFileNode {
            spc_node: 1663,
            db_node: 16384,
            rel_node: 16385,
        },
        ForkNumber::Main,
        block_no,
        Lsn(0x1_0000_0000 + block_no as u64),
    )
}

/// Hands out a fixed list of location batches, one batch per page. Pages past
/// the end of the script yield nothing.
pub struct ScriptedParser {
    script: VecDeque<Vec<BlockLocation>>,
}

impl ScriptedParser {
    pub fn new(script: Vec<Vec<BlockLocation>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl WalParser for ScriptedParser {
    fn parse_page(&mut self, _page: &[u8]) -> Result<Vec<BlockLocation>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}

/// Fails on the first page.
pub struct BrokenParser;

impl WalParser for BrokenParser {
    fn parse_page(&mut self, _page: &[u8]) -> Result<Vec<BlockLocation>> {
        Err(crate::error::WalpushError::Other("unparseable page".into()))
    }
}

pub fn no_crypter() -> Arc<dyn Crypter> {
    Arc::new(NoCrypter)
}

pub fn lz4() -> Arc<dyn Compressor> {
    Arc::new(Compression::Lz4)
}

/// Decrypt (when `crypter` is active) and decompress a finished stream.
pub fn unpack(bytes: Vec<u8>, compressor: &dyn Compressor, crypter: &dyn Crypter) -> Vec<u8> {
    let source: Box<dyn Read + Send> = Box::new(Cursor::new(bytes));
    let source = if crypter.is_used() {
        crypter.decrypt(source).unwrap()
    } else {
        source
    };
    let mut reader = compressor.new_reader(source).unwrap();
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

/// Read every member of an uncompressed tar stream.
pub fn tar_members(tar_bytes: &[u8]) -> Vec<TarMember> {
    let mut archive = tar::Archive::new(tar_bytes);
    let mut members = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let path = entry.path().unwrap().to_string_lossy().into_owned();
        let entry_type = entry.header().entry_type();
        let declared_size = entry.header().size().unwrap();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        members.push(TarMember {
            path,
            entry_type,
            declared_size,
            data,
        });
    }
    members
}

/// A small data directory:
///
/// ```text
/// PG_VERSION
/// base/1/1259
/// base/1/2608
/// global/pg_control
/// pg_wal/000000010000000000000001
/// pg_wal/archive_status/
/// postmaster.pid
/// ```
pub fn data_dir(root: &Path) {
    let write = |rel: &str, body: &[u8]| {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    };
    write("PG_VERSION", b"16\n");
    write("base/1/1259", &vec![7u8; 3000]);
    write("base/1/2608", &vec![9u8; 10_000]);
    write("global/pg_control", &vec![1u8; 512]);
    write("pg_wal/000000010000000000000001", &vec![2u8; 8192]);
    std::fs::create_dir_all(root.join("pg_wal/archive_status")).unwrap();
    write("postmaster.pid", b"4242\n");
}
