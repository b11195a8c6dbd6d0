use std::fmt;

use serde::{Deserialize, Serialize};

/// Physical identity of a relation: tablespace, database and relation file node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RelFileNode {
    pub spc_node: u32,
    pub db_node: u32,
    pub rel_node: u32,
}

/// Relation fork a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ForkNumber {
    #[default]
    Main,
    FreeSpaceMap,
    VisibilityMap,
    Init,
}

impl ForkNumber {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ForkNumber::Main),
            1 => Some(ForkNumber::FreeSpaceMap),
            2 => Some(ForkNumber::VisibilityMap),
            3 => Some(ForkNumber::Init),
            _ => None,
        }
    }
}

/// Log sequence number, printed the way the database prints it (`16/B374D848`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn(pub u64);

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 as u32)
    }
}

/// A modified page and the log position of the change that touched it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    pub rel: RelFileNode,
    pub fork: ForkNumber,
    pub block_no: u32,
    pub lsn: Lsn,
}

impl BlockLocation {
    pub fn new(rel: RelFileNode, fork: ForkNumber, block_no: u32, lsn: Lsn) -> Self {
        Self {
            rel,
            fork,
            block_no,
            lsn,
        }
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} {:?} blk {} @ {}",
            self.rel.spc_node, self.rel.db_node, self.rel.rel_node, self.fork, self.block_no, self.lsn
        )
    }
}
