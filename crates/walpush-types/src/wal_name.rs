use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WalpushError};

const WAL_NAME_LEN: usize = 24;

/// Parsed WAL segment file name: `TTTTTTTTLLLLLLLLSSSSSSSS` in upper-case hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalSegmentName {
    pub timeline: u32,
    pub log_id: u32,
    pub segment: u32,
}

impl WalSegmentName {
    pub fn parse(name: &str) -> Result<Self> {
        if !is_wal_filename(name) {
            return Err(WalpushError::InvalidWalName(name.to_string()));
        }
        let field = |range: std::ops::Range<usize>| {
            u32::from_str_radix(&name[range], 16)
                .map_err(|_| WalpushError::InvalidWalName(name.to_string()))
        };
        Ok(Self {
            timeline: field(0..8)?,
            log_id: field(8..16)?,
            segment: field(16..24)?,
        })
    }
}

impl FromStr for WalSegmentName {
    type Err = WalpushError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for WalSegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}{:08X}{:08X}", self.timeline, self.log_id, self.segment)
    }
}

/// Whether `name` is a bare WAL segment file name (no history/backup/partial suffix).
pub fn is_wal_filename(name: &str) -> bool {
    name.len() == WAL_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
}
