pub mod block_location;
pub mod error;
pub mod wal_name;

pub use block_location::{BlockLocation, ForkNumber, Lsn, RelFileNode};
pub use wal_name::{is_wal_filename, WalSegmentName};
