//! Block-level delta tracking for WAL segments.

mod file;
mod manager;
mod recording;
mod writer;

pub use file::DeltaFile;
pub use manager::DeltaFileManager;
pub use recording::{DeltaRecordingReader, PageTap, ParserFactory, WalParser, WAL_PAGE_SIZE};
pub use writer::{DeltaFileWriter, LocationSender, WriterState};
