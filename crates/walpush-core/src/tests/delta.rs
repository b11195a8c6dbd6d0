use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use walpush_types::WalSegmentName;

use crate::delta::{
    DeltaFile, DeltaFileManager, DeltaFileWriter, DeltaRecordingReader, PageTap, WAL_PAGE_SIZE,
};
use crate::error::WalpushError;
use crate::testutil::{block, BrokenParser, ScriptedParser};

fn segment() -> WalSegmentName {
    WalSegmentName::parse("000000010000000000000003").unwrap()
}

#[test]
fn writer_keeps_fifo_order_and_duplicates() {
    let mut writer = DeltaFileWriter::new("seg", 2).unwrap();
    let sender = writer.sender().unwrap();
    let producer = std::thread::spawn(move || {
        for n in [5, 1, 5, 9, 2, 2] {
            sender.send(block(n)).unwrap();
            if n == 9 {
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    });
    producer.join().unwrap();

    let file = writer.close().unwrap();
    let blocks: Vec<u32> = file.locations.iter().map(|l| l.block_no).collect();
    assert_eq!(blocks, [5, 1, 5, 9, 2, 2]);
}

#[test]
fn delta_file_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = DeltaFile::new("000000010000000000000003");
    file.locations = vec![block(1), block(2)];
    let path = dir.path().join("nested/000000010000000000000003.delta");
    file.save(&path).unwrap();
    assert_eq!(DeltaFile::load(&path).unwrap(), file);
}

#[test]
fn manager_creates_writers_lazily_and_flushes() {
    let dir = tempfile::tempdir().unwrap();
    let manager = DeltaFileManager::new(dir.path(), 8);
    assert!(manager.pending_segments().is_empty());
    assert_eq!(manager.flush_segment(&segment()).unwrap(), None);

    let first = manager.location_sender(&segment()).unwrap();
    let second = manager.location_sender(&segment()).unwrap();
    assert_eq!(manager.pending_segments(), [segment()]);
    first.send(block(10)).unwrap();
    second.send(block(11)).unwrap();
    drop(first);

    // A live producer keeps the segment open.
    let err = manager.flush_segment(&segment()).unwrap_err();
    assert!(matches!(err, WalpushError::DeltaPrecondition(_)));
    assert_eq!(manager.pending_segments(), [segment()]);

    drop(second);
    let path = manager.flush_segment(&segment()).unwrap().unwrap();
    assert_eq!(path, dir.path().join("000000010000000000000003.delta"));
    let file = DeltaFile::load(&path).unwrap();
    let blocks: Vec<u32> = file.locations.iter().map(|l| l.block_no).collect();
    assert_eq!(blocks, [10, 11]);
    assert!(manager.pending_segments().is_empty());
}

#[test]
fn flush_all_persists_every_segment() {
    let dir = tempfile::tempdir().unwrap();
    let manager = DeltaFileManager::new(dir.path(), 8);
    for name in ["000000010000000000000002", "000000010000000000000001"] {
        let seg = WalSegmentName::parse(name).unwrap();
        manager.location_sender(&seg).unwrap().send(block(1)).unwrap();
    }
    let paths = manager.flush_all().unwrap();
    assert_eq!(
        paths,
        [
            dir.path().join("000000010000000000000001.delta"),
            dir.path().join("000000010000000000000002.delta"),
        ]
    );
}

#[test]
fn recording_reader_captures_locations_in_emission_order() {
    let dir = tempfile::tempdir().unwrap();
    let manager = DeltaFileManager::new(dir.path(), 1);
    let parser = ScriptedParser::new(vec![vec![block(3), block(1)], vec![], vec![block(2)]]);
    let tap = PageTap::spawn(Box::new(parser), manager.location_sender(&segment()).unwrap())
        .unwrap();

    let wal = vec![0xEEu8; WAL_PAGE_SIZE * 3];
    let mut reader = DeltaRecordingReader::new(Cursor::new(wal.clone()), tap);
    let mut read_back = Vec::new();
    reader.read_to_end(&mut read_back).unwrap();
    assert_eq!(read_back, wal);
    assert_eq!(reader.close().unwrap(), 3);

    let path = manager.flush_segment(&segment()).unwrap().unwrap();
    let blocks: Vec<u32> = DeltaFile::load(&path)
        .unwrap()
        .locations
        .iter()
        .map(|l| l.block_no)
        .collect();
    assert_eq!(blocks, [3, 1, 2]);
}

#[test]
fn trailing_partial_page_reaches_parser_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let manager = DeltaFileManager::new(dir.path(), 4);
    let parser = ScriptedParser::new(vec![vec![block(1)], vec![block(2)]]);
    let tap = PageTap::spawn(Box::new(parser), manager.location_sender(&segment()).unwrap())
        .unwrap();

    let mut reader = DeltaRecordingReader::new(Cursor::new(vec![0u8; WAL_PAGE_SIZE + 100]), tap);
    std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
    assert_eq!(reader.close().unwrap(), 2);
}

#[test]
fn parser_failure_does_not_break_the_read() {
    let dir = tempfile::tempdir().unwrap();
    let manager = DeltaFileManager::new(dir.path(), 4);
    let tap = PageTap::spawn(Box::new(BrokenParser), manager.location_sender(&segment()).unwrap())
        .unwrap();

    let wal = vec![1u8; WAL_PAGE_SIZE * 40];
    let mut reader = DeltaRecordingReader::new(Cursor::new(wal.clone()), tap);
    let mut read_back = Vec::new();
    reader.read_to_end(&mut read_back).unwrap();
    assert_eq!(read_back, wal);
    assert!(reader.close().is_err());

    // The failed producer is retired, so the segment can still be flushed.
    assert!(manager.flush_segment(&segment()).unwrap().is_some());
}

#[test]
fn dropping_the_reader_retires_its_producer() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(DeltaFileManager::new(dir.path(), 4));
    let parser = ScriptedParser::new(vec![vec![block(7)]]);
    let tap = PageTap::spawn(Box::new(parser), manager.location_sender(&segment()).unwrap())
        .unwrap();
    let mut reader = DeltaRecordingReader::new(Cursor::new(vec![0u8; WAL_PAGE_SIZE]), tap);
    std::io::copy(&mut reader, &mut std::io::sink()).unwrap();
    drop(reader);

    let path = manager.flush_segment(&segment()).unwrap().unwrap();
    assert_eq!(DeltaFile::load(&path).unwrap().locations, vec![block(7)]);
}
