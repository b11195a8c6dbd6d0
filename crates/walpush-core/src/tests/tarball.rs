use std::sync::Arc;

use crate::compress::Compression;
use crate::crypto::{AesGcmCrypter, Crypter, NoCrypter};
use crate::tarball::{
    part_name, BufferTarBallMaker, FileTarBallMaker, PartLocation, TarBall, TarBallMaker,
};
use crate::testutil::{lz4, no_crypter, tar_members, unpack};

fn append_file(tb: &mut dyn TarBall, path: &str, body: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(body.len() as u64);
    header.set_mode(0o600);
    tb.tar_writer()
        .unwrap()
        .append_data(&mut header, path, body)
        .unwrap();
}

#[test]
fn part_names_are_zero_padded() {
    assert_eq!(part_name(1, "lz4"), "part_001.tar.lz4");
    assert_eq!(part_name(42, "zst"), "part_042.tar.zst");
    assert_eq!(part_name(1234, "raw"), "part_1234.tar.raw");
}

#[test]
fn set_up_is_idempotent() {
    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut tb = maker.make();
    assert!(!tb.is_set_up());
    assert!(tb.tar_writer().is_err());
    tb.set_up().unwrap();
    append_file(tb.as_mut(), "a", b"first");
    tb.set_up().unwrap();
    append_file(tb.as_mut(), "b", b"second");
    let part = tb.close_tar().unwrap();

    let PartLocation::Memory(buffer) = part.location else {
        panic!("expected an in-memory part");
    };
    let members = tar_members(&unpack(buffer.contents(), &Compression::Lz4, &NoCrypter));
    let paths: Vec<_> = members.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, ["a", "b"]);
}

#[test]
fn makers_number_parts_from_one() {
    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let numbers: Vec<u32> = (0..3).map(|_| maker.make().number()).collect();
    assert_eq!(numbers, [1, 2, 3]);
    assert_eq!(maker.buffers().len(), 3);
}

#[test]
fn size_counter_accumulates() {
    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut tb = maker.make();
    assert_eq!(tb.size(), 0);
    tb.add_size(512);
    tb.add_size(1024);
    assert_eq!(tb.size(), 1536);
}

#[test]
fn file_part_is_written_encrypted_and_compressed() {
    let dir = tempfile::tempdir().unwrap();
    let crypter = AesGcmCrypter::new(&[6u8; 32]);
    let compression = Compression::Zstd { level: 3 };
    let mut maker = FileTarBallMaker::new(
        dir.path(),
        Arc::new(compression),
        Arc::new(crypter.clone()) as Arc<dyn Crypter>,
    );
    let mut tb = maker.make();
    tb.set_up().unwrap();
    append_file(tb.as_mut(), "base/1/1259", &[3u8; 5000]);
    let part = tb.close_tar().unwrap();
    tb.finish().unwrap();

    assert_eq!(part.number, 1);
    assert_eq!(part.name, "part_001.tar.zst");
    let PartLocation::File(path) = &part.location else {
        panic!("expected a file part");
    };
    assert_eq!(path, &dir.path().join("part_001.tar.zst"));

    let bytes = std::fs::read(path).unwrap();
    let members = tar_members(&unpack(bytes, &compression, &crypter));
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].data, vec![3u8; 5000]);
}

#[test]
fn file_part_in_missing_directory_fails_set_up() {
    let dir = tempfile::tempdir().unwrap();
    let mut maker = FileTarBallMaker::new(dir.path().join("nope"), lz4(), no_crypter());
    let mut tb = maker.make();
    let err = tb.set_up().unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn close_before_set_up_fails() {
    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut tb = maker.make();
    assert!(tb.close_tar().is_err());
}
