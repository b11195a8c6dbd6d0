use std::fs;
use std::path::Path;

use crate::bundle::{archive_entry, archived_len, Bundle, EntryKind, WalkEntry, WalkSummary};
use crate::compress::Compression;
use crate::config::BundleConfig;
use crate::crypto::NoCrypter;
use crate::error::{Result, WalpushError};
use crate::tarball::{BufferTarBallMaker, CompletedPart, PartLocation, TarBallMaker};
use crate::testutil::{data_dir, lz4, no_crypter, tar_members, unpack, TarMember};

fn members_of(part: &CompletedPart) -> Vec<TarMember> {
    let PartLocation::Memory(buffer) = &part.location else {
        panic!("expected an in-memory part");
    };
    tar_members(&unpack(buffer.contents(), &Compression::Lz4, &NoCrypter))
}

fn paths(members: &[TarMember]) -> Vec<String> {
    members.iter().map(|m| m.path.clone()).collect()
}

fn walk(bundle: &mut Bundle, root: &Path) -> (WalkSummary, Vec<CompletedPart>) {
    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut parts = Vec::new();
    let mut handler = |part: CompletedPart| -> Result<()> {
        parts.push(part);
        Ok(())
    };
    let summary = bundle.walk(root, &mut maker, &mut handler).unwrap();
    (summary, parts)
}

fn flat_tree(root: &Path) {
    fs::write(root.join("a"), b"aaaa").unwrap();
    fs::write(root.join("b"), vec![1u8; 2000]).unwrap();
    fs::write(root.join("c"), b"").unwrap();
    fs::create_dir(root.join("d")).unwrap();
    fs::write(root.join("d/e"), b"eeee").unwrap();
}

#[test]
fn unbounded_min_size_yields_one_part_in_walk_order() {
    let dir = tempfile::tempdir().unwrap();
    flat_tree(dir.path());
    let mut bundle = Bundle::new(u64::MAX);
    let (summary, parts) = walk(&mut bundle, dir.path());

    assert_eq!(summary.parts, 1);
    assert_eq!(summary.entries, 5);
    assert!(!summary.sentinel_archived);
    assert_eq!(parts.len(), 1);
    assert_eq!(paths(&members_of(&parts[0])), ["a", "b", "c", "d", "d/e"]);
}

#[test]
fn zero_min_size_yields_one_part_per_entry() {
    let dir = tempfile::tempdir().unwrap();
    flat_tree(dir.path());
    let mut bundle = Bundle::new(0);
    let (summary, parts) = walk(&mut bundle, dir.path());

    assert_eq!(summary.parts, 5);
    let numbers: Vec<u32> = parts.iter().map(|p| p.number).collect();
    assert_eq!(numbers, [1, 2, 3, 4, 5]);
    let per_part: Vec<Vec<String>> = parts.iter().map(|p| paths(&members_of(p))).collect();
    assert_eq!(
        per_part,
        [vec!["a"], vec!["b"], vec!["c"], vec!["d"], vec!["d/e"]]
    );
}

#[test]
fn parts_switch_only_between_entries() {
    let dir = tempfile::tempdir().unwrap();
    flat_tree(dir.path());
    // "a" alone fills 1024 bytes; "b" still lands in the first part.
    let mut bundle = Bundle::new(archived_len(4));
    let (_, parts) = walk(&mut bundle, dir.path());

    let per_part: Vec<Vec<String>> = parts.iter().map(|p| paths(&members_of(p))).collect();
    assert_eq!(per_part[0], ["a", "b"]);
    for part in &parts {
        for member in members_of(part) {
            assert_eq!(member.declared_size, member.data.len() as u64);
        }
    }
    assert_eq!(parts[0].archived_bytes, archived_len(4) + archived_len(2000));
}

#[test]
fn excluded_directory_is_header_only_and_sentinel_goes_last() {
    let dir = tempfile::tempdir().unwrap();
    data_dir(dir.path());
    let mut bundle = Bundle::from_config(&BundleConfig {
        min_part_size: u64::MAX,
        ..BundleConfig::default()
    });
    let (summary, parts) = walk(&mut bundle, dir.path());

    assert_eq!(summary.parts, 2);
    assert!(summary.sentinel_archived);
    assert!(bundle.sentinel().is_some());

    let main = members_of(&parts[0]);
    assert_eq!(
        paths(&main),
        ["PG_VERSION", "base", "base/1", "base/1/1259", "base/1/2608", "global", "pg_wal"]
    );
    let pg_wal = main.iter().find(|m| m.path == "pg_wal").unwrap();
    assert!(pg_wal.entry_type.is_dir());
    assert_eq!(pg_wal.declared_size, 0);
    assert!(main.iter().all(|m| !m.path.starts_with("pg_wal/")));
    assert!(main.iter().all(|m| m.path != "postmaster.pid"));

    let last = parts.last().unwrap();
    assert_eq!(last.number, 2);
    let sentinel = members_of(last);
    assert_eq!(paths(&sentinel), ["global/pg_control"]);
    assert_eq!(sentinel[0].data, vec![1u8; 512]);
}

#[test]
fn shrunken_file_is_zero_padded_to_declared_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relation");
    fs::write(&path, vec![5u8; 1000]).unwrap();
    let entry = WalkEntry {
        path: path.clone(),
        rel_path: "relation".into(),
        metadata: fs::metadata(&path).unwrap(),
        kind: EntryKind::Archived,
    };
    fs::write(&path, vec![5u8; 100]).unwrap();

    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut tb = maker.make();
    tb.set_up().unwrap();
    let written = archive_entry(tb.as_mut(), &entry).unwrap();
    let part = tb.close_tar().unwrap();

    assert_eq!(written, archived_len(1000));
    let members = members_of(&part);
    assert_eq!(members[0].declared_size, 1000);
    let mut expected = vec![5u8; 100];
    expected.resize(1000, 0);
    assert_eq!(members[0].data, expected);
}

#[test]
fn grown_file_is_cut_at_declared_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relation");
    fs::write(&path, vec![5u8; 100]).unwrap();
    let entry = WalkEntry {
        path: path.clone(),
        rel_path: "relation".into(),
        metadata: fs::metadata(&path).unwrap(),
        kind: EntryKind::Archived,
    };
    fs::write(&path, vec![6u8; 5000]).unwrap();

    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut tb = maker.make();
    tb.set_up().unwrap();
    archive_entry(tb.as_mut(), &entry).unwrap();
    let members = members_of(&tb.close_tar().unwrap());
    assert_eq!(members[0].data, vec![6u8; 100]);
}

#[test]
fn missing_root_is_a_walk_error_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("gone");
    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut handler = |_: CompletedPart| -> Result<()> { Ok(()) };
    let err = Bundle::new(0)
        .walk(&root, &mut maker, &mut handler)
        .unwrap_err();
    assert!(matches!(err, WalpushError::Walk { path, .. } if path == root));
}

#[test]
fn handler_error_aborts_walk() {
    let dir = tempfile::tempdir().unwrap();
    flat_tree(dir.path());
    let mut maker = BufferTarBallMaker::new(lz4(), no_crypter());
    let mut handler =
        |_: CompletedPart| -> Result<()> { Err(WalpushError::Other("upload refused".into())) };
    let err = Bundle::new(0)
        .walk(dir.path(), &mut maker, &mut handler)
        .unwrap_err();
    assert!(matches!(err, WalpushError::Other(msg) if msg == "upload refused"));
}

#[cfg(unix)]
#[test]
fn symlinks_are_archived_as_links() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("target"), b"t").unwrap();
    std::os::unix::fs::symlink("target", dir.path().join("link")).unwrap();
    let mut bundle = Bundle::new(u64::MAX);
    let (_, parts) = walk(&mut bundle, dir.path());

    let members = members_of(&parts[0]);
    let link = members.iter().find(|m| m.path == "link").unwrap();
    assert_eq!(link.entry_type, tar::EntryType::Symlink);
    assert!(link.data.is_empty());
}
