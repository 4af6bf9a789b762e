//! Tests for malformed and hostile archive input.
//!
//! Every case must end in a classified error (or a clean, reduced result
//! where the API promises one); none may panic.

mod common;

use common::{Entry, RarBuilder, SIGNATURE, frame, vint, write_file};
use rarkit::{
    Archive, CommentState, Error, ErrorCode, Limits, OpenMode, OpenRequest, Operation,
    ProcessOutcome, list_entries,
};
use tempfile::tempdir;

fn find(haystack: &[u8], needle: &[u8]) -> usize {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap()
}

#[test]
fn test_not_an_archive() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "text.rar", b"just some text, no signature here");

    let err = Archive::open(&path).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat(_)));
    assert_eq!(err.code(), ErrorCode::BadArchive);
}

#[test]
fn test_empty_file() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "empty.rar", b"");
    assert_eq!(Archive::open(&path).unwrap_err().code(), ErrorCode::BadArchive);
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    let err = Archive::open(dir.path().join("absent.rar")).unwrap_err();
    assert!(matches!(err, Error::Open { .. }));
    assert_eq!(err.code(), ErrorCode::EOpen);
}

#[test]
fn test_legacy_format() {
    let dir = tempdir().unwrap();
    let mut bytes = b"Rar!\x1A\x07\x00".to_vec();
    bytes.extend_from_slice(&[0u8; 32]);
    let path = write_file(dir.path(), "old.rar", &bytes);

    let err = Archive::open(&path).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(_)));
    assert_eq!(err.code(), ErrorCode::UnknownFormat);
}

#[test]
fn test_signature_only() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "sig.rar", SIGNATURE);
    let err = Archive::open(&path).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadArchive);
}

#[test]
fn test_damaged_main_header() {
    let dir = tempdir().unwrap();
    let mut bytes = RarBuilder::new().file("a.txt", b"a").build();
    // First byte of the main header's CRC.
    bytes[SIGNATURE.len()] ^= 0xFF;
    let path = write_file(dir.path(), "main.rar", &bytes);

    let err = Archive::open(&path).unwrap_err();
    assert_eq!(err.code(), ErrorCode::BadArchive);
}

#[test]
fn test_first_block_not_main() {
    let dir = tempdir().unwrap();
    let mut bytes = SIGNATURE.to_vec();
    let mut end = Vec::new();
    vint(&mut end, 5);
    vint(&mut end, 0);
    vint(&mut end, 0);
    bytes.extend(frame(&end));
    let path = write_file(dir.path(), "nomain.rar", &bytes);

    assert_eq!(Archive::open(&path).unwrap_err().code(), ErrorCode::BadArchive);
}

#[test]
fn test_damaged_entry_header() {
    let dir = tempdir().unwrap();
    let mut bytes = RarBuilder::new()
        .file("first.txt", b"one")
        .file("second.txt", b"two")
        .file("third.txt", b"three")
        .build();
    let at = find(&bytes, b"second.txt");
    bytes[at] ^= 0x20;
    let path = write_file(dir.path(), "damaged.rar", &bytes);

    let err = list_entries(&path).unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(err.code(), ErrorCode::BadData);

    // Keeping broken data reads the damaged header anyway.
    let mut archive = Archive::open(OpenRequest::new(&path).keep_broken(true)).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = archive.read_header().unwrap() {
        names.push(entry.name);
        assert_eq!(
            archive.process_file(Operation::Skip, None).unwrap(),
            ProcessOutcome::Skipped
        );
    }
    assert_eq!(names.len(), 3);
    assert_eq!(names[0], "first.txt");
    assert_eq!(names[1], "Second.txt");
}

#[test]
fn test_truncated_archive() {
    let dir = tempdir().unwrap();
    let data = common::sample_data(5_000, 8);
    let bytes = RarBuilder::new().file("big.bin", &data).build();
    let at = find(&bytes, b"big.bin") + 7 + 2_000;
    let path = write_file(dir.path(), "cut.rar", &bytes[..at]);

    // Headers are intact, so listing works up to the cut.
    let mut archive = Archive::open(OpenRequest::new(&path).mode(OpenMode::Extract)).unwrap();
    let entry = archive.read_header().unwrap().unwrap();
    assert_eq!(entry.unpacked_size, 5_000);
    let mut sink = Vec::new();
    let err = archive.process_to_writer(&mut sink).unwrap_err();
    assert!(err.is_corruption(), "{err}");
    assert_eq!(err.code(), ErrorCode::BadData);
}

#[test]
fn test_truncation_never_panics() {
    let dir = tempdir().unwrap();
    let bytes = RarBuilder::new()
        .comment("note")
        .file("a.txt", b"alpha")
        .entry(Entry::dir("d"))
        .entry(Entry::file("d/b.bin", &common::sample_data(300, 1)).blake2())
        .build();

    for len in 0..bytes.len() {
        let path = write_file(dir.path(), "t.rar", &bytes[..len]);
        let Ok(mut archive) = Archive::open(OpenRequest::new(&path).mode(OpenMode::Extract)) else {
            continue;
        };
        loop {
            match archive.read_header() {
                Ok(Some(_)) => {
                    let mut sink = Vec::new();
                    if archive.process_to_writer(&mut sink).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
    }
}

#[test]
fn test_header_size_limit() {
    let dir = tempdir().unwrap();
    let path = RarBuilder::new()
        .file(&"long-name/".repeat(40), b"x")
        .write_to(dir.path(), "long.rar");

    let limits = Limits::default().max_header_size(64);
    let err = Archive::entries(OpenRequest::new(&path).limits(limits)).unwrap_err();
    assert!(err.is_corruption() || err.code() == ErrorCode::NoMemory, "{err}");
}

#[test]
fn test_comment_size_limit() {
    let dir = tempdir().unwrap();
    let path = RarBuilder::new()
        .comment(&"c".repeat(4096))
        .file("a.txt", b"a")
        .write_to(dir.path(), "big-comment.rar");

    let limits = Limits::default().max_comment_size(1024);
    let archive = Archive::open(OpenRequest::new(&path).limits(limits)).unwrap();
    assert_eq!(archive.comment(), None);
    assert_eq!(
        archive.open_info().comment_state,
        CommentState::Failed(ErrorCode::NoMemory)
    );
    archive.close().unwrap();

    // Entries are still readable.
    assert_eq!(list_entries(&path).unwrap().len(), 1);
}

#[test]
fn test_unsupported_method() {
    let dir = tempdir().unwrap();
    let path = RarBuilder::new()
        .entry(Entry::file("packed.bin", b"pretend compressed").method(3))
        .file("stored.txt", b"stored")
        .write_to(dir.path(), "method.rar");

    let entries = list_entries(&path).unwrap();
    assert_eq!(entries[0].method, 3);

    let mut archive = Archive::open(OpenRequest::new(&path).mode(OpenMode::Extract)).unwrap();
    archive.read_header().unwrap().unwrap();
    let err = archive.process_file(Operation::Test, None).unwrap_err();
    assert!(matches!(err, Error::UnsupportedMethod { .. }), "{err}");
    assert_eq!(err.code(), ErrorCode::UnknownFormat);

    // The unsupported entry does not block the next one.
    archive.read_header().unwrap().unwrap();
    assert_eq!(archive.process_file(Operation::Test, None).unwrap().bytes(), 6);
}

#[test]
fn test_process_without_header() {
    let dir = tempdir().unwrap();
    let path = RarBuilder::new().file("a.txt", b"a").write_to(dir.path(), "state.rar");

    let mut archive = Archive::open(&path).unwrap();
    let err = archive.process_file(Operation::Skip, None).unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));

    archive.read_header().unwrap().unwrap();
    assert!(matches!(archive.read_header().unwrap_err(), Error::InvalidState(_)));
    assert_eq!(
        archive.process_file(Operation::Skip, None).unwrap(),
        ProcessOutcome::Skipped
    );
    assert!(archive.read_header().unwrap().is_none());

    let mut sink = Vec::new();
    assert!(matches!(
        archive.process_to_writer(&mut sink).unwrap_err(),
        Error::InvalidState(_)
    ));
}
