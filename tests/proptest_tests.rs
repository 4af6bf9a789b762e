//! Property-based tests.
//!
//! Parsing must never panic on arbitrary input, and stored entries must
//! come back byte for byte however the archive is split into volumes.

mod common;

use std::path::Path;

use common::{Entry, RarBuilder, SIGNATURE, write_file};
use proptest::prelude::*;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rarkit::volume::next_volume_path;
use rarkit::{Archive, OpenMode, OpenRequest};
use tempfile::tempdir;

/// Walks the whole archive, testing every entry, and ignores the outcome.
fn exercise(path: &Path) {
    let Ok(mut archive) = Archive::open(OpenRequest::new(path).mode(OpenMode::Extract)) else {
        return;
    };
    while let Ok(Some(_)) = archive.read_header() {
        if archive.process_file(rarkit::Operation::Test, None).is_err() {
            break;
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "random.rar", &data);
        exercise(&path);
    }

    #[test]
    fn random_blocks_never_panic(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let dir = tempdir().unwrap();
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&data);
        let path = write_file(dir.path(), "blocks.rar", &bytes);
        exercise(&path);
    }

    #[test]
    fn corrupted_archive_never_panics(seed in any::<u64>(), flips in 1usize..8) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut bytes = RarBuilder::new()
            .comment("comment")
            .file("a.txt", b"alpha")
            .entry(Entry::file("b.bin", &common::sample_data(700, 3)).blake2())
            .entry(Entry::symlink("link", "a.txt"))
            .build();
        for _ in 0..flips {
            let at = rng.gen_range(SIGNATURE.len()..bytes.len());
            bytes[at] = rng.r#gen();
        }
        let dir = tempdir().unwrap();
        let path = write_file(dir.path(), "flipped.rar", &bytes);
        exercise(&path);
    }

    #[test]
    fn stored_data_survives_any_split(
        data in proptest::collection::vec(any::<u8>(), 0..3000),
        capacity in 64usize..2000,
    ) {
        let dir = tempdir().unwrap();
        let paths = RarBuilder::new()
            .file("head.txt", b"head")
            .entry(Entry::file("body.bin", &data))
            .write_volumes(dir.path(), "split", capacity);

        let request = OpenRequest::new(&paths[0]).mode(OpenMode::Extract);
        let out = Archive::extract_entry_to_vec(request, "body.bin").unwrap();
        prop_assert_eq!(out, data);
    }

    #[test]
    fn new_style_volume_numbers_increment(number in 1u32..100_000) {
        let name = format!("set.part{}.rar", number);
        let next = next_volume_path(Path::new(&name));
        prop_assert_eq!(next, Path::new(&format!("set.part{}.rar", number + 1)).to_path_buf());
    }
}
