//! Fuzz target for RAR 5.0 block parsing with arbitrary byte input.
//!
//! Locates a signature in the input, then walks the block chain and decodes
//! every header it recognizes. Looking for panics, hangs and runaway
//! allocations in the header parsers.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use std::io::{Cursor, Seek, SeekFrom};

use libfuzzer_sys::fuzz_target;
use rarkit::format::files::FileHeader;
use rarkit::format::header::{EncryptionHeader, EndHeader, MainHeader};
use rarkit::format::{MAX_HEADER_SIZE, MAX_SFX_SIZE, block_type, detect, parser};

fuzz_target!(|data: &[u8]| {
    let mut cursor = Cursor::new(data);
    let Ok(signature) = detect::require_rar5(&mut cursor, MAX_SFX_SIZE) else {
        return;
    };

    let mut offset = signature.blocks_offset();
    // Every block advances by at least its header, so this bounds the walk.
    for _ in 0..data.len() {
        if cursor.seek(SeekFrom::Start(offset)).is_err() {
            return;
        }
        let block = match parser::read_block(&mut cursor, offset, None, MAX_HEADER_SIZE) {
            Ok(Some(block)) => block,
            Ok(None) | Err(_) => return,
        };
        match block.header.block_type {
            block_type::MAIN => {
                let _ = MainHeader::decode(&block);
            }
            block_type::FILE | block_type::SERVICE => {
                if let Ok(file) = FileHeader::decode(&block) {
                    let _ = file.expected_hash();
                    let _ = file.compression.dictionary_size();
                }
            }
            block_type::ENCRYPTION => {
                let _ = EncryptionHeader::decode(&block);
                return;
            }
            block_type::END => {
                let _ = EndHeader::decode(&block);
                return;
            }
            _ => {}
        }
        let next = block.header.next_offset();
        if next <= offset {
            return;
        }
        offset = next;
    }
});
