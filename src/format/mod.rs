//! RAR 5.0 container constants, definitions, and low-level parsing.
//!
//! A RAR 5.0 volume is a signature followed by a sequence of blocks. Each
//! block starts with a CRC-32, a variable-length header size and a header
//! type, optionally followed by an extra area and a data area:
//!
//! ```text
//! crc32:u32 | size:vint | type:vint | flags:vint | [extra:vint] | [data:vint] | fields.. | extra area | data area
//! ```
//!
//! The submodules split this into byte-level primitives ([`vint`]),
//! signature detection ([`detect`]), block framing and archive-level headers
//! ([`header`]), file/service headers with their extra records ([`files`]),
//! and the stream-level block reader ([`parser`]).

pub mod detect;
pub mod files;
pub mod header;
pub mod parser;
pub mod vint;

/// RAR 5.0 signature.
pub const SIGNATURE_V5: &[u8; 8] = b"Rar!\x1A\x07\x01\x00";

/// RAR 1.5-4.x signature.
pub const SIGNATURE_V4: &[u8; 7] = b"Rar!\x1A\x07\x00";

/// Common prefix of every RAR signature.
pub const SIGNATURE_PREFIX: &[u8; 6] = b"Rar!\x1A\x07";

/// Largest self-extracting stub searched for a signature (2 MiB).
pub const MAX_SFX_SIZE: u64 = 0x20_0000;

/// Largest header a conforming archive may contain (2 MiB).
pub const MAX_HEADER_SIZE: u64 = 0x20_0000;

/// Size of the salt in encryption records.
pub const SALT_SIZE: usize = 16;

/// Size of an AES initialization vector.
pub const IV_SIZE: usize = 16;

/// Size of the password check value.
pub const PSW_CHECK_SIZE: usize = 8;

/// Size of the password check checksum.
pub const PSW_CHECK_SUM_SIZE: usize = 4;

/// Block types.
pub mod block_type {
    /// Main archive header.
    pub const MAIN: u64 = 1;
    /// File header.
    pub const FILE: u64 = 2;
    /// Service header (comment, quick open, recovery record, ...).
    pub const SERVICE: u64 = 3;
    /// Archive encryption header.
    pub const ENCRYPTION: u64 = 4;
    /// End of archive header.
    pub const END: u64 = 5;
}

/// Flags common to all blocks.
pub mod block_flags {
    /// Extra area is present at the end of the header.
    pub const EXTRA: u64 = 0x0001;
    /// Data area follows the header.
    pub const DATA: u64 = 0x0002;
    /// Blocks of unknown type with this flag can be skipped.
    pub const SKIP_IF_UNKNOWN: u64 = 0x0004;
    /// Data continues from the previous volume.
    pub const SPLIT_BEFORE: u64 = 0x0008;
    /// Data continues in the next volume.
    pub const SPLIT_AFTER: u64 = 0x0010;
    /// Block depends on the preceding file block.
    pub const CHILD: u64 = 0x0020;
    /// Preserve child block when the host is modified.
    pub const INHERITED: u64 = 0x0040;
}

/// Main archive header flags.
pub mod archive_flags {
    /// Archive is a part of a multi-volume set.
    pub const VOLUME: u64 = 0x0001;
    /// Volume number field is present (all volumes but the first).
    pub const VOLUME_NUMBER: u64 = 0x0002;
    /// Solid archive.
    pub const SOLID: u64 = 0x0004;
    /// Recovery record is present.
    pub const RECOVERY: u64 = 0x0008;
    /// Locked archive.
    pub const LOCKED: u64 = 0x0010;
}

/// File and service header flags.
pub mod file_flags {
    /// Entry is a directory.
    pub const DIRECTORY: u64 = 0x0001;
    /// 32-bit Unix modification time is present.
    pub const UNIX_MTIME: u64 = 0x0002;
    /// CRC-32 of the unpacked data is present.
    pub const CRC32: u64 = 0x0004;
    /// Unpacked size is not known.
    pub const UNKNOWN_SIZE: u64 = 0x0008;
}

/// Extra record types in file and service headers.
pub mod file_extra {
    /// File encryption record.
    pub const ENCRYPTION: u64 = 0x01;
    /// File hash record.
    pub const HASH: u64 = 0x02;
    /// High precision time record.
    pub const TIME: u64 = 0x03;
    /// File version record.
    pub const VERSION: u64 = 0x04;
    /// Redirection record.
    pub const REDIRECTION: u64 = 0x05;
    /// Unix owner record.
    pub const UNIX_OWNER: u64 = 0x06;
    /// Service data record.
    pub const SERVICE_DATA: u64 = 0x07;
}

/// Extra record types in the main archive header.
pub mod archive_extra {
    /// Locator record with quick open and recovery offsets.
    pub const LOCATOR: u64 = 0x01;
}

/// End of archive header flags.
pub mod end_flags {
    /// Archive continues in the next volume.
    pub const NEXT_VOLUME: u64 = 0x0001;
}

/// Encryption record and header flags.
pub mod crypt_flags {
    /// Password check data is present.
    pub const PSW_CHECK: u64 = 0x0001;
    /// Checksums are tweaked with the hash key.
    pub const HASH_MAC: u64 = 0x0002;
}

/// Names of well-known service headers.
pub mod service {
    /// Archive comment.
    pub const COMMENT: &str = "CMT";
    /// Quick open data.
    pub const QUICK_OPEN: &str = "QO";
    /// NTFS access control list.
    pub const ACL: &str = "ACL";
    /// NTFS alternate data stream.
    pub const STREAM: &str = "STM";
    /// Recovery record.
    pub const RECOVERY: &str = "RR";
}
