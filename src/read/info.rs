//! Archive information types.

use std::path::PathBuf;

use crate::ErrorCode;

/// Archive-wide flags reported at open time.
///
/// Bit values follow the `ROADF_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArchiveFlags(u32);

impl ArchiveFlags {
    /// The archive is part of a multi-volume set.
    pub const VOLUME: Self = Self(0x0001);
    /// The archive has a comment.
    pub const COMMENT: Self = Self(0x0002);
    /// The archive is locked against modification.
    pub const LOCK: Self = Self(0x0004);
    /// The archive is solid.
    pub const SOLID: Self = Self(0x0008);
    /// Volumes are named `name.partN.rar`.
    pub const NEW_NUMBERING: Self = Self(0x0010);
    /// The archive carries an authenticity signature.
    pub const SIGNED: Self = Self(0x0020);
    /// The archive has a recovery record.
    pub const RECOVERY: Self = Self(0x0040);
    /// Block headers are encrypted.
    pub const ENC_HEADERS: Self = Self(0x0080);
    /// This is the first volume of a set.
    pub const FIRST_VOLUME: Self = Self(0x0100);

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn set(&mut self, other: Self, on: bool) {
        if on {
            self.0 |= other.0;
        }
    }
}

impl std::ops::BitOr for ArchiveFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Outcome of reading the archive comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommentState {
    /// The archive has no comment.
    #[default]
    Absent,
    /// The comment was read completely.
    Read,
    /// The comment did not fit the requested capacity; `needed` bytes
    /// (terminator included) would hold it.
    Truncated {
        /// Required capacity.
        needed: usize,
    },
    /// The comment could not be read.
    Failed(ErrorCode),
}

/// Properties discovered when the archive was opened.
#[derive(Debug, Clone, Default)]
pub struct ArchiveOpenInfo {
    /// Archive flags.
    pub flags: ArchiveFlags,
    /// Comment text, cut to the requested capacity.
    pub comment: Option<String>,
    /// How reading the comment went.
    pub comment_state: CommentState,
    /// Zero-based number of the opened volume.
    pub volume_number: u64,
    /// Offset of the signature (non-zero for self-extracting archives).
    pub sfx_offset: u64,
}

impl ArchiveOpenInfo {
    /// Returns the comment, if any.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns `true` for multi-volume archives.
    pub fn is_volume(&self) -> bool {
        self.flags.contains(ArchiveFlags::VOLUME)
    }

    /// Returns `true` for solid archives.
    pub fn is_solid(&self) -> bool {
        self.flags.contains(ArchiveFlags::SOLID)
    }

    /// Returns `true` if block headers are encrypted.
    pub fn has_encrypted_headers(&self) -> bool {
        self.flags.contains(ArchiveFlags::ENC_HEADERS)
    }
}

/// What `process_file` did with an entry.
#[must_use = "the outcome tells whether the entry was written or aborted"]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The entry was skipped.
    Skipped,
    /// The entry was unpacked and verified.
    Tested {
        /// Unpacked bytes.
        bytes: u64,
    },
    /// The entry was written.
    Extracted {
        /// Created path, `None` for writer targets.
        path: Option<PathBuf>,
        /// Unpacked bytes.
        bytes: u64,
    },
    /// The data callback stopped the entry.
    Aborted {
        /// Bytes delivered before the stop.
        bytes: u64,
    },
}

impl ProcessOutcome {
    /// Number of unpacked bytes produced.
    pub fn bytes(&self) -> u64 {
        match self {
            ProcessOutcome::Skipped => 0,
            ProcessOutcome::Tested { bytes }
            | ProcessOutcome::Extracted { bytes, .. }
            | ProcessOutcome::Aborted { bytes } => *bytes,
        }
    }

    /// Returns `true` if the callback stopped the entry.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ProcessOutcome::Aborted { .. })
    }
}

/// Totals over all entries of an archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of entries (files, directories and links).
    pub entry_count: usize,
    /// Number of directory entries.
    pub directory_count: usize,
    /// Sum of packed sizes over all volumes.
    pub packed_size: u64,
    /// Sum of unpacked sizes.
    pub unpacked_size: u64,
    /// Whether any entry or the headers are encrypted.
    pub password_protected: bool,
    /// Whether the archive is solid.
    pub is_solid: bool,
    /// Whether the archive is a volume set.
    pub is_volume: bool,
}

impl ArchiveSummary {
    /// Returns `true` if the archive holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Returns the compression ratio (packed / unpacked).
    pub fn compression_ratio(&self) -> f64 {
        if self.unpacked_size == 0 {
            1.0
        } else {
            self.packed_size as f64 / self.unpacked_size as f64
        }
    }
}

/// Result of extracting several entries.
#[must_use = "extraction results should be checked for skipped entries"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Number of entries written (files, directories and links).
    pub entries_extracted: usize,
    /// Number of entries skipped.
    pub entries_skipped: usize,
    /// Total unpacked bytes written.
    pub bytes_extracted: u64,
}

impl ExtractSummary {
    pub(crate) fn record(&mut self, outcome: &ProcessOutcome) {
        match outcome {
            ProcessOutcome::Extracted { bytes, .. } | ProcessOutcome::Tested { bytes } => {
                self.entries_extracted += 1;
                self.bytes_extracted += bytes;
            }
            ProcessOutcome::Skipped | ProcessOutcome::Aborted { .. } => {
                self.entries_skipped += 1;
            }
        }
    }
}
