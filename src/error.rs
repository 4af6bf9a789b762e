//! Error types for RAR archive operations.
//!
//! This module provides the [`Error`] enum which represents every failure
//! mode of the extraction core, the [`ErrorCode`] taxonomy that mirrors the
//! numeric result codes of the classic unrar library, and a [`Result<T>`]
//! alias.
//!
//! # Result codes
//!
//! Every [`Error`] maps onto exactly one [`ErrorCode`] through
//! [`Error::code`]. Callers that speak the numeric protocol (bindings, logs,
//! compatibility shims) can forward `error.code() as u32` directly:
//!
//! ```rust
//! use rarkit::{Error, ErrorCode};
//!
//! let err = Error::PasswordRequired { entry: None };
//! assert_eq!(err.code(), ErrorCode::MissingPassword);
//! assert_eq!(err.code() as u32, 22);
//! ```
//!
//! End of archive is not an error: [`crate::Archive::read_header`] returns
//! `Ok(None)` and [`ErrorCode::EndArchive`] exists only for the numeric
//! mapping.

use std::io;
use std::path::PathBuf;

use crate::checksum::HashValue;

/// Numeric result codes, one per error kind.
///
/// The discriminants match the values of the `ERAR_*` constants so that a
/// code can be handed to software that expects the native numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Operation completed.
    Success = 0,
    /// No more entries. Not an error.
    EndArchive = 10,
    /// An allocation or resource budget could not be satisfied.
    NoMemory = 11,
    /// Payload or entry header corruption, including checksum mismatch.
    BadData = 12,
    /// The container is structurally invalid or not an archive.
    BadArchive = 13,
    /// A recognized container in an unsupported variant.
    UnknownFormat = 14,
    /// An archive or volume could not be opened.
    EOpen = 15,
    /// An output file or directory could not be created.
    ECreate = 16,
    /// A resource could not be released.
    EClose = 17,
    /// Reading failed.
    ERead = 18,
    /// Writing failed.
    EWrite = 19,
    /// A caller-supplied buffer is too small.
    SmallBuf = 20,
    /// Unclassified internal fault or caller contract violation.
    Unknown = 21,
    /// Encrypted content and no password available.
    MissingPassword = 22,
    /// A redirect or link target is broken or unsafe.
    EReference = 23,
    /// The password failed verification.
    BadPassword = 24,
}

impl ErrorCode {
    /// Converts a native numeric code back into an [`ErrorCode`].
    pub fn from_u32(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Success,
            10 => Self::EndArchive,
            11 => Self::NoMemory,
            12 => Self::BadData,
            13 => Self::BadArchive,
            14 => Self::UnknownFormat,
            15 => Self::EOpen,
            16 => Self::ECreate,
            17 => Self::EClose,
            18 => Self::ERead,
            19 => Self::EWrite,
            20 => Self::SmallBuf,
            21 => Self::Unknown,
            22 => Self::MissingPassword,
            23 => Self::EReference,
            24 => Self::BadPassword,
            _ => return None,
        })
    }

    /// Returns the native numeric value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Helper struct for formatting entry-scoped password messages.
struct EntryDisplay<'a> {
    prefix: &'static str,
    entry: Option<&'a str>,
}

impl std::fmt::Display for EntryDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix)?;
        if let Some(name) = self.entry {
            write!(f, " for entry '{}'", name)?;
        }
        Ok(())
    }
}

/// The main error type for RAR archive operations.
///
/// # Error Categories
///
/// | Category | Variants | Code |
/// |----------|----------|------|
/// | I/O | [`Io`][Self::Io], [`Open`][Self::Open], [`Create`][Self::Create], [`Write`][Self::Write], [`Close`][Self::Close] | `ERead`, `EOpen`, `ECreate`, `EWrite`, `EClose` |
/// | Container | [`InvalidFormat`][Self::InvalidFormat], [`UnsupportedFormat`][Self::UnsupportedFormat] | `BadArchive`, `UnknownFormat` |
/// | Integrity | [`CorruptHeader`][Self::CorruptHeader], [`Truncated`][Self::Truncated], [`ChecksumMismatch`][Self::ChecksumMismatch] | `BadData` |
/// | Passwords | [`PasswordRequired`][Self::PasswordRequired], [`WrongPassword`][Self::WrongPassword] | `MissingPassword`, `BadPassword` |
/// | Links | [`SymlinkRejected`][Self::SymlinkRejected], [`SymlinkTargetEscape`][Self::SymlinkTargetEscape], [`ReferenceMissing`][Self::ReferenceMissing] | `EReference` |
/// | Volumes | [`VolumeMissing`][Self::VolumeMissing], [`VolumeCancelled`][Self::VolumeCancelled], [`VolumeMismatch`][Self::VolumeMismatch] | `EOpen`, `BadArchive` |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading archive data.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The archive (first volume) could not be opened.
    ///
    /// The underlying [`io::ErrorKind`] distinguishes `NotFound` from
    /// `PermissionDenied` and other failures.
    #[error("Cannot open '{}': {source}", path.display())]
    Open {
        /// The path that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An output file or directory could not be created.
    #[error("Cannot create '{}': {source}", path.display())]
    Create {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing extracted data failed.
    #[error("Write error{}: {source}", path.as_ref().map(|p| format!(" on '{}'", p.display())).unwrap_or_default())]
    Write {
        /// The destination being written, if it is a file.
        path: Option<PathBuf>,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Releasing a file handle failed.
    #[error("Cannot close '{}': {source}", path.display())]
    Close {
        /// The path whose handle failed to close.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The file is not a RAR archive or its archive-level structure is invalid.
    #[error("Invalid RAR archive: {0}")]
    InvalidFormat(String),

    /// The file is a RAR archive in a variant this crate does not read.
    ///
    /// RAR 1.5-4.x archives and unknown future format versions end up here.
    #[error("Unsupported RAR format: {0}")]
    UnsupportedFormat(String),

    /// An entry-level header is corrupt.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset of the header within its volume.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// The archive ended in the middle of a header or payload.
    #[error("Unexpected end of archive at offset {offset:#x} ({needed} more bytes expected)")]
    Truncated {
        /// The offset at which data ran out.
        offset: u64,
        /// How many bytes were still expected.
        needed: u64,
    },

    /// The entry uses a compression method with no registered unpacker.
    #[error("Unsupported compression method {method} (algorithm version {version})")]
    UnsupportedMethod {
        /// Method code, 0 (store) to 5 (best).
        method: u8,
        /// Algorithm version from the compression information.
        version: u8,
    },

    /// The entry or archive uses an unknown encryption scheme.
    #[error("Unsupported encryption version {version}")]
    UnsupportedEncryption {
        /// The encryption version field.
        version: u64,
    },

    /// The unpacked data does not match the stored checksum.
    #[error("Checksum mismatch for '{entry}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Name of the entry that failed verification.
        entry: String,
        /// The value stored in the header.
        expected: HashValue,
        /// The value computed from the unpacked data.
        actual: HashValue,
    },

    /// An allocation requested by archive metadata could not be satisfied.
    #[error("Out of memory: cannot allocate {requested} bytes")]
    OutOfMemory {
        /// Requested size in bytes.
        requested: u64,
    },

    /// A configured resource limit was exceeded.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    /// A caller-supplied buffer cannot hold the value.
    ///
    /// Retry with a buffer of at least `needed` bytes.
    #[error("Buffer too small: {needed} bytes needed, {capacity} available")]
    SmallBuffer {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        capacity: usize,
    },

    /// Encrypted content was found and no password is available.
    #[error("{}", EntryDisplay { prefix: "Password required", entry: entry.as_deref() })]
    PasswordRequired {
        /// The entry that needs a password, if the archive headers are readable.
        entry: Option<String>,
    },

    /// The password failed verification.
    #[error("{}", EntryDisplay { prefix: "Wrong password", entry: entry.as_deref() })]
    WrongPassword {
        /// The entry where the wrong password was detected, if any.
        entry: Option<String>,
    },

    /// An entry path would escape the extraction directory.
    #[error("Path traversal detected in entry '{path}'")]
    PathTraversal {
        /// The path stored in the archive.
        path: String,
    },

    /// A link entry was rejected by the link policy.
    #[error("Link entry '{path}' rejected by policy")]
    SymlinkRejected {
        /// The path stored in the archive.
        path: String,
    },

    /// A link target would point outside the extraction directory.
    #[error("Link '{path}' target '{target}' escapes the extraction directory")]
    SymlinkTargetEscape {
        /// The link entry path.
        path: String,
        /// The target stored in the redirection record.
        target: String,
    },

    /// A hard link or file copy refers to a file that was not extracted.
    #[error("Reference target '{target}' for '{path}' does not exist")]
    ReferenceMissing {
        /// The link entry path.
        path: String,
        /// The missing target.
        target: String,
    },

    /// A required volume could not be opened.
    #[error("Volume {volume} not found at '{}'", path.display())]
    VolumeMissing {
        /// Zero-based volume number.
        volume: u64,
        /// Expected path of the volume.
        path: PathBuf,
        /// The I/O error raised when opening, if any.
        #[source]
        source: Option<io::Error>,
    },

    /// The volume-change callback cancelled the operation.
    #[error("Volume change to '{}' cancelled", path.display())]
    VolumeCancelled {
        /// Zero-based volume number.
        volume: u64,
        /// The volume path that was offered.
        path: PathBuf,
    },

    /// The next volume does not belong to this archive.
    #[error("Volume '{}' does not continue the archive: {reason}", path.display())]
    VolumeMismatch {
        /// Path of the offending volume.
        path: PathBuf,
        /// What did not match.
        reason: String,
    },

    /// The destination already exists and the overwrite policy forbids replacing it.
    #[error("Destination '{}' already exists", path.display())]
    AlreadyExists {
        /// The existing destination.
        path: PathBuf,
    },

    /// The named entry does not exist in the archive.
    #[error("Entry '{name}' not found")]
    EntryNotFound {
        /// The requested name.
        name: String,
    },

    /// The data callback stopped the entry before all of it was delivered.
    ///
    /// Returned by the one-call helpers, which cannot hand back partial
    /// data as a success. `process_file` reports an abort as
    /// `ProcessOutcome::Aborted` instead.
    #[error("Extraction of '{entry}' stopped by the data callback")]
    Aborted {
        /// The entry that was stopped.
        entry: String,
    },

    /// The session was driven out of order.
    ///
    /// Raised by `process_file` without a current header and by
    /// `read_header` while the previous header is still unprocessed.
    #[error("Invalid session state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Returns the result code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Io(_) => ErrorCode::ERead,
            Error::Open { .. } | Error::VolumeMissing { .. } | Error::VolumeCancelled { .. } => {
                ErrorCode::EOpen
            }
            Error::Create { .. } | Error::PathTraversal { .. } | Error::AlreadyExists { .. } => {
                ErrorCode::ECreate
            }
            Error::Write { .. } => ErrorCode::EWrite,
            Error::Close { .. } => ErrorCode::EClose,
            Error::InvalidFormat(_) | Error::VolumeMismatch { .. } => ErrorCode::BadArchive,
            Error::UnsupportedFormat(_)
            | Error::UnsupportedMethod { .. }
            | Error::UnsupportedEncryption { .. } => ErrorCode::UnknownFormat,
            Error::CorruptHeader { .. } | Error::Truncated { .. } | Error::ChecksumMismatch { .. } => {
                ErrorCode::BadData
            }
            Error::OutOfMemory { .. } | Error::ResourceLimitExceeded(_) => ErrorCode::NoMemory,
            Error::SmallBuffer { .. } => ErrorCode::SmallBuf,
            Error::PasswordRequired { .. } => ErrorCode::MissingPassword,
            Error::WrongPassword { .. } => ErrorCode::BadPassword,
            Error::SymlinkRejected { .. }
            | Error::SymlinkTargetEscape { .. }
            | Error::ReferenceMissing { .. } => ErrorCode::EReference,
            Error::EntryNotFound { .. } | Error::Aborted { .. } | Error::InvalidState(_) => {
                ErrorCode::Unknown
            }
        }
    }

    /// Returns `true` if supplying a (different) password may fix the error.
    pub fn is_password_error(&self) -> bool {
        matches!(
            self,
            Error::PasswordRequired { .. } | Error::WrongPassword { .. }
        )
    }

    /// Returns `true` if this error indicates damaged archive data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::CorruptHeader { .. }
                | Error::Truncated { .. }
                | Error::ChecksumMismatch { .. }
                | Error::InvalidFormat(_)
        )
    }

    /// Creates a corrupt header error.
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }

    /// Wraps this error so it can travel through `io::Read`/`io::Write`.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Io(e) => e,
            other => io::Error::other(other),
        }
    }

    /// Recovers a crate error that was wrapped by [`Error::into_io`].
    pub(crate) fn from_io(err: io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::other(other)),
            None => Error::Io(io::Error::other("wrapped error vanished")),
        }
    }

    /// Converts a failed allocation into [`Error::OutOfMemory`].
    pub(crate) fn out_of_memory(requested: usize) -> Self {
        Error::OutOfMemory {
            requested: requested as u64,
        }
    }
}

/// A specialized Result type for RAR archive operations.
pub type Result<T> = std::result::Result<T, Error>;
