//! # rarkit
//!
//! A pure-Rust extraction core for RAR 5.0 archives.
//!
//! The crate exposes the session model of the classic unrar library: open an
//! archive, then alternate between reading the next entry header and
//! processing (skipping, testing or extracting) that entry. Volumes,
//! encrypted headers and entries, archive comments and solid archives are
//! handled underneath that loop.
//!
//! ## Quick Start
//!
//! ### Listing an Archive
//!
//! ```rust,no_run
//! use rarkit::{Result, list_entries};
//!
//! fn main() -> Result<()> {
//!     for entry in list_entries("archive.rar")? {
//!         println!("{}: {} bytes", entry.name, entry.unpacked_size);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Extracting Entry by Entry
//!
//! ```rust,no_run
//! use rarkit::{Archive, DataFlow, Destination, OpenMode, OpenRequest, Operation, Result};
//!
//! fn main() -> Result<()> {
//!     let request = OpenRequest::new("archive.part1.rar")
//!         .mode(OpenMode::Extract)
//!         .password("secret");
//!     let mut archive = Archive::open(request)?;
//!     archive.set_process_data_handler(|chunk| {
//!         println!("{} bytes", chunk.len());
//!         DataFlow::Continue
//!     });
//!
//!     let out = Destination::directory("./output");
//!     while let Some(entry) = archive.read_header()? {
//!         let operation = if entry.name.ends_with(".tmp") {
//!             Operation::Skip
//!         } else {
//!             Operation::Extract
//!         };
//!         let outcome = archive.process_file(operation, Some(&out))?;
//!         println!("{}: {:?}", entry.name, outcome);
//!     }
//!     archive.close()
//! }
//! ```
//!
//! ### Extracting into Memory
//!
//! ```rust,no_run
//! use rarkit::{Archive, Result};
//!
//! fn main() -> Result<()> {
//!     let data = Archive::extract_entry_to_vec("archive.rar", "docs/readme.txt")?;
//!     println!("{}", String::from_utf8_lossy(&data));
//!     Ok(())
//! }
//! ```
//!
//! ## Compression Methods
//!
//! Stored entries (method 0) are built in. Other methods are decoded by
//! unpackers registered in a [`CodecRegistry`] passed through
//! [`OpenRequest::codecs`]; an entry whose method has no unpacker fails
//! with [`Error::UnsupportedMethod`].
//!
//! ## Errors
//!
//! Every failure is an [`Error`]; [`Error::code`] maps it onto the numeric
//! [`ErrorCode`] values of the unrar interface.
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade. The
//! library never installs a logger.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read and write operations (64 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 64 * 1024;

pub mod callback;
pub mod checksum;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod format;
pub mod read;
pub mod timestamp;
pub mod volume;

pub use callback::{ArchiveCallbacks, DataFlow, NoCallbacks, VolumeDecision, VolumeMode, VolumeRequest};
pub use checksum::{HashKind, HashValue};
pub use codec::{CodecRegistry, UnpackParams, Unpacker};
pub use crypto::Password;
pub use error::{Error, ErrorCode, Result};
pub use format::files::{HostOs, Redirect, RedirectKind};
pub use read::{
    API_VERSION, Archive, ArchiveFlags, ArchiveOpenInfo, ArchiveSummary, BASIC_NAME_CAPACITY,
    BasicHeader, CommentState, Destination, EntryAction, EntryFlags, EntryHeader, ExtractOptions,
    ExtractSummary, HeaderRecord, Limits, LinkPolicy, OpenMode, OpenRequest, Operation,
    OverwritePolicy, PathSafety, PreserveMetadata, ProcessOutcome, RECORD_VERSION, api_version,
    list_entries,
};
pub use timestamp::Timestamp;
