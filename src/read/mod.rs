//! Archive reading API.
//!
//! An [`Archive`] is one open session. Entries are visited strictly in
//! order: [`read_header`](Archive::read_header) yields the next entry and
//! [`process_file`](Archive::process_file) skips, tests or extracts it. The
//! pair repeats until `read_header` returns `None`.
//!
//! # Example
//!
//! ```rust,no_run
//! use rarkit::{Archive, Destination, OpenMode, OpenRequest, Operation};
//!
//! let mut archive = Archive::open(OpenRequest::new("archive.rar").mode(OpenMode::Extract))?;
//! let out = Destination::directory("output");
//! while let Some(entry) = archive.read_header()? {
//!     let outcome = archive.process_file(Operation::Extract, Some(&out))?;
//!     println!("{} ({} bytes): {:?}", entry.name, entry.unpacked_size, outcome);
//! }
//! archive.close()?;
//! # Ok::<(), rarkit::Error>(())
//! ```

mod archive_open;
mod archive_query;
mod destination;
mod entries;
mod entry;
mod extraction;
mod info;
mod metadata;
mod multivolume;
mod options;
mod path_safety;

pub use archive_query::{EntryAction, list_entries};
pub use destination::Destination;
pub use entry::{BASIC_NAME_CAPACITY, BasicHeader, EntryFlags, EntryHeader, HeaderRecord, RECORD_VERSION};
pub use info::{
    ArchiveFlags, ArchiveOpenInfo, ArchiveSummary, CommentState, ExtractSummary, ProcessOutcome,
};
pub use options::{
    ExtractOptions, Limits, LinkPolicy, OpenMode, OpenRequest, Operation, OverwritePolicy,
    PathSafety, PreserveMetadata,
};

use std::path::{Path, PathBuf};

use crate::callback::{ArchiveCallbacks, CallbackContext, DataFlow, VolumeDecision, VolumeRequest};
use crate::codec::{CodecRegistry, Unpacker};
use crate::crypto::{CryptoGate, Password};
use crate::format::files::FileHeader;
use crate::{Error, Result};

use multivolume::VolumeCursor;

/// Version of the session interface, as reported by `RARGetDllVersion`.
pub const API_VERSION: u32 = 8;

/// Returns [`API_VERSION`].
pub fn api_version() -> u32 {
    API_VERSION
}

/// The entry returned by the last `read_header`, waiting for `process_file`.
struct Pending {
    header: FileHeader,
    entry: EntryHeader,
}

/// An open RAR archive session.
///
/// A session is used from one thread at a time; it is `Send` but not
/// `Sync`. Volumes are opened as entries require them and released by
/// [`close`](Archive::close) or drop.
pub struct Archive {
    path: PathBuf,
    mode: OpenMode,
    cursor: VolumeCursor,
    gate: CryptoGate,
    callbacks: CallbackContext,
    info: ArchiveOpenInfo,
    comment: Option<String>,
    keep_broken: bool,
    ignore_checksums: bool,
    limits: Limits,
    extract_options: ExtractOptions,
    codecs: CodecRegistry,
    solid: Option<Box<dyn Unpacker>>,
    current: Option<Pending>,
    finished: bool,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("volume", &self.cursor.number())
            .field("info", &self.info)
            .field("current", &self.current.as_ref().map(|p| &p.entry.name))
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl Archive {
    /// Path the session was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mode the session was opened in.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Archive properties found at open time.
    pub fn open_info(&self) -> &ArchiveOpenInfo {
        &self.info
    }

    /// Full archive comment, regardless of the requested capacity.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Copies the NUL-terminated UTF-8 comment into `buf`.
    ///
    /// Returns the bytes written, terminator included, or 0 without a
    /// comment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SmallBuffer`] with the required size when `buf` is
    /// too small.
    pub fn copy_comment_to(&self, buf: &mut [u8]) -> Result<usize> {
        let Some(comment) = &self.comment else {
            return Ok(0);
        };
        let needed = comment.len() + 1;
        if buf.len() < needed {
            return Err(Error::SmallBuffer {
                needed,
                capacity: buf.len(),
            });
        }
        buf[..comment.len()].copy_from_slice(comment.as_bytes());
        buf[comment.len()] = 0;
        Ok(needed)
    }

    /// Zero-based number of the volume currently read.
    pub fn volume_number(&self) -> u64 {
        self.cursor.number()
    }

    /// Path of the volume currently read.
    pub fn volume_path(&self) -> &Path {
        self.cursor.path()
    }

    /// Sets the password for the rest of the session.
    pub fn set_password(&mut self, password: impl Into<Password>) {
        self.gate.set_password(password.into());
    }

    /// Replaces the application callbacks.
    pub fn set_callbacks(&mut self, callbacks: impl ArchiveCallbacks + 'static) {
        self.callbacks.set_callbacks(Box::new(callbacks));
    }

    /// Installs a volume change handler that takes precedence over
    /// [`ArchiveCallbacks::change_volume`].
    pub fn set_change_volume_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&VolumeRequest<'_>) -> VolumeDecision + Send + 'static,
    {
        self.callbacks.set_change_volume(Box::new(handler));
    }

    /// Installs a data handler that takes precedence over
    /// [`ArchiveCallbacks::process_data`].
    pub fn set_process_data_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&[u8]) -> DataFlow + Send + 'static,
    {
        self.callbacks.set_process_data(Box::new(handler));
    }

    /// Ends the session and releases the open volume.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Close`] if the volume cannot be released; the
    /// session is gone either way.
    pub fn close(self) -> Result<()> {
        log::debug!("closing {:?}", self.path);
        self.cursor.close()
    }

    /// Returns [`API_VERSION`].
    pub fn api_version() -> u32 {
        API_VERSION
    }
}
