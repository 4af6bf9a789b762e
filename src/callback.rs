//! Caller hooks invoked while an archive is read.
//!
//! A session calls back into the application in three situations:
//!
//! - the next volume of a multi-volume set is needed,
//! - encrypted content is found and no password was supplied,
//! - a chunk of unpacked data is ready (test and extract operations).
//!
//! All hooks run synchronously on the thread that drives the session, from
//! inside `read_header` or `process_file`. They have no access to the
//! session itself and so cannot re-enter it.
//!
//! # Example
//!
//! ```rust,no_run
//! use rarkit::{Archive, ArchiveCallbacks, DataFlow, OpenRequest, Password};
//!
//! struct Prompt;
//!
//! impl ArchiveCallbacks for Prompt {
//!     fn need_password(&mut self, entry: Option<&str>) -> Option<Password> {
//!         eprintln!("password needed for {:?}", entry);
//!         Some(Password::new("secret"))
//!     }
//!
//!     fn process_data(&mut self, chunk: &[u8]) -> DataFlow {
//!         eprintln!("{} bytes", chunk.len());
//!         DataFlow::Continue
//!     }
//! }
//!
//! let archive = Archive::open(OpenRequest::new("secret.rar").callbacks(Prompt))?;
//! # Ok::<(), rarkit::Error>(())
//! ```

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use crate::crypto::Password;

/// Why the volume callback is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VolumeMode {
    /// The expected volume does not exist; the caller may supply another path.
    Ask = 0,
    /// The expected volume exists and is about to be opened.
    Notify = 1,
}

/// Details of a volume change.
#[derive(Debug, Clone, Copy)]
pub struct VolumeRequest<'a> {
    /// Path the session intends to open.
    pub path: &'a Path,
    /// Zero-based number of the requested volume.
    pub number: u64,
    /// Whether the volume exists.
    pub mode: VolumeMode,
}

/// Answer to a [`VolumeRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeDecision {
    /// Use the offered path (after a `Ask`, look for it again).
    Continue,
    /// Use this path instead.
    Replace(PathBuf),
    /// Stop; the current operation fails with `EOpen`.
    Cancel,
}

/// Answer to a data chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFlow {
    /// Keep going.
    Continue,
    /// Stop processing the current entry.
    Abort,
}

/// Application hooks for a session.
///
/// Every method has a default, so implementors override only what they
/// need.
pub trait ArchiveCallbacks: Send {
    /// Called when the next volume is needed.
    ///
    /// The default continues when the volume exists and cancels otherwise.
    fn change_volume(&mut self, request: &VolumeRequest<'_>) -> VolumeDecision {
        match request.mode {
            VolumeMode::Notify => VolumeDecision::Continue,
            VolumeMode::Ask => VolumeDecision::Cancel,
        }
    }

    /// Called when encrypted content is found and no password is set.
    ///
    /// `entry` names the entry, or is `None` for encrypted headers.
    /// Returning `None` fails the operation with `MissingPassword`.
    fn need_password(&mut self, entry: Option<&str>) -> Option<Password> {
        let _ = entry;
        None
    }

    /// Called with each chunk of unpacked data during test and extract.
    fn process_data(&mut self, chunk: &[u8]) -> DataFlow {
        let _ = chunk;
        DataFlow::Continue
    }
}

/// Callbacks that use every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallbacks;

impl ArchiveCallbacks for NoCallbacks {}

type ChangeVolumeFn = dyn FnMut(&VolumeRequest<'_>) -> VolumeDecision + Send;
type ProcessDataFn = dyn FnMut(&[u8]) -> DataFlow + Send;

/// Registered hooks of one session.
///
/// The packed data reader and the output sink both need the hooks while an
/// entry is processed, so they share the context by reference.
pub(crate) struct CallbackContext {
    callbacks: RefCell<Box<dyn ArchiveCallbacks>>,
    change_volume: RefCell<Option<Box<ChangeVolumeFn>>>,
    process_data: RefCell<Option<Box<ProcessDataFn>>>,
}

impl std::fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackContext").finish_non_exhaustive()
    }
}

impl Default for CallbackContext {
    fn default() -> Self {
        Self::new(Box::new(NoCallbacks))
    }
}

impl CallbackContext {
    pub(crate) fn new(callbacks: Box<dyn ArchiveCallbacks>) -> Self {
        Self {
            callbacks: RefCell::new(callbacks),
            change_volume: RefCell::new(None),
            process_data: RefCell::new(None),
        }
    }

    pub(crate) fn set_callbacks(&mut self, callbacks: Box<dyn ArchiveCallbacks>) {
        *self.callbacks.get_mut() = callbacks;
    }

    pub(crate) fn set_change_volume(&mut self, handler: Box<ChangeVolumeFn>) {
        *self.change_volume.get_mut() = Some(handler);
    }

    pub(crate) fn set_process_data(&mut self, handler: Box<ProcessDataFn>) {
        *self.process_data.get_mut() = Some(handler);
    }

    pub(crate) fn change_volume(&self, request: &VolumeRequest<'_>) -> VolumeDecision {
        if let Some(handler) = self.change_volume.borrow_mut().as_mut() {
            return handler(request);
        }
        self.callbacks.borrow_mut().change_volume(request)
    }

    pub(crate) fn need_password(&self, entry: Option<&str>) -> Option<Password> {
        self.callbacks.borrow_mut().need_password(entry)
    }

    pub(crate) fn process_data(&self, chunk: &[u8]) -> DataFlow {
        if let Some(handler) = self.process_data.borrow_mut().as_mut() {
            return handler(chunk);
        }
        self.callbacks.borrow_mut().process_data(chunk)
    }
}
