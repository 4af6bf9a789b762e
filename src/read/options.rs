//! Options for opening archives and extracting entries.

use std::path::{Path, PathBuf};

use crate::callback::ArchiveCallbacks;
use crate::codec::CodecRegistry;
use crate::crypto::{MAX_KDF_LG2, Password};
use crate::format::MAX_HEADER_SIZE;

/// What a session is opened for.
///
/// Discriminants follow the `RAR_OM_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum OpenMode {
    /// Enumerate headers only; continuation parts of split entries are hidden.
    #[default]
    List = 0,
    /// Test or extract entries.
    Extract = 1,
    /// Enumerate headers, including continuation parts of split entries.
    ListIncSplit = 2,
}

impl OpenMode {
    /// Returns `true` for the two listing modes.
    pub fn is_list(&self) -> bool {
        matches!(self, OpenMode::List | OpenMode::ListIncSplit)
    }
}

/// What to do with the entry returned by the last `read_header`.
///
/// Discriminants follow the `RAR_SKIP`/`RAR_TEST`/`RAR_EXTRACT` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Operation {
    /// Move past the entry.
    #[default]
    Skip = 0,
    /// Unpack and verify the entry without writing it.
    Test = 1,
    /// Unpack, verify and write the entry.
    Extract = 2,
}

/// Policy for handling existing files during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Replace existing files.
    #[default]
    Overwrite,
    /// Skip the entry when the destination exists.
    Skip,
    /// Fail with `ECreate` when the destination exists.
    Error,
}

/// Policy for link entries (symlinks and junctions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPolicy {
    /// Refuse every symbolic link.
    Forbid,
    /// Create links whose targets stay inside the destination.
    #[default]
    ValidateTargets,
    /// Create links without checking their targets.
    Allow,
}

/// How entry names are checked before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathSafety {
    /// Reject absolute names and any `..` component.
    #[default]
    Strict,
    /// Strip absolute prefixes and allow `..` as long as the result stays
    /// inside the destination.
    Relaxed,
}

/// Which file metadata is restored after extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreserveMetadata {
    /// Restore the modification time.
    pub modification_time: bool,
    /// Restore the last access time.
    pub access_time: bool,
    /// Restore permission bits (Unix) or the read-only flag (Windows).
    pub permissions: bool,
}

impl Default for PreserveMetadata {
    fn default() -> Self {
        Self {
            modification_time: true,
            access_time: false,
            permissions: true,
        }
    }
}

impl PreserveMetadata {
    /// Restores everything the archive records.
    pub fn all() -> Self {
        Self {
            modification_time: true,
            access_time: true,
            permissions: true,
        }
    }

    /// Restores nothing.
    pub fn none() -> Self {
        Self {
            modification_time: false,
            access_time: false,
            permissions: false,
        }
    }

    /// Restores timestamps only.
    pub fn times() -> Self {
        Self {
            modification_time: true,
            access_time: true,
            permissions: false,
        }
    }
}

/// Options for writing entries to disk.
#[must_use]
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Policy for existing files.
    pub overwrite: OverwritePolicy,
    /// Entry name validation.
    pub path_safety: PathSafety,
    /// Symbolic link handling.
    pub link_policy: LinkPolicy,
    /// Metadata to restore.
    pub preserve_metadata: PreserveMetadata,
}

impl ExtractOptions {
    /// Creates options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overwrite policy.
    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Sets the path safety policy.
    pub fn path_safety(mut self, policy: PathSafety) -> Self {
        self.path_safety = policy;
        self
    }

    /// Sets the link policy.
    pub fn link_policy(mut self, policy: LinkPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    /// Sets which metadata is restored.
    pub fn preserve_metadata(mut self, preserve: PreserveMetadata) -> Self {
        self.preserve_metadata = preserve;
        self
    }
}

/// Bounds applied to untrusted archive input.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest accepted block header.
    pub max_header_size: u64,
    /// Largest accepted key derivation exponent (never above 24).
    pub max_kdf_lg2: u8,
    /// Largest accepted dictionary for compressed entries.
    pub max_dictionary_size: u64,
    /// Largest archive comment that is read.
    pub max_comment_size: u64,
}

impl Default for Limits {
    /// | Limit | Default |
    /// |-------|---------|
    /// | `max_header_size` | 2 MiB |
    /// | `max_kdf_lg2` | 24 |
    /// | `max_dictionary_size` | 4 GiB |
    /// | `max_comment_size` | 256 KiB |
    fn default() -> Self {
        Self {
            max_header_size: MAX_HEADER_SIZE,
            max_kdf_lg2: MAX_KDF_LG2,
            max_dictionary_size: 4 << 30,
            max_comment_size: 256 << 10,
        }
    }
}

impl Limits {
    /// Sets the maximum header size.
    pub fn max_header_size(mut self, max: u64) -> Self {
        self.max_header_size = max;
        self
    }

    /// Sets the maximum key derivation exponent.
    pub fn max_kdf_lg2(mut self, max: u8) -> Self {
        self.max_kdf_lg2 = max.min(MAX_KDF_LG2);
        self
    }

    /// Sets the maximum dictionary size.
    pub fn max_dictionary_size(mut self, max: u64) -> Self {
        self.max_dictionary_size = max;
        self
    }

    /// Sets the maximum comment size.
    pub fn max_comment_size(mut self, max: u64) -> Self {
        self.max_comment_size = max;
        self
    }
}

/// Everything needed to open a session.
///
/// # Example
///
/// ```rust,no_run
/// use rarkit::{Archive, OpenMode, OpenRequest, Password};
///
/// let request = OpenRequest::new("data.part1.rar")
///     .mode(OpenMode::Extract)
///     .password(Password::new("secret"))
///     .comment_capacity(1024);
/// let archive = Archive::open(request)?;
/// # Ok::<(), rarkit::Error>(())
/// ```
#[must_use]
pub struct OpenRequest {
    pub(crate) path: PathBuf,
    pub(crate) mode: OpenMode,
    pub(crate) password: Option<Password>,
    pub(crate) callbacks: Option<Box<dyn ArchiveCallbacks>>,
    pub(crate) keep_broken: bool,
    pub(crate) ignore_checksums: bool,
    pub(crate) volumes: Vec<PathBuf>,
    pub(crate) comment_capacity: Option<usize>,
    pub(crate) limits: Limits,
    pub(crate) codecs: CodecRegistry,
    pub(crate) extract: ExtractOptions,
}

impl std::fmt::Debug for OpenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRequest")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("password", &self.password.is_some())
            .field("callbacks", &self.callbacks.is_some())
            .field("keep_broken", &self.keep_broken)
            .field("ignore_checksums", &self.ignore_checksums)
            .field("volumes", &self.volumes)
            .field("comment_capacity", &self.comment_capacity)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl OpenRequest {
    /// Creates a request for the archive at `path` in [`OpenMode::List`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: OpenMode::default(),
            password: None,
            callbacks: None,
            keep_broken: false,
            ignore_checksums: false,
            volumes: Vec::new(),
            comment_capacity: None,
            limits: Limits::default(),
            codecs: CodecRegistry::default(),
            extract: ExtractOptions::default(),
        }
    }

    /// Creates a request from a UTF-16 archive name.
    ///
    /// Unpaired surrogates are replaced with U+FFFD.
    pub fn from_wide(path: &[u16]) -> Self {
        let end = path.iter().position(|&c| c == 0).unwrap_or(path.len());
        Self::new(String::from_utf16_lossy(&path[..end]))
    }

    /// Path of the archive (its first volume, usually).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sets the open mode.
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the password used for encrypted headers and entries.
    pub fn password(mut self, password: impl Into<Password>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Installs application callbacks.
    pub fn callbacks(mut self, callbacks: impl ArchiveCallbacks + 'static) -> Self {
        self.callbacks = Some(Box::new(callbacks));
        self
    }

    /// Keeps extracted files that fail verification and ends enumeration
    /// quietly at a damaged archive tail.
    pub fn keep_broken(mut self, keep: bool) -> Self {
        self.keep_broken = keep;
        self
    }

    /// Skips checksum verification of unpacked data.
    pub fn ignore_checksums(mut self, ignore: bool) -> Self {
        self.ignore_checksums = ignore;
        self
    }

    /// Lists volume paths to prefer over the computed names.
    pub fn volumes<I, P>(mut self, volumes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.volumes = volumes
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        self
    }

    /// Sets the size of the caller's comment buffer, terminator included.
    ///
    /// A longer comment is cut and reported as truncated.
    pub fn comment_capacity(mut self, capacity: usize) -> Self {
        self.comment_capacity = Some(capacity);
        self
    }

    /// Sets input bounds.
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Replaces the set of available decoders.
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Sets the options used when entries are written to disk.
    pub fn extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract = options;
        self
    }
}

impl From<&Path> for OpenRequest {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for OpenRequest {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&PathBuf> for OpenRequest {
    fn from(path: &PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&str> for OpenRequest {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for OpenRequest {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}
