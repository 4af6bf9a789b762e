//! One-call helpers built on the session API.
//!
//! Each helper opens its own session in the mode it needs, walks the
//! entries with `read_header`/`process_file` and closes the session again.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::destination::Destination;
use super::entry::EntryHeader;
use super::info::{ArchiveSummary, ExtractSummary};
use super::options::{OpenMode, OpenRequest, Operation};
use super::Archive;
use crate::crypto::Password;
use crate::{Error, Result};

/// What [`Archive::extract_with`] does with an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryAction {
    /// Leave the entry out.
    Skip,
    /// Skip the entry and end extraction.
    Stop,
    /// Extract below this directory.
    ToDirectory(PathBuf),
    /// Extract to exactly this path.
    ToFile(PathBuf),
}

/// Adapts a chunk handler to `io::Write`.
struct ChunkWriter<F>(F);

impl<F: FnMut(&[u8])> Write for ChunkWriter<F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (self.0)(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Lists the entries of the archive at `path`.
///
/// Shorthand for [`Archive::entries`] with default options.
pub fn list_entries(path: impl AsRef<Path>) -> Result<Vec<EntryHeader>> {
    Archive::entries(OpenRequest::new(path))
}

impl Archive {
    /// Reads every entry header, skipping all data.
    ///
    /// Split entries appear once unless the request asks for
    /// [`OpenMode::ListIncSplit`].
    pub fn entries(request: impl Into<OpenRequest>) -> Result<Vec<EntryHeader>> {
        let request = request.into();
        let mode = match request.mode {
            OpenMode::ListIncSplit => OpenMode::ListIncSplit,
            _ => OpenMode::List,
        };
        let mut archive = Self::open(request.mode(mode))?;
        let mut entries = Vec::new();
        while let Some(entry) = archive.read_header()? {
            archive.skip_current()?;
            entries.push(entry);
        }
        archive.close()?;
        Ok(entries)
    }

    /// Collects totals over all entries.
    ///
    /// Packed sizes include every part of split entries.
    pub fn summarize(request: impl Into<OpenRequest>) -> Result<ArchiveSummary> {
        let mut archive = Self::open(request.into().mode(OpenMode::ListIncSplit))?;
        let info = archive.open_info();
        let mut summary = ArchiveSummary {
            password_protected: info.has_encrypted_headers(),
            is_solid: info.is_solid(),
            is_volume: info.is_volume(),
            ..ArchiveSummary::default()
        };
        while let Some(entry) = archive.read_header()? {
            archive.skip_current()?;
            summary.packed_size += entry.packed_size;
            summary.password_protected |= entry.is_encrypted();
            if entry.is_split_before() {
                continue;
            }
            summary.entry_count += 1;
            summary.unpacked_size += entry.unpacked_size;
            if entry.is_directory() {
                summary.directory_count += 1;
            }
        }
        archive.close()?;
        Ok(summary)
    }

    /// Extracts every entry below `dest`.
    ///
    /// Stops at the first error; entries already written stay on disk.
    pub fn extract_all(
        request: impl Into<OpenRequest>,
        dest: impl AsRef<Path>,
    ) -> Result<ExtractSummary> {
        let mut archive = Self::open(request.into().mode(OpenMode::Extract))?;
        let dest = dest.as_ref().to_path_buf();
        let summary = archive.extract_with(|_| EntryAction::ToDirectory(dest.clone()))?;
        archive.close()?;
        Ok(summary)
    }

    /// Extracts the entry called `name` into memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no entry has that name, and
    /// [`Error::Aborted`] if a data callback on the request stops it.
    pub fn extract_entry_to_vec(request: impl Into<OpenRequest>, name: &str) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        Self::extract_entry_with(request, name, |chunk| data.extend_from_slice(chunk))?;
        Ok(data)
    }

    /// Streams the entry called `name` through `handler`, chunk by chunk.
    ///
    /// Returns the number of bytes delivered. Both `/` and `\` are accepted
    /// as separators in `name`. An entry stopped by a data callback on the
    /// request fails with [`Error::Aborted`]; chunks already handed to
    /// `handler` are then incomplete.
    pub fn extract_entry_with<F>(
        request: impl Into<OpenRequest>,
        name: &str,
        handler: F,
    ) -> Result<u64>
    where
        F: FnMut(&[u8]),
    {
        let wanted = name.replace('\\', "/");
        let mut archive = Self::open(request.into().mode(OpenMode::Extract))?;
        let mut writer = ChunkWriter(handler);
        while let Some(entry) = archive.read_header()? {
            if entry.name != wanted {
                archive.skip_current()?;
                continue;
            }
            let outcome = archive.process_to_writer(&mut writer)?;
            archive.close()?;
            if outcome.is_aborted() {
                return Err(Error::Aborted { entry: entry.name });
            }
            return Ok(outcome.bytes());
        }
        archive.close()?;
        Err(Error::EntryNotFound {
            name: name.to_string(),
        })
    }

    /// Extracts the remaining entries, letting `choose` decide per entry.
    ///
    /// ```rust,no_run
    /// use rarkit::{Archive, EntryAction, OpenMode, OpenRequest};
    ///
    /// let mut archive = Archive::open(OpenRequest::new("docs.rar").mode(OpenMode::Extract))?;
    /// let summary = archive.extract_with(|entry| {
    ///     if entry.name.ends_with(".txt") {
    ///         EntryAction::ToDirectory("out".into())
    ///     } else {
    ///         EntryAction::Skip
    ///     }
    /// })?;
    /// println!("{} entries written", summary.entries_extracted);
    /// # Ok::<(), rarkit::Error>(())
    /// ```
    pub fn extract_with<F>(&mut self, mut choose: F) -> Result<ExtractSummary>
    where
        F: FnMut(&EntryHeader) -> EntryAction,
    {
        let mut summary = ExtractSummary::default();
        while let Some(entry) = self.read_header()? {
            let outcome = match choose(&entry) {
                EntryAction::Skip => self.process_file(Operation::Skip, None)?,
                EntryAction::Stop => {
                    self.skip_current()?;
                    break;
                }
                EntryAction::ToDirectory(dir) => {
                    self.process_file(Operation::Extract, Some(&Destination::Directory(dir)))?
                }
                EntryAction::ToFile(path) => {
                    self.process_file(Operation::Extract, Some(&Destination::File(path)))?
                }
            };
            summary.record(&outcome);
        }
        Ok(summary)
    }

    /// Skips the current entry, which has nothing to report.
    fn skip_current(&mut self) -> Result<()> {
        self.process_file(Operation::Skip, None).map(|_| ())
    }

    /// Tells whether `password` opens the archive.
    ///
    /// Encrypted headers are checked at open. Otherwise the first encrypted
    /// file decides, through its password check value or, without one, a
    /// full test. An archive with nothing encrypted accepts any password.
    pub fn validate_password(
        request: impl Into<OpenRequest>,
        password: impl Into<Password>,
    ) -> Result<bool> {
        let password = password.into();
        let request = request
            .into()
            .mode(OpenMode::Extract)
            .password(password.clone());
        let mut archive = match Self::open(request) {
            Ok(archive) => archive,
            Err(Error::WrongPassword { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };

        while let Some(entry) = archive.read_header()? {
            if !entry.is_encrypted() || entry.is_directory() {
                archive.skip_current()?;
                continue;
            }
            let valid = match entry.check_password(&password) {
                Some(valid) => {
                    archive.skip_current()?;
                    valid
                }
                None => match archive.process_file(Operation::Test, None) {
                    Ok(_) => true,
                    Err(Error::WrongPassword { .. }) => false,
                    Err(e) => return Err(e),
                },
            };
            archive.close()?;
            return Ok(valid);
        }
        archive.close()?;
        Ok(true)
    }
}
