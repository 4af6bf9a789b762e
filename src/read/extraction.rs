//! Entry processing: skip, test and extract.
//!
//! All three operations end with the volume cursor positioned after the
//! entry's last data part, so the next `read_header` continues from there.
//! Test and extract run the entry through its unpacker into an
//! [`EntrySink`], which feeds the data callback, the output and the running
//! checksum in one pass.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::destination::Destination;
use super::info::ProcessOutcome;
use super::metadata::apply_metadata;
use super::multivolume::PackedStream;
use super::options::{LinkPolicy, OpenMode, Operation, OverwritePolicy};
use super::path_safety::{
    create_symlink, ensure_contained, ensure_existing_contained, validate_path,
    validate_symlink_target,
};
use super::{Archive, Pending};
use crate::READ_BUFFER_SIZE;
use crate::callback::{CallbackContext, DataFlow};
use crate::checksum::{EntryHasher, HashValue};
use crate::codec::{UnpackParams, method};
use crate::crypto::{CbcReader, DerivedKeys, mac_hash};
use crate::format::files::{FileHeader, Redirect, RedirectKind};
use crate::{Error, Result};

/// Carried inside an `io::Error` when the data callback stops an entry.
#[derive(Debug)]
struct AbortSignal;

impl fmt::Display for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stopped by the data callback")
    }
}

impl std::error::Error for AbortSignal {}

fn is_abort(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<AbortSignal>())
}

/// Output side of an unpacker.
struct EntrySink<'a, W: Write + ?Sized> {
    out: &'a mut W,
    path: Option<&'a Path>,
    callbacks: Option<&'a CallbackContext>,
    hasher: EntryHasher,
    written: u64,
}

impl<W: Write + ?Sized> Write for EntrySink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(callbacks) = self.callbacks {
            if callbacks.process_data(buf) == DataFlow::Abort {
                return Err(io::Error::other(AbortSignal));
            }
        }
        self.out.write_all(buf).map_err(|source| {
            Error::Write {
                path: self.path.map(Path::to_path_buf),
                source,
            }
            .into_io()
        })?;
        self.hasher.update(buf);
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush().map_err(|source| {
            Error::Write {
                path: self.path.map(Path::to_path_buf),
                source,
            }
            .into_io()
        })
    }
}

/// How a run of the unpacker ended.
enum UnpackRun {
    Done { bytes: u64 },
    Aborted { bytes: u64 },
}

/// Compares the computed checksum with the one stored in `part`, the
/// entry's final part.
///
/// Keyed checksums are transformed with the hash key first. A mismatch on
/// an encrypted entry without a usable password check is blamed on the
/// password.
pub(super) fn verify_checksum(
    part: &FileHeader,
    actual: Option<HashValue>,
    keys: Option<&DerivedKeys>,
    ignore_checksums: bool,
) -> Result<()> {
    let (Some(expected), Some(mut actual)) = (part.expected_hash(), actual) else {
        return Ok(());
    };
    if expected.kind() != actual.kind() {
        log::warn!(
            "'{}' changes checksum kind between parts, not verified",
            part.name
        );
        return Ok(());
    }
    let encryption = part.encryption.as_ref();
    if let (Some(enc), Some(keys)) = (encryption, keys) {
        if enc.uses_hash_mac() {
            actual = mac_hash(&keys.hash_key, actual)?;
        }
    }
    if actual == expected {
        return Ok(());
    }
    if encryption.is_some_and(|e| e.usable_check().is_none()) {
        return Err(Error::WrongPassword {
            entry: Some(part.name.clone()),
        });
    }
    if ignore_checksums {
        log::warn!(
            "checksum mismatch for '{}' ignored (expected {}, got {})",
            part.name,
            expected,
            actual
        );
        return Ok(());
    }
    Err(Error::ChecksumMismatch {
        entry: part.name.clone(),
        expected,
        actual,
    })
}

/// Without a password check, damaged-looking data from an encrypted entry
/// most likely means the key is wrong.
fn blame_password(err: Error, header: &FileHeader) -> Error {
    let unverified = header
        .encryption
        .as_ref()
        .is_some_and(|e| e.usable_check().is_none());
    if unverified && err.is_corruption() {
        Error::WrongPassword {
            entry: Some(header.name.clone()),
        }
    } else {
        err
    }
}

fn unpack_error(err: io::Error, header: &FileHeader) -> Error {
    let err = if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::corrupt(
            header.block.data_offset,
            format!("packed data of '{}' ends before its unpacked size", header.name),
        )
    } else {
        Error::from_io(err)
    };
    blame_password(err, header)
}

fn remove_partial(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        log::warn!("Failed to remove partial file '{}': {}", path.display(), e);
    }
}

fn create_error(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Create {
        path: path.to_path_buf(),
        source,
    }
}

/// What a redirect entry turns into on disk.
enum LinkPlan {
    Symlink,
    /// Hard link or copy of an already extracted file.
    Reference(PathBuf),
    Unsupported,
}

impl Archive {
    /// Processes the entry returned by the last
    /// [`read_header`](Archive::read_header).
    ///
    /// `destination` only matters for [`Operation::Extract`]; `None` extracts
    /// below the current directory. In the list modes every operation is
    /// performed as a skip.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] without a current header,
    /// - [`Error::ChecksumMismatch`] when the data fails verification,
    /// - [`Error::PasswordRequired`] / [`Error::WrongPassword`] for
    ///   encrypted entries,
    /// - [`Error::PathTraversal`], [`Error::AlreadyExists`] and link errors
    ///   for unsafe or conflicting destinations.
    ///
    /// The entry is consumed even when an error is returned.
    pub fn process_file(
        &mut self,
        operation: Operation,
        destination: Option<&Destination>,
    ) -> Result<ProcessOutcome> {
        let pending = self
            .current
            .take()
            .ok_or(Error::InvalidState("no current header to process"))?;

        let operation = if self.mode.is_list() && operation != Operation::Skip {
            log::debug!(
                "{:?} of '{}' performed as skip in {:?} mode",
                operation,
                pending.entry.name,
                self.mode
            );
            Operation::Skip
        } else {
            operation
        };

        match operation {
            Operation::Skip => self.skip_entry(&pending),
            Operation::Test => self.test_entry(&pending),
            Operation::Extract => self.extract_entry(&pending, destination),
        }
    }

    /// Extracts the current entry into `writer`.
    ///
    /// Directories and links produce no data. In the list modes the entry
    /// is skipped.
    pub fn process_to_writer(&mut self, writer: &mut dyn Write) -> Result<ProcessOutcome> {
        let pending = self
            .current
            .take()
            .ok_or(Error::InvalidState("no current header to process"))?;
        if self.mode.is_list() {
            log::debug!("'{}' skipped in {:?} mode", pending.entry.name, self.mode);
            return self.skip_entry(&pending);
        }
        if pending.entry.is_directory() || pending.entry.redirect.is_some() {
            return Ok(ProcessOutcome::Extracted {
                path: None,
                bytes: 0,
            });
        }
        Ok(match self.unpack_entry(&pending, writer, None, true, true)? {
            UnpackRun::Done { bytes } => ProcessOutcome::Extracted { path: None, bytes },
            UnpackRun::Aborted { bytes } => ProcessOutcome::Aborted { bytes },
        })
    }

    fn skip_entry(&mut self, pending: &Pending) -> Result<ProcessOutcome> {
        let header = &pending.header;
        // Later entries of a solid stream need this one decoded.
        if self.mode == OpenMode::Extract
            && self.info.is_solid()
            && header.compression.method() != method::STORE
            && header.block.has_data()
            && !header.is_directory()
        {
            log::debug!("decoding skipped solid entry '{}'", header.name);
            self.unpack_entry(pending, &mut io::sink(), None, false, false)?;
        }
        Ok(ProcessOutcome::Skipped)
    }

    fn test_entry(&mut self, pending: &Pending) -> Result<ProcessOutcome> {
        if pending.entry.is_directory() || pending.entry.redirect.is_some() {
            return Ok(ProcessOutcome::Tested { bytes: 0 });
        }
        Ok(match self.unpack_entry(pending, &mut io::sink(), None, true, true)? {
            UnpackRun::Done { bytes } => ProcessOutcome::Tested { bytes },
            UnpackRun::Aborted { bytes } => ProcessOutcome::Aborted { bytes },
        })
    }

    fn extract_entry(
        &mut self,
        pending: &Pending,
        destination: Option<&Destination>,
    ) -> Result<ProcessOutcome> {
        let default = Destination::default();
        let destination = destination.unwrap_or(&default);
        let options = self.extract_options.clone();
        let entry = &pending.entry;

        let target = match destination {
            Destination::Directory(dir) => {
                let target = validate_path(&entry.name, dir, options.path_safety)?;
                ensure_contained(&entry.name, dir, &target)?;
                target
            }
            Destination::File(path) => path.clone(),
        };

        if entry.is_directory() {
            fs::create_dir_all(&target).map_err(create_error(&target))?;
            apply_metadata(&target, &options.preserve_metadata, entry);
            return Ok(ProcessOutcome::Extracted {
                path: Some(target),
                bytes: 0,
            });
        }

        let plan = match &entry.redirect {
            Some(redirect) => Some(self.plan_link(entry.name.as_str(), redirect, destination)?),
            None => None,
        };
        if let Some(LinkPlan::Unsupported) = plan {
            log::warn!("'{}' has an unsupported redirection, skipped", entry.name);
            return Ok(ProcessOutcome::Skipped);
        }

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(create_error(parent))?;
        }

        if let Ok(existing) = fs::symlink_metadata(&target) {
            match options.overwrite {
                OverwritePolicy::Error => return Err(Error::AlreadyExists { path: target }),
                OverwritePolicy::Skip => {
                    log::debug!("'{}' exists, skipping", target.display());
                    return self.skip_entry(pending);
                }
                OverwritePolicy::Overwrite => {
                    if existing.file_type().is_symlink() || plan.is_some() {
                        fs::remove_file(&target).map_err(create_error(&target))?;
                    }
                }
            }
        }

        match (plan, &entry.redirect) {
            (Some(LinkPlan::Symlink), Some(redirect)) => {
                create_symlink(&target, &redirect.target, redirect.target_is_dir)?;
                return Ok(ProcessOutcome::Extracted {
                    path: Some(target),
                    bytes: 0,
                });
            }
            (Some(LinkPlan::Reference(source)), Some(redirect)) => {
                let bytes = if redirect.kind == RedirectKind::HardLink {
                    fs::hard_link(&source, &target).map_err(create_error(&target))?;
                    0
                } else {
                    let bytes = fs::copy(&source, &target).map_err(create_error(&target))?;
                    apply_metadata(&target, &options.preserve_metadata, entry);
                    bytes
                };
                return Ok(ProcessOutcome::Extracted {
                    path: Some(target),
                    bytes,
                });
            }
            _ => {}
        }

        // Fail on a bad password before anything is created.
        if let Some(enc) = &entry.encryption {
            self.gate.unlock(
                &self.callbacks,
                Some(&entry.name),
                &enc.salt,
                enc.lg2_count,
                enc.usable_check(),
            )?;
        }

        let file = File::create(&target).map_err(create_error(&target))?;
        let mut writer = BufWriter::with_capacity(READ_BUFFER_SIZE, file);
        let run = self
            .unpack_entry(pending, &mut writer, Some(&target), true, true)
            .and_then(|run| {
                writer.flush().map_err(|source| Error::Write {
                    path: Some(target.clone()),
                    source,
                })?;
                Ok(run)
            });
        drop(writer);

        match run {
            Ok(UnpackRun::Done { bytes }) => {
                apply_metadata(&target, &options.preserve_metadata, entry);
                Ok(ProcessOutcome::Extracted {
                    path: Some(target),
                    bytes,
                })
            }
            Ok(UnpackRun::Aborted { bytes }) => {
                remove_partial(&target);
                Ok(ProcessOutcome::Aborted { bytes })
            }
            Err(e) => {
                if self.keep_broken {
                    log::warn!("keeping damaged file '{}': {}", target.display(), e);
                } else {
                    remove_partial(&target);
                }
                Err(e)
            }
        }
    }

    /// Applies the link policy and resolves reference targets.
    fn plan_link(
        &self,
        name: &str,
        redirect: &Redirect,
        destination: &Destination,
    ) -> Result<LinkPlan> {
        match redirect.kind {
            kind if kind.is_symlink() => {
                match self.extract_options.link_policy {
                    LinkPolicy::Forbid => {
                        return Err(Error::SymlinkRejected {
                            path: name.to_string(),
                        });
                    }
                    LinkPolicy::ValidateTargets => validate_symlink_target(name, &redirect.target)?,
                    LinkPolicy::Allow => {}
                }
                Ok(LinkPlan::Symlink)
            }
            RedirectKind::HardLink | RedirectKind::FileCopy => {
                let source = validate_path(
                    &redirect.target,
                    destination.root(),
                    self.extract_options.path_safety,
                )
                .map_err(|e| match e {
                    Error::PathTraversal { .. } => Error::SymlinkTargetEscape {
                        path: name.to_string(),
                        target: redirect.target.clone(),
                    },
                    other => other,
                })?;
                if fs::symlink_metadata(&source).is_err() {
                    return Err(Error::ReferenceMissing {
                        path: name.to_string(),
                        target: redirect.target.clone(),
                    });
                }
                ensure_existing_contained(name, destination.root(), &source).map_err(|e| match e {
                    Error::PathTraversal { .. } => Error::SymlinkTargetEscape {
                        path: name.to_string(),
                        target: redirect.target.clone(),
                    },
                    other => other,
                })?;
                Ok(LinkPlan::Reference(source))
            }
            _ => Ok(LinkPlan::Unsupported),
        }
    }

    /// Runs the entry's packed data through its unpacker into `out`.
    ///
    /// With `notify`, every chunk goes to the data callback first; with
    /// `verify`, the result is checked against the stored checksum. The
    /// packed stream is always read to the end of the entry's last part.
    fn unpack_entry(
        &mut self,
        pending: &Pending,
        out: &mut dyn Write,
        path: Option<&Path>,
        notify: bool,
        verify: bool,
    ) -> Result<UnpackRun> {
        let header = &pending.header;
        let params = UnpackParams {
            method: header.compression.method(),
            version: header.compression.version(),
            dictionary_size: header.compression.dictionary_size(),
            solid: header.compression.is_solid(),
            unpacked_size: header.unpacked_size,
        };
        if params.method != method::STORE && params.dictionary_size > self.limits.max_dictionary_size
        {
            return Err(Error::ResourceLimitExceeded(format!(
                "'{}' needs a {} byte dictionary, limit is {}",
                header.name, params.dictionary_size, self.limits.max_dictionary_size
            )));
        }

        let keys = match &header.encryption {
            Some(enc) => Some(self.gate.unlock(
                &self.callbacks,
                Some(&header.name),
                &enc.salt,
                enc.lg2_count,
                enc.usable_check(),
            )?),
            None => None,
        };

        let mut unpacker = match self.solid.take() {
            Some(unpacker) if params.solid && unpacker.method() == params.method => unpacker,
            _ => self.codecs.create(&params)?,
        };

        let mut sink = EntrySink {
            out,
            path,
            callbacks: notify.then_some(&self.callbacks),
            hasher: EntryHasher::new(
                header
                    .expected_hash()
                    .map(|h| h.kind())
                    .unwrap_or_default(),
            ),
            written: 0,
        };
        let mut packed = PackedStream::new(
            &mut self.cursor,
            &mut self.gate,
            &self.callbacks,
            &self.limits,
            header.clone(),
            keys.as_ref().map(|k| k.hash_key),
            self.ignore_checksums,
        )?;

        let result = match (&keys, &header.encryption) {
            (Some(keys), Some(enc)) => {
                let mut input = CbcReader::new(&mut packed, keys.key, enc.iv);
                unpacker.unpack(&params, &mut input, &mut sink)
            }
            _ => unpacker.unpack(&params, &mut packed, &mut sink),
        };
        match result {
            Ok(_) => {}
            Err(e) if is_abort(&e) => {
                log::debug!(
                    "'{}' stopped by the data callback after {} bytes",
                    header.name,
                    sink.written
                );
                return Ok(UnpackRun::Aborted {
                    bytes: sink.written,
                });
            }
            Err(e) => return Err(unpack_error(e, header)),
        }

        packed.drain().map_err(|e| blame_password(e, header))?;
        if verify {
            verify_checksum(
                packed.part(),
                sink.hasher.finalize(),
                keys.as_ref(),
                self.ignore_checksums,
            )?;
        }
        let written = sink.written;
        if let Some(expected) = header.unpacked_size {
            if verify && written != expected {
                return Err(Error::corrupt(
                    header.block.offset,
                    format!(
                        "'{}' unpacked to {} bytes, header says {}",
                        header.name, written, expected
                    ),
                ));
            }
        }

        if self.info.is_solid() && params.method != method::STORE {
            self.solid = Some(unpacker);
        }
        Ok(UnpackRun::Done { bytes: written })
    }
}
