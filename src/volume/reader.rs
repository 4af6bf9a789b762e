//! Access to a single volume file.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::format::parser::read_full;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// A buffered reader over one archive file that tracks its position.
///
/// The file handle stays open until the reader is dropped or
/// [`close`](VolumeReader::close)d.
pub struct VolumeReader {
    inner: BufReader<File>,
    path: PathBuf,
    position: u64,
    len: u64,
}

impl std::fmt::Debug for VolumeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeReader")
            .field("path", &self.path)
            .field("position", &self.position)
            .field("len", &self.len)
            .finish()
    }
}

impl VolumeReader {
    /// Opens the volume at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`]; its source keeps the [`io::ErrorKind`]
    /// (`NotFound`, `PermissionDenied`, ...).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let open_err = |source| Error::Open {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(open_err)?;
        let len = file.metadata().map_err(open_err)?.len();
        Ok(Self {
            inner: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            path: path.to_path_buf(),
            position: 0,
            len,
        })
    }

    /// Path of the volume.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of the volume file.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` for an empty file.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes between the current position and the end of the file.
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    /// Reads exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Truncated`] when the file ends first.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(n)
            .map_err(|_| Error::out_of_memory(n))?;
        buf.resize(n, 0);
        let start = self.position;
        let got = read_full(self, &mut buf)?;
        if got < n {
            return Err(Error::Truncated {
                offset: start + got as u64,
                needed: (n - got) as u64,
            });
        }
        Ok(buf)
    }

    /// Moves to absolute position `pos`.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        if pos != self.position {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(())
    }

    /// Releases the file handle.
    pub fn close(self) -> Result<()> {
        // Dropping a read-only handle cannot report errors on any supported
        // platform; the method exists so callers release volumes explicitly.
        drop(self.inner);
        Ok(())
    }
}

impl Read for VolumeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for VolumeReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.position = self.inner.seek(pos)?;
        Ok(self.position)
    }
}
