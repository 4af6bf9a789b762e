//! Extraction destinations.

use std::path::{Path, PathBuf};

/// Where `process_file` writes an extracted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A directory; the entry name is appended after validation.
    Directory(PathBuf),
    /// An exact output path, used as given.
    File(PathBuf),
}

impl Destination {
    /// Extract below `dir`.
    pub fn directory(dir: impl AsRef<Path>) -> Self {
        Destination::Directory(dir.as_ref().to_path_buf())
    }

    /// Extract to exactly `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Destination::File(path.as_ref().to_path_buf())
    }

    /// Creates a destination from a UTF-16 directory name.
    pub fn directory_wide(dir: &[u16]) -> Self {
        Self::directory(wide_to_string(dir))
    }

    /// Creates a destination from a UTF-16 file name.
    pub fn file_wide(path: &[u16]) -> Self {
        Self::file(wide_to_string(path))
    }

    /// Directory that hard link and file copy targets are resolved against.
    pub(crate) fn root(&self) -> &Path {
        match self {
            Destination::Directory(dir) => dir,
            Destination::File(path) => path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new(".")),
        }
    }
}

impl Default for Destination {
    /// The current directory.
    fn default() -> Self {
        Destination::Directory(PathBuf::from("."))
    }
}

fn wide_to_string(wide: &[u16]) -> String {
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}
