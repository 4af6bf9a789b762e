//! Metadata preservation for extracted files.
//!
//! Failures here are logged and otherwise ignored: the data has already been
//! written and verified.

use std::path::Path;

use crate::format::files::HostOs;

use super::PreserveMetadata;
use super::entry::EntryHeader;

/// Windows read-only attribute bit.
const FILE_ATTRIBUTE_READONLY: u64 = 0x01;

/// Applies timestamps and permissions recorded for `entry` to `path`.
pub(crate) fn apply_metadata(path: &Path, options: &PreserveMetadata, entry: &EntryHeader) {
    if options.permissions {
        apply_permissions(path, entry.host_os, entry.attributes);
    }

    if options.modification_time {
        if let Some(mtime) = entry.modified.filter(|t| !t.is_zero()) {
            if let Err(e) = filetime::set_file_mtime(path, mtime.to_file_time()) {
                log::warn!(
                    "Failed to set modification time on '{}': {}",
                    path.display(),
                    e
                );
            }
        }
    }

    if options.access_time {
        if let Some(atime) = entry.accessed.filter(|t| !t.is_zero()) {
            if let Err(e) = filetime::set_file_atime(path, atime.to_file_time()) {
                log::warn!("Failed to set access time on '{}': {}", path.display(), e);
            }
        }
    }
}

/// Applies permission bits (Unix hosts) or the read-only flag (Windows hosts).
#[cfg(unix)]
fn apply_permissions(path: &Path, host: HostOs, attributes: u64) {
    use std::os::unix::fs::PermissionsExt;

    let mode = match host {
        HostOs::Unix => (attributes & 0o7777) as u32,
        HostOs::Windows if attributes & FILE_ATTRIBUTE_READONLY != 0 => 0o444,
        _ => return,
    };
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)) {
        log::warn!("Failed to set permissions on '{}': {}", path.display(), e);
    }
}

/// Applies the read-only flag (Windows).
#[cfg(not(unix))]
fn apply_permissions(path: &Path, host: HostOs, attributes: u64) {
    let readonly = match host {
        HostOs::Windows => attributes & FILE_ATTRIBUTE_READONLY != 0,
        HostOs::Unix => attributes & 0o200 == 0,
        HostOs::Other(_) => false,
    };
    if !readonly {
        return;
    }
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let mut perms = metadata.permissions();
            perms.set_readonly(true);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                log::warn!(
                    "Failed to set read-only attribute on '{}': {}",
                    path.display(),
                    e
                );
            }
        }
        Err(e) => log::warn!("Cannot read metadata of '{}': {}", path.display(), e),
    }
}
