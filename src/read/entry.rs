//! Archive entry types.

use crate::checksum::{BLAKE2SP_SIZE, HashKind, HashValue};
use crate::crypto::{MAX_KDF_LG2, Password, derive_keys};
use crate::format::files::{FileEncryption, FileHeader, HostOs, Redirect, UnixOwner};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Entry flags as reported to callers.
///
/// Bit values follow the `RHDF_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryFlags(u32);

impl EntryFlags {
    /// The entry continues data from the previous volume.
    pub const SPLIT_BEFORE: Self = Self(0x01);
    /// The entry continues in the next volume.
    pub const SPLIT_AFTER: Self = Self(0x02);
    /// The entry data is encrypted.
    pub const ENCRYPTED: Self = Self(0x04);
    /// The entry depends on the decoder state of earlier entries.
    pub const SOLID: Self = Self(0x10);
    /// The entry is a directory.
    pub const DIRECTORY: Self = Self(0x20);

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Creates flags from raw bits, keeping unknown bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns `true` if every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn set(&mut self, other: Self, on: bool) {
        if on {
            self.0 |= other.0;
        }
    }
}

impl std::ops::BitOr for EntryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Metadata of one archive entry, as produced by `read_header`.
///
/// For split entries, sizes describe the part stored in the current volume
/// except `unpacked_size`, which always covers the whole file.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct EntryHeader {
    /// Entry name with `/` separators.
    pub name: String,
    /// Packed bytes in this volume.
    pub packed_size: u64,
    /// Unpacked size, 0 when unknown (see `unpacked_size_known`).
    pub unpacked_size: u64,
    /// Whether the archive recorded the unpacked size.
    pub unpacked_size_known: bool,
    /// System the entry was archived on.
    pub host_os: HostOs,
    /// Stored checksum. For encrypted entries this may be a keyed MAC.
    pub hash: Option<HashValue>,
    /// Modification time.
    pub modified: Option<Timestamp>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// Last access time.
    pub accessed: Option<Timestamp>,
    /// Compression method, 0 (store) to 5 (best).
    pub method: u8,
    /// Unpack algorithm version (50 or 70).
    pub unpack_version: u8,
    /// Dictionary size in bytes.
    pub dictionary_size: u64,
    /// Host file attributes.
    pub attributes: u64,
    /// Entry flags.
    pub flags: EntryFlags,
    /// Link or file copy information.
    pub redirect: Option<Redirect>,
    /// Unix owner information.
    pub owner: Option<UnixOwner>,
    /// Zero-based number of the volume holding this header.
    pub volume: u64,
    pub(crate) encryption: Option<FileEncryption>,
}

impl EntryHeader {
    pub(crate) fn from_file(header: &FileHeader, volume: u64) -> Self {
        let mut flags = EntryFlags::default();
        flags.set(EntryFlags::SPLIT_BEFORE, header.split_before());
        flags.set(EntryFlags::SPLIT_AFTER, header.split_after());
        flags.set(EntryFlags::ENCRYPTED, header.is_encrypted());
        flags.set(EntryFlags::SOLID, header.compression.is_solid());
        flags.set(EntryFlags::DIRECTORY, header.is_directory());
        Self {
            name: header.name.clone(),
            packed_size: header.packed_size(),
            unpacked_size: header.unpacked_size.unwrap_or(0),
            unpacked_size_known: header.unpacked_size.is_some(),
            host_os: header.host_os,
            hash: header.expected_hash(),
            modified: header.times.modified,
            created: header.times.created,
            accessed: header.times.accessed,
            method: header.compression.method(),
            unpack_version: header.compression.unpack_version(),
            dictionary_size: header.compression.dictionary_size(),
            attributes: header.attributes,
            flags,
            redirect: header.redirect.clone(),
            owner: header.owner.clone(),
            volume,
            encryption: header.encryption.clone(),
        }
    }

    /// Returns `true` for directories.
    pub fn is_directory(&self) -> bool {
        self.flags.contains(EntryFlags::DIRECTORY)
    }

    /// Returns `true` if the entry data is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.flags.contains(EntryFlags::ENCRYPTED)
    }

    /// Returns `true` for symbolic links and junctions.
    pub fn is_symlink(&self) -> bool {
        self.redirect.as_ref().is_some_and(|r| r.kind.is_symlink())
    }

    /// Returns `true` if the entry continues from the previous volume.
    pub fn is_split_before(&self) -> bool {
        self.flags.contains(EntryFlags::SPLIT_BEFORE)
    }

    /// Returns `true` if the entry continues in the next volume.
    pub fn is_split_after(&self) -> bool {
        self.flags.contains(EntryFlags::SPLIT_AFTER)
    }

    /// Returns `true` if the stored checksum is keyed with the password.
    pub fn uses_hash_mac(&self) -> bool {
        self.encryption.as_ref().is_some_and(|e| e.uses_hash_mac())
    }

    /// Name as UTF-16 code units, without terminator.
    pub fn name_wide(&self) -> Vec<u16> {
        self.name.encode_utf16().collect()
    }

    /// Copies the NUL-terminated UTF-8 name into `buf`.
    ///
    /// Returns the number of bytes written, terminator included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SmallBuffer`] when `buf` cannot hold the name; the
    /// buffer is left untouched.
    pub fn copy_name_to(&self, buf: &mut [u8]) -> Result<usize> {
        copy_terminated(self.name.as_bytes(), buf)
    }

    /// Copies the NUL-terminated UTF-16 link target into `buf`.
    ///
    /// Returns the number of code units written, or 0 for non-link entries.
    pub fn copy_redirect_target_to(&self, buf: &mut [u16]) -> Result<usize> {
        match &self.redirect {
            Some(redirect) => {
                let wide: Vec<u16> = redirect.target.encode_utf16().collect();
                copy_terminated(&wide, buf)
            }
            None => Ok(0),
        }
    }

    /// Tests `password` against the entry's stored check value.
    ///
    /// Returns `None` when the entry is not encrypted or carries no usable
    /// check value, so only a full test can tell.
    pub fn check_password(&self, password: &Password) -> Option<bool> {
        let encryption = self.encryption.as_ref()?;
        let check = encryption.usable_check()?;
        match derive_keys(password, &encryption.salt, encryption.lg2_count, MAX_KDF_LG2) {
            Ok(keys) => Some(keys.matches(check)),
            Err(err) => {
                log::debug!("password check for '{}' failed: {}", self.name, err);
                None
            }
        }
    }
}

fn copy_terminated<T: Copy + Default>(src: &[T], buf: &mut [T]) -> Result<usize> {
    let needed = src.len() + 1;
    if buf.len() < needed {
        return Err(Error::SmallBuffer {
            needed,
            capacity: buf.len(),
        });
    }
    buf[..src.len()].copy_from_slice(src);
    buf[src.len()] = T::default();
    Ok(needed)
}

/// Host OS code as reported to callers (`2` Windows, `3` Unix).
fn host_os_code(host: HostOs) -> u32 {
    match host {
        HostOs::Windows => 2,
        HostOs::Unix => 3,
        HostOs::Other(_) => 0,
    }
}

/// Method code as reported to callers (`0x30` store to `0x35` best).
fn method_code(method: u8) -> u32 {
    0x30 + u32::from(method)
}

fn low(v: u64) -> u32 {
    v as u32
}

fn high(v: u64) -> u32 {
    (v >> 32) as u32
}

/// Fixed-capacity name buffer of the basic header record.
pub const BASIC_NAME_CAPACITY: usize = 260;

/// Legacy header record with 32-bit sizes and a bounded narrow name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicHeader {
    /// Entry name, shorter than [`BASIC_NAME_CAPACITY`] bytes.
    pub name: String,
    /// `RHDF_*` flags.
    pub flags: u32,
    /// Low 32 bits of the packed size.
    pub packed_size: u32,
    /// Low 32 bits of the unpacked size.
    pub unpacked_size: u32,
    /// Host OS code.
    pub host_os: u32,
    /// CRC-32 of the data, 0 when the entry uses another hash.
    pub file_crc: u32,
    /// Modification time in DOS format.
    pub file_time: u32,
    /// Unpack version.
    pub unpack_version: u32,
    /// Method code.
    pub method: u32,
    /// Low 32 bits of the attributes.
    pub file_attr: u32,
}

impl BasicHeader {
    /// Builds the record, failing if the name does not fit.
    pub fn from_entry(entry: &EntryHeader) -> Result<Self> {
        let needed = entry.name.len() + 1;
        if needed > BASIC_NAME_CAPACITY {
            return Err(Error::SmallBuffer {
                needed,
                capacity: BASIC_NAME_CAPACITY,
            });
        }
        Ok(Self {
            name: entry.name.clone(),
            flags: entry.flags.bits(),
            packed_size: low(entry.packed_size),
            unpacked_size: low(entry.unpacked_size),
            host_os: host_os_code(entry.host_os),
            file_crc: entry.hash.and_then(|h| h.crc32()).unwrap_or(0),
            file_time: entry.modified.map(|t| t.to_dos_time()).unwrap_or(0),
            unpack_version: u32::from(entry.unpack_version),
            method: method_code(entry.method),
            file_attr: low(entry.attributes),
        })
    }
}

/// Layout version of [`HeaderRecord`].
pub const RECORD_VERSION: u32 = 1;

/// Extended header record with split 64-bit values and wide strings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct HeaderRecord {
    /// Layout version, [`RECORD_VERSION`].
    pub version: u32,
    /// Entry name.
    pub name: String,
    /// Entry name as UTF-16.
    pub name_wide: Vec<u16>,
    /// `RHDF_*` flags.
    pub flags: u32,
    /// Packed size, low half.
    pub pack_size: u32,
    /// Packed size, high half.
    pub pack_size_high: u32,
    /// Unpacked size, low half.
    pub unp_size: u32,
    /// Unpacked size, high half.
    pub unp_size_high: u32,
    /// Host OS code.
    pub host_os: u32,
    /// CRC-32 of the data, 0 when the entry uses another hash.
    pub file_crc: u32,
    /// Modification time in DOS format.
    pub file_time: u32,
    /// Unpack version.
    pub unp_ver: u32,
    /// Method code.
    pub method: u32,
    /// Low 32 bits of the attributes.
    pub file_attr: u32,
    /// Dictionary size in KiB.
    pub dict_size: u32,
    /// `RAR_HASH_*` kind of `hash`.
    pub hash_type: u32,
    /// BLAKE2sp digest, zeroed for other kinds.
    pub hash: [u8; BLAKE2SP_SIZE],
    /// `FSREDIR_*` code, 0 for regular entries.
    pub redir_type: u32,
    /// Link target as UTF-16.
    pub redir_name: Vec<u16>,
    /// 1 if the link target is a directory.
    pub dir_target: u32,
    /// Modification time FILETIME, low half.
    pub mtime_low: u32,
    /// Modification time FILETIME, high half.
    pub mtime_high: u32,
    /// Creation time FILETIME, low half.
    pub ctime_low: u32,
    /// Creation time FILETIME, high half.
    pub ctime_high: u32,
    /// Access time FILETIME, low half.
    pub atime_low: u32,
    /// Access time FILETIME, high half.
    pub atime_high: u32,
}

impl HeaderRecord {
    /// Reassembled packed size.
    pub fn packed_size(&self) -> u64 {
        u64::from(self.pack_size_high) << 32 | u64::from(self.pack_size)
    }

    /// Reassembled unpacked size.
    pub fn unpacked_size(&self) -> u64 {
        u64::from(self.unp_size_high) << 32 | u64::from(self.unp_size)
    }

    /// Reassembled modification time.
    pub fn modified(&self) -> Timestamp {
        Timestamp::from_parts(self.mtime_high, self.mtime_low)
    }
}

impl From<&EntryHeader> for HeaderRecord {
    fn from(entry: &EntryHeader) -> Self {
        let (hash_type, hash) = match entry.hash {
            Some(HashValue::Blake2sp(digest)) => (HashKind::Blake2sp, digest),
            Some(HashValue::Crc32(_)) => (HashKind::Crc32, [0u8; BLAKE2SP_SIZE]),
            None => (HashKind::None, [0u8; BLAKE2SP_SIZE]),
        };
        let (redir_type, redir_name, dir_target) = match &entry.redirect {
            Some(r) => (
                r.kind.code() as u32,
                r.target.encode_utf16().collect(),
                u32::from(r.target_is_dir),
            ),
            None => (0, Vec::new(), 0),
        };
        let parts = |t: Option<Timestamp>| t.map(|t| t.to_parts()).unwrap_or((0, 0));
        let (mtime_high, mtime_low) = parts(entry.modified);
        let (ctime_high, ctime_low) = parts(entry.created);
        let (atime_high, atime_low) = parts(entry.accessed);
        Self {
            version: RECORD_VERSION,
            name: entry.name.clone(),
            name_wide: entry.name_wide(),
            flags: entry.flags.bits(),
            pack_size: low(entry.packed_size),
            pack_size_high: high(entry.packed_size),
            unp_size: low(entry.unpacked_size),
            unp_size_high: high(entry.unpacked_size),
            host_os: host_os_code(entry.host_os),
            file_crc: entry.hash.and_then(|h| h.crc32()).unwrap_or(0),
            file_time: entry.modified.map(|t| t.to_dos_time()).unwrap_or(0),
            unp_ver: u32::from(entry.unpack_version),
            method: method_code(entry.method),
            file_attr: low(entry.attributes),
            dict_size: (entry.dictionary_size >> 10).min(u64::from(u32::MAX)) as u32,
            hash_type: hash_type as u32,
            hash,
            redir_type,
            redir_name,
            dir_target,
            mtime_low,
            mtime_high,
            ctime_low,
            ctime_high,
            atime_low,
            atime_high,
        }
    }
}
