//! File and service headers.
//!
//! Both block types share one layout: a fixed set of fields followed by an
//! extra area holding optional records (encryption, hash, times, links,
//! ownership). [`FileHeader::decode`] reads all of it into owned values.

use super::header::{Block, BlockHeader, PasswordCheck};
use super::vint::ByteReader;
use super::{IV_SIZE, SALT_SIZE, block_type, crypt_flags, file_extra, file_flags};
use crate::checksum::{BLAKE2SP_SIZE, HashValue};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Operating system an entry was archived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostOs {
    /// Windows.
    #[default]
    Windows,
    /// Unix-like systems.
    Unix,
    /// A value this crate does not know.
    Other(u64),
}

impl HostOs {
    fn from_raw(raw: u64) -> Self {
        match raw {
            0 => HostOs::Windows,
            1 => HostOs::Unix,
            other => HostOs::Other(other),
        }
    }
}

/// Decoded compression information word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionInfo {
    raw: u64,
}

impl CompressionInfo {
    /// Wraps a raw compression information value.
    pub const fn new(raw: u64) -> Self {
        Self { raw }
    }

    /// Raw value as stored in the header.
    pub const fn raw(&self) -> u64 {
        self.raw
    }

    /// Algorithm version (0 for RAR 5.0, 1 for RAR 7.0).
    pub fn version(&self) -> u8 {
        (self.raw & 0x3F) as u8
    }

    /// Minimum unpacker version as reported to callers (50 or 70).
    pub fn unpack_version(&self) -> u8 {
        match self.version() {
            0 => 50,
            _ => 70,
        }
    }

    /// Entry continues the solid stream of the previous entry.
    pub fn is_solid(&self) -> bool {
        self.raw & 0x40 != 0
    }

    /// Compression method, 0 (store) to 5 (best).
    pub fn method(&self) -> u8 {
        ((self.raw >> 7) & 0x07) as u8
    }

    /// Dictionary size in bytes.
    pub fn dictionary_size(&self) -> u64 {
        let bits_mask = if self.version() == 0 { 0x0F } else { 0x1F };
        let bits = (self.raw >> 10) & bits_mask;
        let base = 0x2_0000u64 << bits;
        if self.version() == 0 {
            base
        } else {
            // Fractional part in 1/32 steps of the base size.
            base + base / 32 * ((self.raw >> 15) & 0x1F)
        }
    }
}

/// Per-file encryption parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEncryption {
    /// Encryption flags, see [`crypt_flags`].
    pub flags: u64,
    /// Binary logarithm of the PBKDF2 iteration count.
    pub lg2_count: u8,
    /// Key derivation salt.
    pub salt: [u8; SALT_SIZE],
    /// Initialization vector of the data stream.
    pub iv: [u8; IV_SIZE],
    /// Password check, if stored.
    pub check: Option<PasswordCheck>,
}

impl FileEncryption {
    /// Stored checksums are transformed with the hash key.
    pub fn uses_hash_mac(&self) -> bool {
        self.flags & crypt_flags::HASH_MAC != 0
    }

    /// Password check that can be trusted, if any.
    pub fn usable_check(&self) -> Option<&PasswordCheck> {
        self.check.as_ref().filter(|c| c.is_consistent())
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        let version = r.read_vint()?;
        if version != 0 {
            return Err(Error::UnsupportedEncryption { version });
        }
        let flags = r.read_vint()?;
        let lg2_count = r.read_u8()?;
        let salt = r.read_array()?;
        let iv = r.read_array()?;
        let check = if flags & crypt_flags::PSW_CHECK != 0 {
            Some(PasswordCheck::read(r)?)
        } else {
            None
        };
        Ok(Self {
            flags,
            lg2_count,
            salt,
            iv,
            check,
        })
    }
}

/// Kind of filesystem redirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectKind {
    /// Unix symbolic link.
    UnixSymlink,
    /// Windows symbolic link.
    WindowsSymlink,
    /// Windows junction.
    Junction,
    /// Hard link to an earlier entry.
    HardLink,
    /// Copy of an earlier entry.
    FileCopy,
    /// Unknown redirection type.
    Other(u64),
}

impl RedirectKind {
    fn from_raw(raw: u64) -> Self {
        match raw {
            1 => RedirectKind::UnixSymlink,
            2 => RedirectKind::WindowsSymlink,
            3 => RedirectKind::Junction,
            4 => RedirectKind::HardLink,
            5 => RedirectKind::FileCopy,
            other => RedirectKind::Other(other),
        }
    }

    /// Numeric type as stored in the archive.
    pub fn code(&self) -> u64 {
        match self {
            RedirectKind::UnixSymlink => 1,
            RedirectKind::WindowsSymlink => 2,
            RedirectKind::Junction => 3,
            RedirectKind::HardLink => 4,
            RedirectKind::FileCopy => 5,
            RedirectKind::Other(v) => *v,
        }
    }

    /// Redirect is created as a symbolic link.
    pub fn is_symlink(&self) -> bool {
        matches!(
            self,
            RedirectKind::UnixSymlink | RedirectKind::WindowsSymlink | RedirectKind::Junction
        )
    }
}

/// Redirection record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Redirection type.
    pub kind: RedirectKind,
    /// Target is a directory.
    pub target_is_dir: bool,
    /// Link target.
    pub target: String,
}

/// Timestamps from the header and the time extra record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileTimes {
    /// Modification time.
    pub modified: Option<Timestamp>,
    /// Creation time.
    pub created: Option<Timestamp>,
    /// Last access time.
    pub accessed: Option<Timestamp>,
}

/// Unix owner record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnixOwner {
    /// User name.
    pub user: Option<String>,
    /// Group name.
    pub group: Option<String>,
    /// Numeric user id.
    pub uid: Option<u64>,
    /// Numeric group id.
    pub gid: Option<u64>,
}

/// A decoded file or service header.
#[derive(Debug, Clone, Default)]
pub struct FileHeader {
    /// Common block fields.
    pub block: BlockHeader,
    /// File flags, see [`file_flags`].
    pub file_flags: u64,
    /// Unpacked size, `None` when the archiver did not know it.
    pub unpacked_size: Option<u64>,
    /// Host-specific attributes.
    pub attributes: u64,
    /// CRC-32 of the unpacked data (or of this part's packed data).
    pub data_crc: Option<u32>,
    /// Compression parameters.
    pub compression: CompressionInfo,
    /// Host operating system.
    pub host_os: HostOs,
    /// Entry name with `/` separators.
    pub name: String,
    /// Encryption parameters.
    pub encryption: Option<FileEncryption>,
    /// BLAKE2sp digest from the hash record.
    pub blake2: Option<[u8; BLAKE2SP_SIZE]>,
    /// Timestamps.
    pub times: FileTimes,
    /// File version number.
    pub version: Option<u64>,
    /// Redirection record.
    pub redirect: Option<Redirect>,
    /// Unix owner record.
    pub owner: Option<UnixOwner>,
    /// Service data record.
    pub service_data: Option<Vec<u8>>,
}

impl FileHeader {
    /// Decodes a file or service block.
    pub fn decode(block: &Block) -> Result<Self> {
        let kind = block.header.block_type;
        if kind != block_type::FILE && kind != block_type::SERVICE {
            return Err(Error::corrupt(
                block.header.offset,
                format!("block type {} is not a file header", kind),
            ));
        }

        let mut r = block.fields();
        let file_flags = r.read_vint()?;
        let unpacked_size = r.read_vint()?;
        let attributes = r.read_vint()?;
        let unix_mtime = if file_flags & file_flags::UNIX_MTIME != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        let data_crc = if file_flags & file_flags::CRC32 != 0 {
            Some(r.read_u32()?)
        } else {
            None
        };
        let compression = CompressionInfo::new(r.read_vint()?);
        let host_os = HostOs::from_raw(r.read_vint()?);
        let name_len = r.read_length("name")?;
        let name = String::from_utf8_lossy(r.read_bytes(name_len)?).into_owned();

        let mut header = Self {
            block: block.header.clone(),
            file_flags,
            unpacked_size: if file_flags & file_flags::UNKNOWN_SIZE != 0 {
                None
            } else {
                Some(unpacked_size)
            },
            attributes,
            data_crc,
            compression,
            host_os,
            name,
            encryption: None,
            blake2: None,
            times: FileTimes {
                modified: unix_mtime.map(|t| Timestamp::from_unix_secs(i64::from(t))),
                ..FileTimes::default()
            },
            version: None,
            redirect: None,
            owner: None,
            service_data: None,
        };

        for record in block.extra_records() {
            let (record_type, mut body) = record?;
            header.apply_extra(record_type, &mut body)?;
        }
        log::trace!(
            "decoded {} header {:?} at {}",
            if kind == block_type::FILE { "file" } else { "service" },
            header.name,
            header.block.offset
        );
        Ok(header)
    }

    fn apply_extra(&mut self, record_type: u64, r: &mut ByteReader<'_>) -> Result<()> {
        match record_type {
            file_extra::ENCRYPTION => self.encryption = Some(FileEncryption::read(r)?),
            file_extra::HASH => {
                // Only BLAKE2sp is defined; other hash types are ignored.
                if r.read_vint()? == 0 {
                    self.blake2 = Some(r.read_array()?);
                }
            }
            file_extra::TIME => self.read_times(r)?,
            file_extra::VERSION => {
                let _flags = r.read_vint()?;
                self.version = Some(r.read_vint()?);
            }
            file_extra::REDIRECTION => {
                let kind = RedirectKind::from_raw(r.read_vint()?);
                let flags = r.read_vint()?;
                let len = r.read_length("link target")?;
                let target = String::from_utf8_lossy(r.read_bytes(len)?).into_owned();
                self.redirect = Some(Redirect {
                    kind,
                    target_is_dir: flags & 0x01 != 0,
                    target,
                });
            }
            file_extra::UNIX_OWNER => {
                let flags = r.read_vint()?;
                let mut owner = UnixOwner::default();
                if flags & 0x01 != 0 {
                    let len = r.read_length("user name")?;
                    owner.user = Some(String::from_utf8_lossy(r.read_bytes(len)?).into_owned());
                }
                if flags & 0x02 != 0 {
                    let len = r.read_length("group name")?;
                    owner.group = Some(String::from_utf8_lossy(r.read_bytes(len)?).into_owned());
                }
                if flags & 0x04 != 0 {
                    owner.uid = Some(r.read_vint()?);
                }
                if flags & 0x08 != 0 {
                    owner.gid = Some(r.read_vint()?);
                }
                self.owner = Some(owner);
            }
            file_extra::SERVICE_DATA => {
                self.service_data = Some(r.read_bytes(r.remaining())?.to_vec());
            }
            other => log::trace!("ignoring extra record type {}", other),
        }
        Ok(())
    }

    fn read_times(&mut self, r: &mut ByteReader<'_>) -> Result<()> {
        const UNIX: u64 = 0x01;
        const MTIME: u64 = 0x02;
        const CTIME: u64 = 0x04;
        const ATIME: u64 = 0x08;
        const NANOS: u64 = 0x10;

        let flags = r.read_vint()?;
        let unix = flags & UNIX != 0;
        let mut read_one = |present: bool| -> Result<Option<(u64, bool)>> {
            if !present {
                return Ok(None);
            }
            let value = if unix {
                u64::from(r.read_u32()?)
            } else {
                r.read_u64()?
            };
            Ok(Some((value, unix)))
        };
        let mtime = read_one(flags & MTIME != 0)?;
        let ctime = read_one(flags & CTIME != 0)?;
        let atime = read_one(flags & ATIME != 0)?;

        let mut nanos = [0u32; 3];
        if unix && flags & NANOS != 0 {
            for (slot, present) in nanos.iter_mut().zip([mtime, ctime, atime]) {
                if present.is_some() {
                    *slot = r.read_u32()? & 0x3FFF_FFFF;
                }
            }
        }

        let convert = |value: Option<(u64, bool)>, nanos: u32| {
            value.map(|(v, unix)| {
                if unix {
                    Timestamp::from_unix_nanos(v as i64, nanos)
                } else {
                    Timestamp::from_filetime(v)
                }
            })
        };
        if let Some(ts) = convert(mtime, nanos[0]) {
            self.times.modified = Some(ts);
        }
        self.times.created = convert(ctime, nanos[1]).or(self.times.created);
        self.times.accessed = convert(atime, nanos[2]).or(self.times.accessed);
        Ok(())
    }

    /// Block is a service header rather than an entry.
    pub fn is_service(&self) -> bool {
        self.block.block_type == block_type::SERVICE
    }

    /// Service header with the given name.
    pub fn is_service_named(&self, name: &str) -> bool {
        self.is_service() && self.name == name
    }

    /// Entry is a directory.
    pub fn is_directory(&self) -> bool {
        self.file_flags & file_flags::DIRECTORY != 0
    }

    /// Entry data is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Entry continues from the previous volume.
    pub fn split_before(&self) -> bool {
        self.block.split_before()
    }

    /// Entry continues in the next volume.
    pub fn split_after(&self) -> bool {
        self.block.split_after()
    }

    /// Size of the packed data in this volume.
    pub fn packed_size(&self) -> u64 {
        self.block.data_size
    }

    /// Declared checksum, preferring BLAKE2sp over CRC-32.
    pub fn expected_hash(&self) -> Option<HashValue> {
        self.blake2
            .map(HashValue::Blake2sp)
            .or(self.data_crc.map(HashValue::Crc32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::header::decode_block;
    use crate::format::vint::write_vint;

    fn vint(out: &mut Vec<u8>, v: u64) {
        write_vint(out, v).unwrap();
    }

    fn record(kind: u64, body: &[u8]) -> Vec<u8> {
        let mut inner = Vec::new();
        vint(&mut inner, kind);
        inner.extend_from_slice(body);
        let mut out = Vec::new();
        vint(&mut out, inner.len() as u64);
        out.extend_from_slice(&inner);
        out
    }

    fn file_block(file_flags: u64, name: &str, extra: &[u8], data_size: u64) -> Vec<u8> {
        let mut fields = Vec::new();
        vint(&mut fields, block_type::FILE);
        let mut flags = 0x02;
        if !extra.is_empty() {
            flags |= 0x01;
        }
        vint(&mut fields, flags);
        if !extra.is_empty() {
            vint(&mut fields, extra.len() as u64);
        }
        vint(&mut fields, data_size);
        vint(&mut fields, file_flags);
        vint(&mut fields, 11); // unpacked size
        vint(&mut fields, 0o100644); // attributes
        if file_flags & file_flags::UNIX_MTIME != 0 {
            fields.extend_from_slice(&1_609_677_296u32.to_le_bytes());
        }
        if file_flags & file_flags::CRC32 != 0 {
            fields.extend_from_slice(&0x0D4A_1185u32.to_le_bytes());
        }
        vint(&mut fields, 0x40 | (3 << 7) | (2 << 10));
        vint(&mut fields, 1);
        vint(&mut fields, name.len() as u64);
        fields.extend_from_slice(name.as_bytes());
        fields.extend_from_slice(extra);

        let mut body = Vec::new();
        vint(&mut body, fields.len() as u64);
        body.extend_from_slice(&fields);
        let mut raw = crc32fast::hash(&body).to_le_bytes().to_vec();
        raw.extend_from_slice(&body);
        raw
    }

    fn decode(raw: &[u8]) -> FileHeader {
        let block = decode_block(raw, 0, raw.len() as u64).unwrap();
        FileHeader::decode(&block).unwrap()
    }

    #[test]
    fn test_basic_fields() {
        let raw = file_block(
            file_flags::UNIX_MTIME | file_flags::CRC32,
            "dir/hello.txt",
            &[],
            11,
        );
        let h = decode(&raw);
        assert_eq!(h.name, "dir/hello.txt");
        assert_eq!(h.unpacked_size, Some(11));
        assert_eq!(h.packed_size(), 11);
        assert_eq!(h.data_crc, Some(0x0D4A_1185));
        assert_eq!(h.expected_hash(), Some(HashValue::Crc32(0x0D4A_1185)));
        assert_eq!(h.host_os, HostOs::Unix);
        assert_eq!(
            h.times.modified,
            Some(Timestamp::from_unix_secs(1_609_677_296))
        );
        assert!(h.compression.is_solid());
        assert_eq!(h.compression.method(), 3);
        assert_eq!(h.compression.dictionary_size(), 512 * 1024);
        assert_eq!(h.compression.unpack_version(), 50);
        assert!(!h.is_directory());
        assert!(!h.is_encrypted());
    }

    #[test]
    fn test_unknown_size() {
        let raw = file_block(file_flags::UNKNOWN_SIZE, "a", &[], 0);
        assert_eq!(decode(&raw).unpacked_size, None);
    }

    #[test]
    fn test_hash_record_preferred() {
        let mut body = vec![0x00];
        body.extend_from_slice(&[0x5A; 32]);
        let extra = record(file_extra::HASH, &body);
        let raw = file_block(file_flags::CRC32, "a", &extra, 0);
        let h = decode(&raw);
        assert_eq!(h.expected_hash(), Some(HashValue::Blake2sp([0x5A; 32])));
    }

    #[test]
    fn test_time_record_overrides_header_mtime() {
        let mut body = vec![0x01 | 0x02 | 0x08 | 0x10];
        body.extend_from_slice(&100u32.to_le_bytes());
        body.extend_from_slice(&200u32.to_le_bytes());
        body.extend_from_slice(&5_000u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        let extra = record(file_extra::TIME, &body);
        let raw = file_block(file_flags::UNIX_MTIME, "a", &extra, 0);
        let h = decode(&raw);
        assert_eq!(
            h.times.modified,
            Some(Timestamp::from_unix_nanos(100, 5_000))
        );
        assert_eq!(h.times.accessed, Some(Timestamp::from_unix_secs(200)));
        assert_eq!(h.times.created, None);
    }

    #[test]
    fn test_filetime_record() {
        let mut body = vec![0x04];
        body.extend_from_slice(&132_541_508_960_000_000u64.to_le_bytes());
        let extra = record(file_extra::TIME, &body);
        let h = decode(&file_block(0, "a", &extra, 0));
        assert_eq!(
            h.times.created,
            Some(Timestamp::from_filetime(132_541_508_960_000_000))
        );
        assert_eq!(h.times.modified, None);
    }

    #[test]
    fn test_redirect_and_owner() {
        let mut link = Vec::new();
        vint(&mut link, 1);
        vint(&mut link, 0);
        vint(&mut link, 9);
        link.extend_from_slice(b"../target");
        let mut owner = vec![0x01 | 0x08, 4];
        owner.extend_from_slice(b"root");
        owner.push(100);
        let mut extra = record(file_extra::REDIRECTION, &link);
        extra.extend(record(file_extra::UNIX_OWNER, &owner));

        let h = decode(&file_block(0, "link", &extra, 0));
        let redirect = h.redirect.unwrap();
        assert_eq!(redirect.kind, RedirectKind::UnixSymlink);
        assert!(redirect.kind.is_symlink());
        assert_eq!(redirect.target, "../target");
        let owner = h.owner.unwrap();
        assert_eq!(owner.user.as_deref(), Some("root"));
        assert_eq!(owner.gid, Some(100));
        assert_eq!(owner.uid, None);
    }

    #[test]
    fn test_encryption_record() {
        let mut body = vec![0x00, 0x02, 15];
        body.extend_from_slice(&[1; SALT_SIZE]);
        body.extend_from_slice(&[2; IV_SIZE]);
        let extra = record(file_extra::ENCRYPTION, &body);
        let h = decode(&file_block(0, "secret", &extra, 16));
        let enc = h.encryption.unwrap();
        assert!(enc.uses_hash_mac());
        assert_eq!(enc.lg2_count, 15);
        assert_eq!(enc.iv, [2; IV_SIZE]);
        assert!(enc.check.is_none());
        assert!(enc.usable_check().is_none());
    }

    #[test]
    fn test_truncated_name_is_corrupt() {
        let mut raw = file_block(0, "abc", &[], 0);
        // Shrink the declared header size so the name no longer fits.
        raw[4] -= 2;
        let block = decode_block(&raw, 0, raw.len() as u64).unwrap();
        assert!(matches!(
            FileHeader::decode(&block),
            Err(Error::CorruptHeader { .. })
        ));
    }

    #[test]
    fn test_rar7_dictionary_fraction() {
        let info = CompressionInfo::new(1 | (1 << 10) | (16 << 15));
        assert_eq!(info.unpack_version(), 70);
        assert_eq!(info.dictionary_size(), 0x4_0000 + 0x4_0000 / 2);
    }
}
