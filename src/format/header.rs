//! Block framing and archive-level headers.
//!
//! [`decode_block`] turns the raw bytes of one block header into a [`Block`]
//! without touching any stream; it is a pure function of its input. Typed
//! views ([`MainHeader`], [`EndHeader`], [`EncryptionHeader`]) decode the
//! type-specific fields of a block.

use sha2::{Digest, Sha256};

use super::vint::ByteReader;
use super::{
    PSW_CHECK_SIZE, PSW_CHECK_SUM_SIZE, SALT_SIZE, archive_extra, archive_flags, block_flags,
    block_type, crypt_flags, end_flags,
};
use crate::{Error, Result};

/// Common fields of a block header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockHeader {
    /// Absolute offset of the block within its volume.
    pub offset: u64,
    /// Stored header CRC-32.
    pub header_crc: u32,
    /// Whether the stored CRC matches the header bytes.
    pub crc_ok: bool,
    /// Size of the header from the type field to the end of the extra area.
    pub header_size: u64,
    /// Block type, see [`block_type`].
    pub block_type: u64,
    /// Common flags, see [`block_flags`].
    pub flags: u64,
    /// Size of the extra area.
    pub extra_size: u64,
    /// Size of the data area.
    pub data_size: u64,
    /// Absolute offset of the data area.
    pub data_offset: u64,
}

impl BlockHeader {
    /// Returns `true` if the block has a data area.
    pub fn has_data(&self) -> bool {
        self.flags & block_flags::DATA != 0
    }

    /// Returns `true` if the data continues from the previous volume.
    pub fn split_before(&self) -> bool {
        self.flags & block_flags::SPLIT_BEFORE != 0
    }

    /// Returns `true` if the data continues in the next volume.
    pub fn split_after(&self) -> bool {
        self.flags & block_flags::SPLIT_AFTER != 0
    }

    /// Absolute offset of the block that follows this one.
    pub fn next_offset(&self) -> u64 {
        self.data_offset.saturating_add(self.data_size)
    }
}

/// One decoded block header.
#[derive(Debug, Clone)]
pub struct Block {
    /// Common fields.
    pub header: BlockHeader,
    body: Vec<u8>,
    body_offset: u64,
}

impl Block {
    /// Reader over the type-specific fields (excluding the extra area).
    pub fn fields(&self) -> ByteReader<'_> {
        let end = self.body.len() - self.header.extra_size as usize;
        ByteReader::new(&self.body[..end], self.body_offset)
    }

    /// Reader over the extra area.
    pub fn extra(&self) -> ByteReader<'_> {
        let start = self.body.len() - self.header.extra_size as usize;
        ByteReader::new(&self.body[start..], self.body_offset + start as u64)
    }

    /// Iterates over the records of the extra area.
    pub fn extra_records(&self) -> ExtraRecords<'_> {
        ExtraRecords {
            reader: self.extra(),
        }
    }
}

/// Iterator over `(type, record body)` pairs of an extra area.
#[derive(Debug)]
pub struct ExtraRecords<'a> {
    reader: ByteReader<'a>,
}

impl<'a> Iterator for ExtraRecords<'a> {
    type Item = Result<(u64, ByteReader<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.is_empty() {
            return None;
        }
        let record = (|| -> Result<(u64, ByteReader<'a>)> {
            let size = self.reader.read_length("extra record")?;
            let mut body = self.reader.sub_reader(size)?;
            let record_type = body.read_vint()?;
            Ok((record_type, body))
        })();
        if record.is_err() {
            // Stop after the first malformed record.
            self.reader = ByteReader::new(&[], self.reader.offset());
        }
        Some(record)
    }
}

/// Decodes one block header.
///
/// `raw` starts at the header CRC and must contain at least the whole
/// header; trailing bytes (cipher padding) are ignored. `stored_len` is the
/// number of bytes the header occupies in the volume, which differs from
/// the plain header length when headers are encrypted.
pub fn decode_block(raw: &[u8], offset: u64, stored_len: u64) -> Result<Block> {
    let mut r = ByteReader::new(raw, offset);
    let header_crc = r.read_u32()?;
    let size_start = r.position();
    let header_size = r.read_vint()?;
    if header_size == 0 || header_size > r.remaining() as u64 {
        return Err(Error::corrupt(
            offset,
            format!("invalid header size {}", header_size),
        ));
    }
    let header_end = r.position() + header_size as usize;
    let crc_ok = crc32fast::hash(&raw[size_start..header_end]) == header_crc;

    let mut fields = r.sub_reader(header_size as usize)?;
    let block_type = fields.read_vint()?;
    let flags = fields.read_vint()?;
    let extra_size = if flags & block_flags::EXTRA != 0 {
        fields.read_vint()?
    } else {
        0
    };
    let data_size = if flags & block_flags::DATA != 0 {
        fields.read_vint()?
    } else {
        0
    };
    if extra_size > fields.remaining() as u64 {
        return Err(Error::corrupt(
            fields.offset(),
            format!("extra area size {} exceeds header", extra_size),
        ));
    }

    let body_offset = fields.offset();
    let body = fields.read_bytes(fields.remaining())?.to_vec();
    Ok(Block {
        header: BlockHeader {
            offset,
            header_crc,
            crc_ok,
            header_size,
            block_type,
            flags,
            extra_size,
            data_size,
            data_offset: offset + stored_len,
        },
        body,
        body_offset,
    })
}

/// Offsets from the locator extra record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Locator {
    /// Offset of the quick open service block, relative to the volume start.
    pub quick_open_offset: Option<u64>,
    /// Offset of the recovery record, relative to the volume start.
    pub recovery_offset: Option<u64>,
}

/// Main archive header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MainHeader {
    /// Archive flags, see [`archive_flags`].
    pub flags: u64,
    /// Volume number; absent on the first volume.
    pub volume_number: Option<u64>,
    /// Locator record, if present.
    pub locator: Option<Locator>,
}

impl MainHeader {
    /// Decodes the main header from a block.
    pub fn decode(block: &Block) -> Result<Self> {
        expect_type(block, block_type::MAIN)?;
        let mut r = block.fields();
        let flags = r.read_vint()?;
        let volume_number = if flags & archive_flags::VOLUME_NUMBER != 0 {
            Some(r.read_vint()?)
        } else {
            None
        };

        let mut locator = None;
        for record in block.extra_records() {
            let (kind, mut body) = record?;
            if kind == archive_extra::LOCATOR {
                let loc_flags = body.read_vint()?;
                let mut loc = Locator::default();
                if loc_flags & 0x01 != 0 {
                    loc.quick_open_offset = Some(body.read_vint()?).filter(|&o| o != 0);
                }
                if loc_flags & 0x02 != 0 {
                    loc.recovery_offset = Some(body.read_vint()?).filter(|&o| o != 0);
                }
                locator = Some(loc);
            }
        }

        Ok(Self {
            flags,
            volume_number,
            locator,
        })
    }

    /// Archive is part of a multi-volume set.
    pub fn is_volume(&self) -> bool {
        self.flags & archive_flags::VOLUME != 0
    }

    /// Archive is the first volume (or not a volume at all).
    pub fn is_first_volume(&self) -> bool {
        self.volume_number.is_none()
    }

    /// Archive is solid.
    pub fn is_solid(&self) -> bool {
        self.flags & archive_flags::SOLID != 0
    }

    /// Archive carries a recovery record.
    pub fn has_recovery(&self) -> bool {
        self.flags & archive_flags::RECOVERY != 0
    }

    /// Archive is locked against modification.
    pub fn is_locked(&self) -> bool {
        self.flags & archive_flags::LOCKED != 0
    }

    /// Zero-based volume index.
    pub fn volume_index(&self) -> u64 {
        self.volume_number.unwrap_or(0)
    }
}

/// End of archive header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndHeader {
    /// End flags, see [`end_flags`].
    pub flags: u64,
}

impl EndHeader {
    /// Decodes the end header from a block.
    pub fn decode(block: &Block) -> Result<Self> {
        expect_type(block, block_type::END)?;
        let flags = block.fields().read_vint()?;
        Ok(Self { flags })
    }

    /// The archive continues in another volume.
    pub fn has_next_volume(&self) -> bool {
        self.flags & end_flags::NEXT_VOLUME != 0
    }
}

/// Password verification data stored with encryption parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordCheck {
    /// XOR-folded check value derived from the password.
    pub value: [u8; PSW_CHECK_SIZE],
    /// First bytes of SHA-256 over `value`.
    pub sum: [u8; PSW_CHECK_SUM_SIZE],
}

impl PasswordCheck {
    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            value: r.read_array()?,
            sum: r.read_array()?,
        })
    }

    /// Returns `true` if `sum` matches `value`.
    ///
    /// An inconsistent check is damaged and must not be used to reject a
    /// password.
    pub fn is_consistent(&self) -> bool {
        let digest = Sha256::digest(self.value);
        digest[..PSW_CHECK_SUM_SIZE] == self.sum
    }
}

/// Archive encryption header: every following header is encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionHeader {
    /// Encryption flags, see [`crypt_flags`].
    pub flags: u64,
    /// Binary logarithm of the PBKDF2 iteration count.
    pub lg2_count: u8,
    /// Key derivation salt.
    pub salt: [u8; SALT_SIZE],
    /// Password check, if present.
    pub check: Option<PasswordCheck>,
}

impl EncryptionHeader {
    /// Decodes the archive encryption header from a block.
    pub fn decode(block: &Block) -> Result<Self> {
        expect_type(block, block_type::ENCRYPTION)?;
        let mut r = block.fields();
        let version = r.read_vint()?;
        if version != 0 {
            return Err(Error::UnsupportedEncryption { version });
        }
        let flags = r.read_vint()?;
        let lg2_count = r.read_u8()?;
        let salt = r.read_array()?;
        let check = if flags & crypt_flags::PSW_CHECK != 0 {
            Some(PasswordCheck::read(&mut r)?)
        } else {
            None
        };
        Ok(Self {
            flags,
            lg2_count,
            salt,
            check,
        })
    }
}

fn expect_type(block: &Block, expected: u64) -> Result<()> {
    if block.header.block_type != expected {
        return Err(Error::corrupt(
            block.header.offset,
            format!(
                "expected block type {}, found {}",
                expected, block.header.block_type
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Main header that follows the signature in a real single-volume archive.
    const REAL_MAIN_HEADER: [u8; 15] = [
        0x33, 0x92, 0xb5, 0xe5, 0x0a, 0x01, 0x05, 0x06, 0x00, 0x05, 0x01, 0x01, 0x80, 0x80, 0x00,
    ];

    fn frame(fields: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        crate::format::vint::write_vint(&mut body, fields.len() as u64).unwrap();
        body.extend_from_slice(fields);
        let mut out = crc32fast::hash(&body).to_le_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_decode_real_main_header() {
        let block = decode_block(&REAL_MAIN_HEADER, 8, 15).unwrap();
        assert!(block.header.crc_ok);
        assert_eq!(block.header.header_crc, 0xe5b5_9233);
        assert_eq!(block.header.header_size, 10);
        assert_eq!(block.header.block_type, block_type::MAIN);
        assert_eq!(block.header.extra_size, 6);
        assert_eq!(block.header.data_offset, 23);

        let main = MainHeader::decode(&block).unwrap();
        assert!(!main.is_volume());
        assert!(main.is_first_volume());
        assert_eq!(
            main.locator,
            Some(Locator {
                quick_open_offset: None,
                recovery_offset: None
            })
        );
    }

    #[test]
    fn test_crc_mismatch_is_reported_not_fatal() {
        let mut raw = REAL_MAIN_HEADER;
        raw[0] ^= 0xFF;
        let block = decode_block(&raw, 8, 15).unwrap();
        assert!(!block.header.crc_ok);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let a = decode_block(&REAL_MAIN_HEADER, 8, 15).unwrap();
        let b = decode_block(&REAL_MAIN_HEADER, 8, 15).unwrap();
        assert_eq!(a.header, b.header);
        assert_eq!(MainHeader::decode(&a).unwrap(), MainHeader::decode(&b).unwrap());
    }

    #[test]
    fn test_volume_main_header() {
        // type=1, flags=0, archive flags = VOLUME | VOLUME_NUMBER, volume number 2
        let raw = frame(&[0x01, 0x00, 0x03, 0x02]);
        let block = decode_block(&raw, 0, raw.len() as u64).unwrap();
        let main = MainHeader::decode(&block).unwrap();
        assert!(main.is_volume());
        assert!(!main.is_first_volume());
        assert_eq!(main.volume_index(), 2);
    }

    #[test]
    fn test_end_header() {
        let raw = frame(&[0x05, 0x00, 0x01]);
        let block = decode_block(&raw, 0, raw.len() as u64).unwrap();
        assert!(EndHeader::decode(&block).unwrap().has_next_volume());
        assert!(MainHeader::decode(&block).is_err());
    }

    #[test]
    fn test_header_size_beyond_input() {
        let raw = [0, 0, 0, 0, 0x20, 0x01];
        assert!(matches!(
            decode_block(&raw, 0, 6),
            Err(Error::CorruptHeader { .. })
        ));
    }

    #[test]
    fn test_extra_size_beyond_header() {
        // flags = EXTRA, extra size 9 with only one byte left
        let raw = frame(&[0x01, 0x01, 0x09, 0x00]);
        assert!(decode_block(&raw, 0, raw.len() as u64).is_err());
    }

    #[test]
    fn test_encryption_header() {
        let mut fields = vec![0x04, 0x00, 0x00, 0x01, 15];
        fields.extend_from_slice(&[0xAA; SALT_SIZE]);
        let value = [1, 2, 3, 4, 5, 6, 7, 8];
        fields.extend_from_slice(&value);
        fields.extend_from_slice(&Sha256::digest(value)[..4]);
        let raw = frame(&fields);
        let block = decode_block(&raw, 0, raw.len() as u64).unwrap();
        let enc = EncryptionHeader::decode(&block).unwrap();
        assert_eq!(enc.lg2_count, 15);
        assert_eq!(enc.salt, [0xAA; SALT_SIZE]);
        let check = enc.check.unwrap();
        assert_eq!(check.value, value);
        assert!(check.is_consistent());
    }

    #[test]
    fn test_unknown_encryption_version() {
        let raw = frame(&[0x04, 0x00, 0x07]);
        let block = decode_block(&raw, 0, raw.len() as u64).unwrap();
        assert!(matches!(
            EncryptionHeader::decode(&block),
            Err(Error::UnsupportedEncryption { version: 7 })
        ));
    }
}
