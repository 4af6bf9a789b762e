//! Reads block headers from a stream.
//!
//! [`read_block`] pulls exactly one header off a reader positioned at a
//! block boundary, decrypting it first when the archive encrypts headers.
//! The data area is left unread; callers skip or stream it using
//! [`BlockHeader::data_offset`](super::header::BlockHeader::data_offset)
//! and [`BlockHeader::data_size`](super::header::BlockHeader::data_size).

use std::io::{self, Read};

use super::header::{Block, decode_block};
use super::vint::{MAX_VINT_LEN, ByteReader};
use super::IV_SIZE;
use crate::crypto::{BLOCK_SIZE, HeaderCipher};
use crate::{Error, Result};

/// Fills `buf` as far as the reader allows, returning the number of bytes read.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_exact_at<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    let n = read_full(reader, buf)?;
    if n < buf.len() {
        return Err(Error::Truncated {
            offset: offset + n as u64,
            needed: (buf.len() - n) as u64,
        });
    }
    Ok(())
}

fn alloc_header(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::out_of_memory(len))?;
    buf.resize(len, 0);
    Ok(buf)
}

fn check_header_size(size: u64, offset: u64, max_header_size: u64) -> Result<()> {
    if size > max_header_size {
        return Err(Error::corrupt(
            offset,
            format!(
                "header size {} exceeds limit {}",
                size, max_header_size
            ),
        ));
    }
    Ok(())
}

/// Reads one block header starting at absolute `offset`.
///
/// Returns `Ok(None)` at a clean end of stream (no bytes before the next
/// header). With a `cipher`, the header is read as `IV || AES-CBC(header)`.
///
/// A header whose CRC does not match is still returned; check
/// [`BlockHeader::crc_ok`](super::header::BlockHeader::crc_ok).
pub fn read_block<R: Read + ?Sized>(
    reader: &mut R,
    offset: u64,
    cipher: Option<&HeaderCipher>,
    max_header_size: u64,
) -> Result<Option<Block>> {
    match cipher {
        None => read_plain(reader, offset, max_header_size),
        Some(cipher) => read_encrypted(reader, offset, cipher, max_header_size),
    }
}

fn read_plain<R: Read + ?Sized>(
    reader: &mut R,
    offset: u64,
    max_header_size: u64,
) -> Result<Option<Block>> {
    let mut crc = [0u8; 4];
    let n = read_full(reader, &mut crc)?;
    if n == 0 {
        return Ok(None);
    }
    if n < crc.len() {
        return Err(Error::Truncated {
            offset: offset + n as u64,
            needed: (crc.len() - n) as u64,
        });
    }

    let mut prefix = crc.to_vec();
    let mut header_size = 0u64;
    for i in 0..MAX_VINT_LEN {
        let mut byte = [0u8; 1];
        read_exact_at(reader, &mut byte, offset + prefix.len() as u64)?;
        prefix.push(byte[0]);
        header_size |= u64::from(byte[0] & 0x7F) << (7 * i);
        if byte[0] & 0x80 == 0 {
            break;
        }
        if i + 1 == MAX_VINT_LEN {
            return Err(Error::corrupt(offset + 4, "header size field too long"));
        }
    }
    check_header_size(header_size, offset, max_header_size)?;

    let total = prefix.len() + header_size as usize;
    let mut raw = alloc_header(total)?;
    raw[..prefix.len()].copy_from_slice(&prefix);
    read_exact_at(reader, &mut raw[prefix.len()..], offset + prefix.len() as u64)?;

    log::trace!("block at {} ({} header bytes)", offset, total);
    decode_block(&raw, offset, total as u64).map(Some)
}

fn read_encrypted<R: Read + ?Sized>(
    reader: &mut R,
    offset: u64,
    cipher: &HeaderCipher,
    max_header_size: u64,
) -> Result<Option<Block>> {
    let mut iv = [0u8; IV_SIZE];
    let n = read_full(reader, &mut iv)?;
    if n == 0 {
        return Ok(None);
    }
    if n < IV_SIZE {
        return Err(Error::Truncated {
            offset: offset + n as u64,
            needed: (IV_SIZE - n) as u64,
        });
    }

    let data_start = offset + IV_SIZE as u64;
    let mut first = [0u8; BLOCK_SIZE];
    read_exact_at(reader, &mut first, data_start)?;

    // The first block holds the CRC and the header size.
    let mut peek = first;
    cipher.decrypt(&iv, &mut peek)?;
    let mut r = ByteReader::new(&peek[4..], data_start + 4);
    let header_size = r.read_vint()?;
    check_header_size(header_size, offset, max_header_size)?;

    let plain_len = 4 + r.position() + header_size as usize;
    let padded = plain_len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    let mut raw = alloc_header(padded)?;
    raw[..BLOCK_SIZE].copy_from_slice(&first);
    read_exact_at(reader, &mut raw[BLOCK_SIZE..], data_start + BLOCK_SIZE as u64)?;
    cipher.decrypt(&iv, &mut raw)?;

    let stored_len = (IV_SIZE + padded) as u64;
    log::trace!("encrypted block at {} ({} stored bytes)", offset, stored_len);
    decode_block(&raw[..plain_len], offset, stored_len).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{DerivedKeys, Password, derive_keys};
    use crate::format::vint::write_vint;
    use crate::format::{MAX_HEADER_SIZE, block_type};
    use aes::Aes256;
    use cbc::cipher::{BlockEncryptMut, KeyIvInit};
    use std::io::Cursor;

    fn end_block() -> Vec<u8> {
        let fields = [block_type::END as u8, 0x00, 0x00];
        let mut body = Vec::new();
        write_vint(&mut body, fields.len() as u64).unwrap();
        body.extend_from_slice(&fields);
        let mut raw = crc32fast::hash(&body).to_le_bytes().to_vec();
        raw.extend_from_slice(&body);
        raw
    }

    fn keys() -> DerivedKeys {
        derive_keys(&Password::new("hdr"), &[3; 16], 2, 24).unwrap()
    }

    fn encrypt(key: &[u8; 32], iv: [u8; 16], plain: &[u8]) -> Vec<u8> {
        let mut buf = plain.to_vec();
        buf.resize(plain.len().div_ceil(16) * 16, 0);
        let len = buf.len();
        cbc::Encryptor::<Aes256>::new(key.into(), &iv.into())
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buf, len)
            .unwrap();
        let mut out = iv.to_vec();
        out.extend_from_slice(&buf);
        out
    }

    #[test]
    fn test_read_plain_sequence() {
        let one = end_block();
        let mut data = one.clone();
        data.extend_from_slice(&one);
        let mut cursor = Cursor::new(data);

        let first = read_block(&mut cursor, 0, None, MAX_HEADER_SIZE)
            .unwrap()
            .unwrap();
        assert!(first.header.crc_ok);
        assert_eq!(first.header.block_type, block_type::END);
        assert_eq!(first.header.next_offset(), one.len() as u64);

        let second = read_block(&mut cursor, first.header.next_offset(), None, MAX_HEADER_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(second.header.offset, one.len() as u64);
        assert!(
            read_block(&mut cursor, 0, None, MAX_HEADER_SIZE)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_truncated_header() {
        let block = end_block();
        let mut cursor = Cursor::new(block[..block.len() - 1].to_vec());
        match read_block(&mut cursor, 100, None, MAX_HEADER_SIZE) {
            Err(Error::Truncated { offset, needed }) => {
                assert_eq!(offset, 100 + block.len() as u64 - 1);
                assert_eq!(needed, 1);
            }
            other => panic!("unexpected {:?}", other.map(|b| b.map(|b| b.header))),
        }
        let mut cursor = Cursor::new(vec![1, 2]);
        assert!(matches!(
            read_block(&mut cursor, 0, None, MAX_HEADER_SIZE),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let mut data = vec![0, 0, 0, 0];
        write_vint(&mut data, 1 << 30).unwrap();
        let mut cursor = Cursor::new(data);
        assert!(matches!(
            read_block(&mut cursor, 0, None, MAX_HEADER_SIZE),
            Err(Error::CorruptHeader { .. })
        ));
    }

    #[test]
    fn test_read_encrypted() {
        let keys = keys();
        let plain = end_block();
        let mut data = encrypt(&keys.key, [9; 16], &plain);
        data.extend_from_slice(&encrypt(&keys.key, [8; 16], &plain));
        let cipher = HeaderCipher::new(keys);
        let mut cursor = Cursor::new(data);

        let block = read_block(&mut cursor, 8, Some(&cipher), MAX_HEADER_SIZE)
            .unwrap()
            .unwrap();
        assert!(block.header.crc_ok);
        assert_eq!(block.header.block_type, block_type::END);
        assert_eq!(block.header.next_offset(), 8 + 32);

        let again = read_block(&mut cursor, 40, Some(&cipher), MAX_HEADER_SIZE)
            .unwrap()
            .unwrap();
        assert!(again.header.crc_ok);
        assert!(
            read_block(&mut cursor, 72, Some(&cipher), MAX_HEADER_SIZE)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_wrong_header_key_fails_crc_or_parse() {
        let keys = keys();
        let data = encrypt(&keys.key, [9; 16], &end_block());
        let wrong = HeaderCipher::new(derive_keys(&Password::new("nope"), &[3; 16], 2, 24).unwrap());
        match read_block(&mut Cursor::new(data), 0, Some(&wrong), MAX_HEADER_SIZE) {
            Ok(Some(block)) => assert!(!block.header.crc_ok),
            Ok(None) => panic!("expected a block"),
            Err(e) => assert!(e.is_corruption()),
        }
    }
}
