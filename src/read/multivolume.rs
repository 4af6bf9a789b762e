//! Reading across volume boundaries.
//!
//! [`VolumeCursor`] tracks the volume being read and the offset of the next
//! block header. [`PackedStream`] presents the packed data of one entry as a
//! single stream, moving to the next volume whenever a part ends with the
//! split-after flag set.

use std::io::{self, Read};
use std::path::Path;

use super::archive_open::{VolumeStart, read_volume_start};
use super::options::Limits;
use crate::callback::CallbackContext;
use crate::checksum::EntryHasher;
use crate::crypto::{CryptoGate, HeaderCipher, mac_hash};
use crate::format::block_type;
use crate::format::files::FileHeader;
use crate::format::header::{Block, EndHeader};
use crate::format::parser::read_block;
use crate::volume::{VolumeReader, VolumeResolver};
use crate::{Error, Result};

/// Position of a session inside a volume set.
pub(crate) struct VolumeCursor {
    pub(crate) reader: VolumeReader,
    resolver: VolumeResolver,
    number: u64,
    cipher: Option<HeaderCipher>,
    next_block: u64,
}

impl VolumeCursor {
    pub(crate) fn new(reader: VolumeReader, resolver: VolumeResolver, start: VolumeStart) -> Self {
        Self {
            reader,
            resolver,
            number: start.main.volume_index(),
            cipher: start.cipher,
            next_block: start.next_block,
        }
    }

    pub(crate) fn number(&self) -> u64 {
        self.number
    }

    pub(crate) fn path(&self) -> &Path {
        self.reader.path()
    }

    pub(crate) fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Reads the block at the current header offset and moves past it,
    /// data area included.
    pub(crate) fn next_block(&mut self, max_header_size: u64) -> Result<Option<Block>> {
        let offset = self.next_block;
        self.reader.seek_to(offset)?;
        let block = read_block(&mut self.reader, offset, self.cipher.as_ref(), max_header_size)?;
        if let Some(block) = &block {
            self.next_block = block.header.next_offset();
        }
        Ok(block)
    }

    /// Like [`next_block`](Self::next_block), but a header CRC mismatch or
    /// the end of the volume is an error.
    fn expect_block(&mut self, max_header_size: u64) -> Result<Block> {
        let offset = self.next_block;
        let block = self
            .next_block(max_header_size)?
            .ok_or_else(|| Error::corrupt(offset, "volume ends inside a split entry"))?;
        if !block.header.crc_ok {
            return Err(Error::corrupt(offset, "header CRC mismatch"));
        }
        Ok(block)
    }

    /// Opens the volume following the current one.
    pub(crate) fn advance(
        &mut self,
        gate: &mut CryptoGate,
        callbacks: &CallbackContext,
        limits: &Limits,
    ) -> Result<()> {
        let number = self.number + 1;
        let mut reader = self.resolver.open_next(self.reader.path(), number, callbacks)?;
        let start = read_volume_start(&mut reader, gate, callbacks, limits)?;
        if !start.main.is_volume() {
            return Err(Error::VolumeMismatch {
                path: reader.path().to_path_buf(),
                reason: "not part of a volume set".into(),
            });
        }
        if start.main.volume_index() != number {
            return Err(Error::VolumeMismatch {
                path: reader.path().to_path_buf(),
                reason: format!(
                    "volume number {} where {} was expected",
                    start.main.volume_index(),
                    number
                ),
            });
        }
        log::debug!("switched to volume {} at {:?}", number, reader.path());

        let previous = std::mem::replace(&mut self.reader, reader);
        previous.close()?;
        self.number = number;
        self.cipher = start.cipher;
        self.next_block = start.next_block;
        Ok(())
    }

    pub(crate) fn close(self) -> Result<()> {
        self.reader.close()
    }
}

/// Packed data of one entry, spanning as many volumes as needed.
///
/// Non-final parts are checked against their own header checksum when the
/// stream moves past them.
pub(crate) struct PackedStream<'a> {
    cursor: &'a mut VolumeCursor,
    gate: &'a mut CryptoGate,
    callbacks: &'a CallbackContext,
    limits: &'a Limits,
    part: FileHeader,
    remaining: u64,
    part_hasher: Option<EntryHasher>,
    hash_key: Option<[u8; 32]>,
    ignore_checksums: bool,
}

impl<'a> PackedStream<'a> {
    pub(crate) fn new(
        cursor: &'a mut VolumeCursor,
        gate: &'a mut CryptoGate,
        callbacks: &'a CallbackContext,
        limits: &'a Limits,
        part: FileHeader,
        hash_key: Option<[u8; 32]>,
        ignore_checksums: bool,
    ) -> Result<Self> {
        cursor.reader.seek_to(part.block.data_offset)?;
        let mut stream = Self {
            cursor,
            gate,
            callbacks,
            limits,
            remaining: 0,
            part_hasher: None,
            part: FileHeader::default(),
            hash_key,
            ignore_checksums,
        };
        stream.begin_part(part);
        Ok(stream)
    }

    /// Header of the part being read; after the last byte, the final part.
    pub(crate) fn part(&self) -> &FileHeader {
        &self.part
    }

    /// Reads and discards the rest of the entry, crossing volumes as needed.
    pub(crate) fn drain(&mut self) -> Result<u64> {
        io::copy(self, &mut io::sink()).map_err(Error::from_io)
    }

    fn begin_part(&mut self, part: FileHeader) {
        self.remaining = part.packed_size();
        self.part_hasher = part
            .split_after()
            .then(|| part.expected_hash())
            .flatten()
            .map(|h| EntryHasher::new(h.kind()));
        self.part = part;
    }

    fn finish_part(&mut self) -> Result<()> {
        let Some(hasher) = self.part_hasher.take() else {
            return Ok(());
        };
        let (Some(expected), Some(mut actual)) = (self.part.expected_hash(), hasher.finalize())
        else {
            return Ok(());
        };
        let keyed = self
            .part
            .encryption
            .as_ref()
            .is_some_and(|e| e.uses_hash_mac());
        if let (true, Some(key)) = (keyed, self.hash_key.as_ref()) {
            actual = mac_hash(key, actual)?;
        }
        if actual == expected {
            return Ok(());
        }
        if self.ignore_checksums {
            log::warn!(
                "checksum mismatch in volume {} part of '{}' ignored",
                self.cursor.number(),
                self.part.name
            );
            return Ok(());
        }
        Err(Error::ChecksumMismatch {
            entry: self.part.name.clone(),
            expected,
            actual,
        })
    }

    /// Moves from the end of a split-after part to its continuation.
    fn cross(&mut self) -> Result<()> {
        self.finish_part()?;
        let max = self.limits.max_header_size;

        loop {
            let block = self.cursor.expect_block(max)?;
            match block.header.block_type {
                block_type::END => {
                    if !EndHeader::decode(&block)?.has_next_volume() {
                        return Err(Error::corrupt(
                            block.header.offset,
                            format!("archive ends inside '{}'", self.part.name),
                        ));
                    }
                    break;
                }
                block_type::FILE => {
                    return Err(Error::corrupt(
                        block.header.offset,
                        format!("'{}' is not continued in the next volume", self.part.name),
                    ));
                }
                other => log::trace!("skipping block type {} before volume end", other),
            }
        }

        self.cursor.advance(&mut *self.gate, self.callbacks, self.limits)?;

        loop {
            let block = self.cursor.expect_block(max)?;
            match block.header.block_type {
                block_type::FILE => {
                    let header = FileHeader::decode(&block)?;
                    if !header.split_before() || header.name != self.part.name {
                        return Err(Error::corrupt(
                            block.header.offset,
                            format!(
                                "volume {} does not continue '{}'",
                                self.cursor.number(),
                                self.part.name
                            ),
                        ));
                    }
                    self.cursor.reader.seek_to(header.block.data_offset)?;
                    self.begin_part(header);
                    return Ok(());
                }
                block_type::END => {
                    return Err(Error::corrupt(
                        block.header.offset,
                        format!("volume {} has no continuation", self.cursor.number()),
                    ));
                }
                other => log::trace!("skipping block type {} before continuation", other),
            }
        }
    }
}

impl Read for PackedStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.remaining == 0 {
            if !self.part.split_after() {
                return Ok(0);
            }
            self.cross().map_err(Error::into_io)?;
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.cursor.reader.read(&mut buf[..want])?;
        if n == 0 {
            return Err(Error::Truncated {
                offset: self.cursor.position(),
                needed: self.remaining,
            }
            .into_io());
        }
        if let Some(hasher) = self.part_hasher.as_mut() {
            hasher.update(&buf[..n]);
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}
