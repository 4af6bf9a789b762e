//! Header enumeration.
//!
//! Blocks are walked in archive order. Service blocks and unknown block
//! types are stepped over, end headers of non-final volumes pull in the
//! next volume, and continuation headers of split entries are hidden unless
//! the session was opened in [`OpenMode::ListIncSplit`].

use super::entry::{BasicHeader, EntryHeader};
use super::options::OpenMode;
use super::{Archive, Pending};
use crate::format::block_type;
use crate::format::files::FileHeader;
use crate::format::header::EndHeader;
use crate::{Error, Result};

impl Archive {
    /// Reads the next entry header.
    ///
    /// Returns `Ok(None)` once the last volume's end header is reached. Each
    /// returned header must be consumed by
    /// [`process_file`](Archive::process_file) before the next call.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] while the previous header is unprocessed,
    /// - [`Error::CorruptHeader`] for a damaged header (unless the session
    ///   keeps broken data, which ends enumeration instead),
    /// - volume errors when the next volume cannot be opened.
    pub fn read_header(&mut self) -> Result<Option<EntryHeader>> {
        if self.current.is_some() {
            return Err(Error::InvalidState(
                "the previous header has not been processed",
            ));
        }
        if self.finished {
            return Ok(None);
        }

        match self.next_entry() {
            Ok(Some(pending)) => {
                let entry = pending.entry.clone();
                self.current = Some(pending);
                Ok(Some(entry))
            }
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) if self.keep_broken && e.is_corruption() => {
                log::warn!("stopping at damaged header in {:?}: {}", self.path, e);
                self.finished = true;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Reads the next entry as a [`BasicHeader`].
    ///
    /// # Errors
    ///
    /// As [`read_header`](Archive::read_header), plus [`Error::SmallBuffer`]
    /// when the name does not fit the basic record. The entry then stays
    /// current, so it can still be skipped with `process_file`.
    pub fn read_header_basic(&mut self) -> Result<Option<BasicHeader>> {
        match self.read_header()? {
            Some(entry) => BasicHeader::from_entry(&entry).map(Some),
            None => Ok(None),
        }
    }

    /// Header returned by the last `read_header`, while it awaits processing.
    pub fn current_header(&self) -> Option<&EntryHeader> {
        self.current.as_ref().map(|p| &p.entry)
    }

    fn next_entry(&mut self) -> Result<Option<Pending>> {
        let max = self.limits.max_header_size;
        loop {
            let Some(block) = self.cursor.next_block(max)? else {
                log::debug!(
                    "volume {} ends without an end header",
                    self.cursor.number()
                );
                return Ok(None);
            };
            let offset = block.header.offset;
            if !block.header.crc_ok {
                if !self.keep_broken {
                    return Err(Error::corrupt(offset, "header CRC mismatch"));
                }
                log::warn!("header at {:#x} fails its CRC check, reading it anyway", offset);
            }

            match block.header.block_type {
                block_type::FILE => {
                    let header = FileHeader::decode(&block)?;
                    if header.split_before() && self.mode != OpenMode::ListIncSplit {
                        log::trace!("skipping continuation header of '{}'", header.name);
                        continue;
                    }
                    let entry = EntryHeader::from_file(&header, self.cursor.number());
                    return Ok(Some(Pending { header, entry }));
                }
                block_type::END => {
                    if !EndHeader::decode(&block)?.has_next_volume() {
                        return Ok(None);
                    }
                    self.cursor
                        .advance(&mut self.gate, &self.callbacks, &self.limits)?;
                }
                block_type::SERVICE => {
                    log::debug!("skipping service block at {:#x}", offset);
                }
                other => {
                    log::debug!("skipping unknown block type {} at {:#x}", other, offset);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SIGNATURE_V5;
    use crate::format::vint::write_vint;
    use crate::read::{BASIC_NAME_CAPACITY, OpenRequest, Operation, ProcessOutcome};

    fn block(fields: &[u8], data: &[u8]) -> Vec<u8> {
        let mut size = Vec::new();
        write_vint(&mut size, fields.len() as u64).unwrap();
        let mut hashed = size;
        hashed.extend_from_slice(fields);
        let mut out = crc32fast::hash(&hashed).to_le_bytes().to_vec();
        out.extend_from_slice(&hashed);
        out.extend_from_slice(data);
        out
    }

    fn stored_file(name: &str, data: &[u8]) -> Vec<u8> {
        let mut fields = Vec::new();
        for v in [block_type::FILE, 0x02, data.len() as u64, 0x04, data.len() as u64, 0x20] {
            write_vint(&mut fields, v).unwrap();
        }
        fields.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
        for v in [0, 0, name.len() as u64] {
            write_vint(&mut fields, v).unwrap();
        }
        fields.extend_from_slice(name.as_bytes());
        block(&fields, data)
    }

    fn archive_with(blocks: &[Vec<u8>]) -> tempfile::NamedTempFile {
        let mut data = SIGNATURE_V5.to_vec();
        data.extend(block(&[1, 0, 0], &[]));
        for b in blocks {
            data.extend_from_slice(b);
        }
        data.extend(block(&[5, 0, 0], &[]));
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), &data).unwrap();
        file
    }

    #[test]
    fn test_unknown_and_service_blocks_are_skipped() {
        let unknown = block(&[9, 0x04], &[]);
        let file = archive_with(&[unknown, stored_file("a.txt", b"hello")]);
        let mut archive = Archive::open(file.path()).unwrap();

        let entry = archive.read_header().unwrap().unwrap();
        assert_eq!(entry.name, "a.txt");
        assert_eq!(entry.unpacked_size, 5);
        assert_eq!(archive.current_header().map(|e| e.name.as_str()), Some("a.txt"));

        let err = archive.read_header().unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        assert_eq!(
            archive.process_file(Operation::Skip, None).unwrap(),
            ProcessOutcome::Skipped
        );
        assert!(archive.current_header().is_none());
        assert!(archive.read_header().unwrap().is_none());
    }

    #[test]
    fn test_damaged_header() {
        let mut damaged = stored_file("b.txt", b"data");
        damaged[0] ^= 0xFF;
        let file = archive_with(&[stored_file("a.txt", b"x"), damaged]);

        let mut archive = Archive::open(file.path()).unwrap();
        assert!(archive.read_header().unwrap().is_some());
        assert_eq!(
            archive.process_file(Operation::Skip, None).unwrap(),
            ProcessOutcome::Skipped
        );
        let err = archive.read_header().unwrap_err();
        assert!(err.is_corruption());

        let mut archive = Archive::open(OpenRequest::new(file.path()).keep_broken(true)).unwrap();
        archive.read_header().unwrap();
        assert_eq!(
            archive.process_file(Operation::Skip, None).unwrap(),
            ProcessOutcome::Skipped
        );
        let entry = archive.read_header().unwrap().unwrap();
        assert_eq!(entry.name, "b.txt");
    }

    #[test]
    fn test_basic_header_name_limit() {
        let long = "n".repeat(BASIC_NAME_CAPACITY);
        let file = archive_with(&[stored_file(&long, b"x"), stored_file("short", b"y")]);
        let mut archive = Archive::open(file.path()).unwrap();

        let err = archive.read_header_basic().unwrap_err();
        assert!(matches!(err, Error::SmallBuffer { needed, .. } if needed == BASIC_NAME_CAPACITY + 1));
        assert_eq!(
            archive.process_file(Operation::Skip, None).unwrap(),
            ProcessOutcome::Skipped
        );

        let basic = archive.read_header_basic().unwrap().unwrap();
        assert_eq!(basic.name, "short");
        assert_eq!(basic.unpacked_size, 1);
        assert_eq!(basic.method, 0x30);
    }
}
