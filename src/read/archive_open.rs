//! Archive opening.
//!
//! Every volume starts the same way: an optional self-extractor stub, the
//! signature, an optional archive encryption block and the main header.
//! [`read_volume_start`] handles that prefix for the first volume and for
//! each continuation volume.

use std::io::Read;

use super::extraction::verify_checksum;
use super::info::{ArchiveFlags, ArchiveOpenInfo, CommentState};
use super::multivolume::VolumeCursor;
use super::options::{Limits, OpenRequest};
use super::Archive;
use crate::callback::{CallbackContext, NoCallbacks};
use crate::checksum::EntryHasher;
use crate::codec::{CodecRegistry, UnpackParams};
use crate::crypto::{CbcReader, CryptoGate, HeaderCipher};
use crate::format::files::FileHeader;
use crate::format::header::{EncryptionHeader, MainHeader};
use crate::format::parser::read_block;
use crate::format::{MAX_SFX_SIZE, block_type, detect, service};
use crate::volume::{VolumeReader, VolumeResolver, is_new_numbering};
use crate::{Error, Result};

/// The decoded prefix of one volume.
pub(crate) struct VolumeStart {
    pub(crate) sfx_offset: u64,
    pub(crate) main: MainHeader,
    pub(crate) cipher: Option<HeaderCipher>,
    /// Offset of the first block after the main header.
    pub(crate) next_block: u64,
}

/// Reads signature, archive encryption block and main header.
pub(crate) fn read_volume_start(
    reader: &mut VolumeReader,
    gate: &mut CryptoGate,
    callbacks: &CallbackContext,
    limits: &Limits,
) -> Result<VolumeStart> {
    let signature = detect::require_rar5(reader, MAX_SFX_SIZE)?;
    if signature.offset > 0 {
        log::debug!("RAR 5.0 signature found at offset {}", signature.offset);
    }
    let offset = signature.blocks_offset();
    reader.seek_to(offset)?;
    let first = read_block(reader, offset, None, limits.max_header_size)?
        .ok_or_else(|| Error::InvalidFormat("archive ends after the signature".into()))?;
    if !first.header.crc_ok {
        return Err(Error::InvalidFormat(
            "first header fails its CRC check".into(),
        ));
    }

    let (main_block, cipher) = if first.header.block_type == block_type::ENCRYPTION {
        let encryption = EncryptionHeader::decode(&first)?;
        let keys = gate.unlock(
            callbacks,
            None,
            &encryption.salt,
            encryption.lg2_count,
            encryption.check.as_ref(),
        )?;
        let verified = encryption.check.is_some_and(|c| c.is_consistent());
        let cipher = HeaderCipher::new(keys);
        let offset = first.header.next_offset();
        reader.seek_to(offset)?;
        let block = match read_block(reader, offset, Some(&cipher), limits.max_header_size) {
            Ok(Some(block)) if block.header.crc_ok => block,
            // Without a check value a wrong key only shows up as garbage.
            Ok(_) | Err(_) if !verified => return Err(Error::WrongPassword { entry: None }),
            Ok(None) => return Err(Error::InvalidFormat("archive has no main header".into())),
            Ok(Some(_)) => return Err(Error::corrupt(offset, "main header CRC mismatch")),
            Err(e) => return Err(e),
        };
        (block, Some(cipher))
    } else {
        (first, None)
    };

    if main_block.header.block_type != block_type::MAIN {
        return Err(Error::InvalidFormat(format!(
            "expected main header, found block type {}",
            main_block.header.block_type
        )));
    }
    let main = MainHeader::decode(&main_block)?;
    log::trace!(
        "main header: flags {:#x}, volume {:?}",
        main.flags,
        main.volume_number
    );
    Ok(VolumeStart {
        sfx_offset: signature.offset,
        next_block: main_block.header.next_offset(),
        main,
        cipher,
    })
}

/// Comment text and how reading it went.
struct CommentRead {
    text: Option<String>,
    state: CommentState,
}

/// Looks for the `CMT` service block between the main header and the first
/// entry. Failures are reported in the state, never as an open error.
fn read_comment(
    reader: &mut VolumeReader,
    start: &VolumeStart,
    gate: &mut CryptoGate,
    callbacks: &CallbackContext,
    limits: &Limits,
    codecs: &CodecRegistry,
) -> CommentRead {
    let failed = |err: Error| {
        log::warn!("cannot read archive comment: {}", err);
        CommentRead {
            text: None,
            state: CommentState::Failed(err.code()),
        }
    };

    let mut offset = start.next_block;
    let header = loop {
        if let Err(e) = reader.seek_to(offset) {
            return failed(e);
        }
        let block = match read_block(reader, offset, start.cipher.as_ref(), limits.max_header_size) {
            Ok(Some(block)) => block,
            Ok(None) => return absent(),
            Err(e) => return failed(e),
        };
        match block.header.block_type {
            block_type::SERVICE if block.header.crc_ok => match FileHeader::decode(&block) {
                Ok(header) if header.is_service_named(service::COMMENT) => break header,
                Ok(_) => offset = block.header.next_offset(),
                Err(e) => return failed(e),
            },
            block_type::SERVICE => offset = block.header.next_offset(),
            _ => return absent(),
        }
    };

    match load_comment(reader, &header, gate, callbacks, limits, codecs) {
        Ok(text) => CommentRead {
            text: Some(text),
            state: CommentState::Read,
        },
        Err(e) => failed(e),
    }
}

fn absent() -> CommentRead {
    CommentRead {
        text: None,
        state: CommentState::Absent,
    }
}

fn load_comment(
    reader: &mut VolumeReader,
    header: &FileHeader,
    gate: &mut CryptoGate,
    callbacks: &CallbackContext,
    limits: &Limits,
    codecs: &CodecRegistry,
) -> Result<String> {
    let size = header.unpacked_size.unwrap_or(header.packed_size());
    if size > limits.max_comment_size {
        return Err(Error::ResourceLimitExceeded(format!(
            "comment of {} bytes exceeds the {} byte limit",
            size, limits.max_comment_size
        )));
    }

    let keys = match &header.encryption {
        Some(enc) => Some(gate.unlock(
            callbacks,
            Some(service::COMMENT),
            &enc.salt,
            enc.lg2_count,
            enc.check.as_ref(),
        )?),
        None => None,
    };

    let params = UnpackParams {
        method: header.compression.method(),
        version: header.compression.version(),
        dictionary_size: header.compression.dictionary_size(),
        solid: false,
        unpacked_size: Some(size),
    };
    let mut unpacker = codecs.create(&params)?;

    reader.seek_to(header.block.data_offset)?;
    let mut packed = Read::by_ref(reader).take(header.packed_size());
    let mut out = Vec::new();
    out.try_reserve_exact(size as usize)
        .map_err(|_| Error::out_of_memory(size as usize))?;
    let unpacked = match (&keys, &header.encryption) {
        (Some(keys), Some(enc)) => {
            let mut input = CbcReader::new(&mut packed, keys.key, enc.iv);
            unpacker.unpack(&params, &mut input, &mut out)
        }
        _ => unpacker.unpack(&params, &mut packed, &mut out),
    }
    .map_err(Error::from_io)?;
    out.truncate(unpacked as usize);

    let mut hasher = EntryHasher::new(
        header
            .expected_hash()
            .map(|h| h.kind())
            .unwrap_or_default(),
    );
    hasher.update(&out);
    verify_checksum(header, hasher.finalize(), keys.as_ref(), false)?;

    let text = String::from_utf8_lossy(&out);
    Ok(text.trim_end_matches('\0').to_string())
}

/// Cuts `text` to fit `capacity` bytes including a terminator, on a
/// character boundary.
fn fit_comment(text: &str, capacity: usize) -> (String, CommentState) {
    let needed = text.len() + 1;
    if needed <= capacity {
        return (text.to_string(), CommentState::Read);
    }
    let mut end = capacity.saturating_sub(1);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (text[..end].to_string(), CommentState::Truncated { needed })
}

impl Archive {
    /// Opens an archive session.
    ///
    /// Accepts an [`OpenRequest`] or anything convertible into one, such as
    /// a path.
    ///
    /// # Errors
    ///
    /// - [`Error::Open`] (`EOpen`) if the file cannot be opened,
    /// - [`Error::InvalidFormat`] (`BadArchive`) without a RAR signature or
    ///   with a damaged main header,
    /// - [`Error::UnsupportedFormat`] (`UnknownFormat`) for RAR 1.5-4.x and
    ///   newer format generations,
    /// - [`Error::PasswordRequired`] / [`Error::WrongPassword`] for archives
    ///   with encrypted headers.
    pub fn open(request: impl Into<OpenRequest>) -> Result<Self> {
        let OpenRequest {
            path,
            mode,
            password,
            callbacks,
            keep_broken,
            ignore_checksums,
            volumes,
            comment_capacity,
            limits,
            codecs,
            extract,
        } = request.into();

        let callbacks = CallbackContext::new(callbacks.unwrap_or_else(|| Box::new(NoCallbacks)));
        let mut gate = CryptoGate::new(password, limits.max_kdf_lg2);
        let mut reader = VolumeReader::open(&path)?;
        let start = read_volume_start(&mut reader, &mut gate, &callbacks, &limits)?;

        let comment = read_comment(&mut reader, &start, &mut gate, &callbacks, &limits, &codecs);
        let (visible, comment_state) = match (&comment.text, comment_capacity) {
            (Some(text), Some(capacity)) => {
                let (cut, state) = fit_comment(text, capacity);
                (Some(cut), state)
            }
            (text, _) => (text.clone(), comment.state),
        };

        let main = &start.main;
        let mut flags = ArchiveFlags::default();
        flags.set(ArchiveFlags::VOLUME, main.is_volume());
        flags.set(ArchiveFlags::COMMENT, comment.text.is_some());
        flags.set(ArchiveFlags::LOCK, main.is_locked());
        flags.set(ArchiveFlags::SOLID, main.is_solid());
        flags.set(
            ArchiveFlags::NEW_NUMBERING,
            main.is_volume() && is_new_numbering(&path),
        );
        flags.set(ArchiveFlags::RECOVERY, main.has_recovery());
        flags.set(ArchiveFlags::ENC_HEADERS, start.cipher.is_some());
        flags.set(
            ArchiveFlags::FIRST_VOLUME,
            main.is_volume() && main.volume_index() == 0,
        );
        let info = ArchiveOpenInfo {
            flags,
            comment: visible,
            comment_state,
            volume_number: main.volume_index(),
            sfx_offset: start.sfx_offset,
        };
        log::debug!(
            "opened {:?} in {:?} mode: flags {:#x}, volume {}",
            path,
            mode,
            flags.bits(),
            info.volume_number
        );

        Ok(Self {
            path,
            mode,
            cursor: VolumeCursor::new(reader, VolumeResolver::new(volumes), start),
            gate,
            callbacks,
            info,
            comment: comment.text,
            keep_broken,
            ignore_checksums,
            limits,
            extract_options: extract,
            codecs,
            solid: None,
            current: None,
            finished: false,
        })
    }
}
