//! Archive signature detection.
//!
//! Recognizes the RAR signatures at the start of a file and, for
//! self-extracting archives, behind an executable stub.

use std::io::{Read, Seek, SeekFrom};

use super::{SIGNATURE_PREFIX, SIGNATURE_V4, SIGNATURE_V5};
use crate::{Error, Result};

/// RAR format generation identified by a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    /// RAR 5.0.
    Rar5,
    /// RAR 1.5-4.x.
    Rar4,
    /// A newer format version, identified by the byte after the common prefix.
    Future(u8),
}

impl SignatureKind {
    /// Length of the signature in bytes.
    pub fn len(&self) -> usize {
        match self {
            SignatureKind::Rar5 => SIGNATURE_V5.len(),
            SignatureKind::Rar4 => SIGNATURE_V4.len(),
            SignatureKind::Future(_) => SIGNATURE_V5.len(),
        }
    }

    /// Always `false`; provided for API symmetry with [`SignatureKind::len`].
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Location of a signature in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedSignature {
    /// Format generation.
    pub kind: SignatureKind,
    /// Offset of the signature (non-zero for self-extracting archives).
    pub offset: u64,
}

impl DetectedSignature {
    /// Offset of the first block after the signature.
    pub fn blocks_offset(&self) -> u64 {
        self.offset + self.kind.len() as u64
    }
}

/// Classifies the signature at the start of `bytes`.
///
/// Returns `None` when `bytes` does not start with a RAR signature.
pub fn classify_signature(bytes: &[u8]) -> Option<SignatureKind> {
    let rest = bytes.strip_prefix(SIGNATURE_PREFIX.as_slice())?;
    match rest {
        [0x00, ..] => Some(SignatureKind::Rar4),
        [0x01, 0x00, ..] => Some(SignatureKind::Rar5),
        [0x01, ..] | [] => None,
        [version, ..] => Some(SignatureKind::Future(*version)),
    }
}

/// Searches the first `max_sfx` bytes of `reader` for a RAR signature.
///
/// The reader position is restored before returning.
pub fn find_signature<R: Read + Seek>(
    reader: &mut R,
    max_sfx: u64,
) -> Result<Option<DetectedSignature>> {
    let start = reader.stream_position()?;
    reader.seek(SeekFrom::Start(0))?;

    let window = max_sfx + SIGNATURE_V5.len() as u64;
    let mut buf = Vec::new();
    reader.by_ref().take(window).read_to_end(&mut buf)?;
    reader.seek(SeekFrom::Start(start))?;

    let mut from = 0;
    while let Some(pos) = find_prefix(&buf[from..]) {
        let at = from + pos;
        if let Some(kind) = classify_signature(&buf[at..]) {
            return Ok(Some(DetectedSignature {
                kind,
                offset: at as u64,
            }));
        }
        from = at + 1;
    }
    Ok(None)
}

/// Locates a RAR 5.0 signature, mapping other outcomes to errors.
///
/// Older and newer format generations are reported as
/// [`Error::UnsupportedFormat`]; files with no signature as
/// [`Error::InvalidFormat`].
pub fn require_rar5<R: Read + Seek>(reader: &mut R, max_sfx: u64) -> Result<DetectedSignature> {
    match find_signature(reader, max_sfx)? {
        Some(sig @ DetectedSignature {
            kind: SignatureKind::Rar5,
            ..
        }) => Ok(sig),
        Some(DetectedSignature {
            kind: SignatureKind::Rar4,
            ..
        }) => Err(Error::UnsupportedFormat(
            "RAR 1.5-4.x archives are not supported".into(),
        )),
        Some(DetectedSignature {
            kind: SignatureKind::Future(v),
            ..
        }) => Err(Error::UnsupportedFormat(format!(
            "unknown RAR format version {}",
            v
        ))),
        None => Err(Error::InvalidFormat("no RAR signature found".into())),
    }
}

fn find_prefix(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(SIGNATURE_PREFIX.len())
        .position(|w| w == SIGNATURE_PREFIX)
}
