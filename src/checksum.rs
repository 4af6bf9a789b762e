//! Checksum computation for RAR entries.
//!
//! RAR 5.0 stores either a CRC-32 (in the file header) or a BLAKE2sp digest
//! (in a hash extra record) for every file. [`EntryHasher`] computes
//! whichever one the header declares while data streams through the
//! extraction engine, and [`HashValue`] carries the result.
//!
//! # Example
//!
//! ```rust
//! use rarkit::checksum::{Checksum, Crc32};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), 0xEC4AC3D0);
//! ```

use std::fmt;

/// Size of a BLAKE2sp digest in bytes.
pub const BLAKE2SP_SIZE: usize = 32;

/// Common trait for checksum computation.
pub trait Checksum: Default + Clone {
    /// The output type of this checksum.
    type Output: Copy + Eq + fmt::Debug;

    /// Creates a new checksum calculator.
    fn new() -> Self;

    /// Updates the checksum with additional data.
    fn update(&mut self, data: &[u8]);

    /// Finishes the computation and returns the value.
    fn finalize(&self) -> Self::Output;

    /// Computes the checksum of a single slice in one call.
    fn compute(data: &[u8]) -> Self::Output {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finalize()
    }
}

/// CRC-32 (IEEE 802.3) calculator.
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .finish()
    }
}

impl Checksum for Crc32 {
    type Output = u32;

    fn new() -> Self {
        Self::default()
    }

    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

/// BLAKE2sp calculator, the 8-way parallel BLAKE2s used by RAR 5.0.
#[derive(Clone)]
pub struct Blake2sp {
    state: blake2s_simd::blake2sp::State,
}

impl Default for Blake2sp {
    fn default() -> Self {
        Self {
            state: blake2s_simd::blake2sp::State::new(),
        }
    }
}

impl fmt::Debug for Blake2sp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blake2sp").finish_non_exhaustive()
    }
}

impl Checksum for Blake2sp {
    type Output = [u8; BLAKE2SP_SIZE];

    fn new() -> Self {
        Self::default()
    }

    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn finalize(&self) -> [u8; BLAKE2SP_SIZE] {
        let hash = self.state.finalize();
        let mut out = [0u8; BLAKE2SP_SIZE];
        out.copy_from_slice(&hash.as_bytes()[..BLAKE2SP_SIZE]);
        out
    }
}

/// The kind of checksum an entry carries.
///
/// Discriminants follow the `RAR_HASH_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum HashKind {
    /// No checksum stored.
    #[default]
    None = 0,
    /// CRC-32.
    Crc32 = 1,
    /// BLAKE2sp, 32 bytes.
    Blake2sp = 2,
}

/// A stored or computed entry checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashValue {
    /// CRC-32 value.
    Crc32(u32),
    /// BLAKE2sp digest.
    Blake2sp([u8; BLAKE2SP_SIZE]),
}

impl HashValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> HashKind {
        match self {
            HashValue::Crc32(_) => HashKind::Crc32,
            HashValue::Blake2sp(_) => HashKind::Blake2sp,
        }
    }

    /// Returns the CRC-32, or `None` for a BLAKE2sp value.
    pub fn crc32(&self) -> Option<u32> {
        match self {
            HashValue::Crc32(crc) => Some(*crc),
            HashValue::Blake2sp(_) => None,
        }
    }

    /// Returns the BLAKE2sp digest, or `None` for a CRC-32 value.
    pub fn digest(&self) -> Option<&[u8; BLAKE2SP_SIZE]> {
        match self {
            HashValue::Crc32(_) => None,
            HashValue::Blake2sp(d) => Some(d),
        }
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashValue::Crc32(crc) => write!(f, "crc32:{:08x}", crc),
            HashValue::Blake2sp(digest) => {
                write!(f, "blake2sp:")?;
                for b in digest {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Running checksum of the kind an entry declares.
#[derive(Debug, Clone)]
pub enum EntryHasher {
    /// Nothing to compute.
    None,
    /// CRC-32 in progress.
    Crc32(Crc32),
    /// BLAKE2sp in progress.
    Blake2sp(Box<Blake2sp>),
}

impl EntryHasher {
    /// Creates a hasher for the given kind.
    pub fn new(kind: HashKind) -> Self {
        match kind {
            HashKind::None => EntryHasher::None,
            HashKind::Crc32 => EntryHasher::Crc32(Crc32::new()),
            HashKind::Blake2sp => EntryHasher::Blake2sp(Box::default()),
        }
    }

    /// Feeds data into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            EntryHasher::None => {}
            EntryHasher::Crc32(h) => h.update(data),
            EntryHasher::Blake2sp(h) => h.update(data),
        }
    }

    /// Returns the checksum of everything fed so far.
    pub fn finalize(&self) -> Option<HashValue> {
        match self {
            EntryHasher::None => None,
            EntryHasher::Crc32(h) => Some(HashValue::Crc32(h.finalize())),
            EntryHasher::Blake2sp(h) => Some(HashValue::Blake2sp(h.finalize())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
        assert_eq!(Crc32::compute(b""), 0);
    }

    #[test]
    fn test_blake2sp_incremental_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 + 3) as u8).collect();
        let one_shot = blake2s_simd::blake2sp::blake2sp(&data);

        let mut hasher = Blake2sp::new();
        for chunk in data.chunks(997) {
            hasher.update(chunk);
        }
        assert_eq!(&hasher.finalize()[..], one_shot.as_bytes());
    }

    #[test]
    fn test_blake2sp_differs_from_blake2s() {
        let sp = Blake2sp::compute(b"abc");
        let s = blake2s_simd::blake2s(b"abc");
        assert_ne!(&sp[..], s.as_bytes());
    }

    #[test]
    fn test_entry_hasher_kinds() {
        let mut none = EntryHasher::new(HashKind::None);
        none.update(b"data");
        assert_eq!(none.finalize(), None);

        let mut crc = EntryHasher::new(HashKind::Crc32);
        crc.update(b"Hello, ");
        crc.update(b"World!");
        assert_eq!(crc.finalize(), Some(HashValue::Crc32(0xEC4AC3D0)));

        let mut blake = EntryHasher::new(HashKind::Blake2sp);
        blake.update(b"abc");
        assert_eq!(
            blake.finalize(),
            Some(HashValue::Blake2sp(Blake2sp::compute(b"abc")))
        );
    }

    #[test]
    fn test_hash_value_accessors() {
        let crc = HashValue::Crc32(0x1234);
        assert_eq!(crc.kind(), HashKind::Crc32);
        assert_eq!(crc.crc32(), Some(0x1234));
        assert!(crc.digest().is_none());
        assert_eq!(crc.to_string(), "crc32:00001234");

        let digest = HashValue::Blake2sp([0xAB; BLAKE2SP_SIZE]);
        assert_eq!(digest.kind(), HashKind::Blake2sp);
        assert!(digest.to_string().starts_with("blake2sp:abab"));
        assert_eq!(HashKind::Blake2sp as u32, 2);
    }
}
