//! AES-256 decryption support for RAR 5.0 archives.
//!
//! RAR 5.0 encrypts file data and, optionally, all headers with AES-256 in
//! CBC mode. Keys come from PBKDF2-HMAC-SHA256 over the UTF-8 password:
//!
//! - the AES key after `2^lg2_count` iterations,
//! - the hash key (used to tweak stored checksums) after 16 more,
//! - the password check value after another 16.
//!
//! # Key Derivation Caching
//!
//! With the default `lg2_count` of 15 every derivation runs 32,800 HMAC
//! rounds. Entries of one archive normally share a salt, so [`KeyCache`]
//! remembers recent derivations and the session pays the cost once.

mod gate;
mod password;

use std::io::{self, Read};
use std::num::NonZeroUsize;

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use lru::LruCache;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::checksum::{BLAKE2SP_SIZE, HashValue};
use crate::format::header::PasswordCheck;
use crate::format::{IV_SIZE, PSW_CHECK_SIZE, SALT_SIZE};
use crate::{Error, Result};

pub(crate) use gate::CryptoGate;
pub use password::Password;

type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Largest `lg2_count` accepted from an archive.
///
/// RAR itself never writes more than 24 (16M iterations); larger values
/// only serve to stall the reader.
pub const MAX_KDF_LG2: u8 = 24;

/// Default number of derivations kept by a [`KeyCache`].
pub const DEFAULT_KEY_CACHE_SIZE: usize = 8;

/// Size of a decryption chunk; a multiple of [`BLOCK_SIZE`].
const CHUNK_SIZE: usize = 4096;

/// Keys derived from a password and salt.
#[derive(Clone)]
pub struct DerivedKeys {
    /// AES-256 key.
    pub key: [u8; 32],
    /// Key for the checksum MAC.
    pub hash_key: [u8; 32],
    /// Folded password check value.
    pub check: [u8; PSW_CHECK_SIZE],
}

impl DerivedKeys {
    /// Returns `true` if this password produced the stored check value.
    pub fn matches(&self, check: &PasswordCheck) -> bool {
        self.check == check.value
    }
}

impl std::fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeys").finish_non_exhaustive()
    }
}

impl Drop for DerivedKeys {
    fn drop(&mut self) {
        self.key.zeroize();
        self.hash_key.zeroize();
        self.check.zeroize();
    }
}

fn hmac_sha256(key: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(key).map_err(|_| Error::InvalidState("HMAC key rejected"))
}

/// Derives the AES key, hash key and password check.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] if `lg2_count` exceeds `max_lg2`
/// (which itself is capped at [`MAX_KDF_LG2`]).
pub fn derive_keys(
    password: &Password,
    salt: &[u8],
    lg2_count: u8,
    max_lg2: u8,
) -> Result<DerivedKeys> {
    let limit = max_lg2.min(MAX_KDF_LG2);
    if lg2_count > limit {
        log::warn!(
            "key derivation count 2^{} exceeds limit 2^{}, rejecting",
            lg2_count,
            limit
        );
        return Err(Error::UnsupportedFormat(format!(
            "key derivation count 2^{} exceeds limit 2^{}",
            lg2_count, limit
        )));
    }

    let prf = hmac_sha256(password.as_bytes())?;
    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u: [u8; 32] = mac.finalize().into_bytes().into();
    let mut acc = u;

    // One PBKDF2 block, continued past the key to produce two more values.
    let rounds = [(1u32 << lg2_count) - 1, 16, 16];
    let mut outputs = [[0u8; 32]; 3];
    for (rounds, out) in rounds.iter().zip(outputs.iter_mut()) {
        for _ in 0..*rounds {
            let mut mac = prf.clone();
            mac.update(&u);
            u = mac.finalize().into_bytes().into();
            for (a, b) in acc.iter_mut().zip(u.iter()) {
                *a ^= b;
            }
        }
        *out = acc;
    }
    u.zeroize();
    acc.zeroize();

    let mut check = [0u8; PSW_CHECK_SIZE];
    for (i, b) in outputs[2].iter().enumerate() {
        check[i % PSW_CHECK_SIZE] ^= b;
    }
    let keys = DerivedKeys {
        key: outputs[0],
        hash_key: outputs[1],
        check,
    };
    outputs.zeroize();
    Ok(keys)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    password_hash: [u8; 32],
    salt: [u8; SALT_SIZE],
    lg2_count: u8,
}

/// Statistics for key cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of derivations performed.
    pub misses: u64,
}

/// LRU cache of derived keys.
///
/// Passwords are not stored; entries are keyed by a SHA-256 of the password.
pub struct KeyCache {
    cache: LruCache<CacheKey, DerivedKeys>,
    stats: CacheStats,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("len", &self.cache.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_CACHE_SIZE)
    }
}

impl KeyCache {
    /// Creates a cache holding up to `capacity` derivations.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(cap),
            stats: CacheStats::default(),
        }
    }

    /// Derives keys, reusing a cached derivation when possible.
    pub fn derive(
        &mut self,
        password: &Password,
        salt: &[u8; SALT_SIZE],
        lg2_count: u8,
        max_lg2: u8,
    ) -> Result<DerivedKeys> {
        let cache_key = CacheKey {
            password_hash: Sha256::digest(password.as_bytes()).into(),
            salt: *salt,
            lg2_count,
        };
        if let Some(keys) = self.cache.get(&cache_key) {
            self.stats.hits += 1;
            return Ok(keys.clone());
        }

        let keys = derive_keys(password, salt, lg2_count, max_lg2)?;
        self.stats.misses += 1;
        self.cache.put(cache_key, keys.clone());
        Ok(keys)
    }

    /// Returns the cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Forgets every cached derivation.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Number of cached derivations.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Decrypts `data` in place. `data` must be a whole number of blocks.
pub fn decrypt_in_place(key: &[u8; 32], iv: &[u8; IV_SIZE], data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidState("cipher input not block aligned"));
    }
    Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(data)
        .map_err(|_| Error::InvalidState("cipher input not block aligned"))?;
    Ok(())
}

/// Key used to decrypt headers of an archive with encrypted headers.
#[derive(Clone)]
pub struct HeaderCipher {
    keys: DerivedKeys,
}

impl HeaderCipher {
    /// Wraps keys derived from the archive encryption header.
    pub fn new(keys: DerivedKeys) -> Self {
        Self { keys }
    }

    /// Decrypts one header area in place.
    pub fn decrypt(&self, iv: &[u8; IV_SIZE], data: &mut [u8]) -> Result<()> {
        decrypt_in_place(&self.keys.key, iv, data)
    }
}

impl std::fmt::Debug for HeaderCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderCipher").finish_non_exhaustive()
    }
}

/// Converts a CRC-32 into the value stored for entries using the hash MAC.
pub fn mac_crc32(hash_key: &[u8; 32], crc: u32) -> Result<u32> {
    let mut mac = hmac_sha256(hash_key)?;
    mac.update(&crc.to_le_bytes());
    let digest = mac.finalize().into_bytes();
    let mut folded = 0u32;
    for (i, b) in digest.iter().enumerate() {
        folded ^= u32::from(*b) << ((i & 3) * 8);
    }
    Ok(folded)
}

/// Converts a BLAKE2sp digest into the value stored for entries using the hash MAC.
pub fn mac_digest(hash_key: &[u8; 32], digest: &[u8; BLAKE2SP_SIZE]) -> Result<[u8; BLAKE2SP_SIZE]> {
    let mut mac = hmac_sha256(hash_key)?;
    mac.update(digest);
    Ok(mac.finalize().into_bytes().into())
}

/// Applies the hash MAC to a computed checksum.
pub fn mac_hash(hash_key: &[u8; 32], value: HashValue) -> Result<HashValue> {
    Ok(match value {
        HashValue::Crc32(crc) => HashValue::Crc32(mac_crc32(hash_key, crc)?),
        HashValue::Blake2sp(d) => HashValue::Blake2sp(mac_digest(hash_key, &d)?),
    })
}

/// AES-256-CBC decoder for encrypted data streams.
///
/// The inner reader may return short reads at any position (for example
/// at a volume boundary); input is gathered until whole blocks are
/// available.
pub struct CbcReader<R> {
    inner: R,
    buffer: Vec<u8>,
    pos: usize,
    key: [u8; 32],
    iv: [u8; IV_SIZE],
    finished: bool,
}

impl<R> std::fmt::Debug for CbcReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbcReader").finish_non_exhaustive()
    }
}

impl<R> Drop for CbcReader<R> {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl<R: Read> CbcReader<R> {
    /// Creates a decoder with an explicit key and IV.
    pub fn new(inner: R, key: [u8; 32], iv: [u8; IV_SIZE]) -> Self {
        Self {
            inner,
            buffer: Vec::with_capacity(CHUNK_SIZE),
            pos: 0,
            key,
            iv,
            finished: false,
        }
    }

    fn decrypt_chunk(&mut self) -> io::Result<()> {
        self.buffer.resize(CHUNK_SIZE, 0);
        self.pos = 0;
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            match self.inner.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled % BLOCK_SIZE == 0 {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.buffer.truncate(filled);

        if filled == 0 {
            self.finished = true;
            return Ok(());
        }
        if filled % BLOCK_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "encrypted data not block-aligned",
            ));
        }

        let mut next_iv = [0u8; IV_SIZE];
        next_iv.copy_from_slice(&self.buffer[filled - BLOCK_SIZE..]);
        decrypt_in_place(&self.key, &self.iv, &mut self.buffer).map_err(Error::into_io)?;
        self.iv = next_iv;
        Ok(())
    }

    /// Returns the inner reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: Read> Read for CbcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.buffer.len() && !self.finished {
            self.decrypt_chunk()?;
        }
        if self.pos >= self.buffer.len() {
            return Ok(0);
        }

        let available = &self.buffer[self.pos..];
        let to_copy = available.len().min(buf.len());
        buf[..to_copy].copy_from_slice(&available[..to_copy]);
        self.pos += to_copy;
        Ok(to_copy)
    }
}
