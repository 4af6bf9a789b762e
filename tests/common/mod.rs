//! Shared test utilities for rarkit integration tests.
//!
//! The [`RarBuilder`] writes RAR 5.0 archives byte by byte, so tests can
//! produce stored, encrypted, solid, commented and multi-volume archives
//! without external tools. Entries declaring a compression method other than
//! store still carry their data uncompressed; tests pair them with a
//! [`CodecRegistry`](rarkit::CodecRegistry) that registers a store unpacker
//! for that method.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

use rarkit::crypto::{DerivedKeys, Password, derive_keys, mac_crc32, mac_digest};

/// RAR 5.0 signature.
pub const SIGNATURE: &[u8; 8] = b"Rar!\x1A\x07\x01\x00";

/// Key derivation count used by fixtures; kept small so tests stay fast.
pub const TEST_LG2: u8 = 4;

const FILE_SALT: [u8; 16] = [0x11; 16];
const HEADER_SALT: [u8; 16] = [0x22; 16];

/// Appends `value` as a RAR variable-length integer.
pub fn vint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Frames header fields as a block: CRC-32, size, fields.
pub fn frame(fields: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    vint(&mut body, fields.len() as u64);
    body.extend_from_slice(fields);
    let mut out = crc32fast::hash(&body).to_le_bytes().to_vec();
    out.extend(body);
    out
}

/// Encrypts `plain`, zero-padded to the AES block size.
pub fn encrypt(key: &[u8; 32], iv: [u8; 16], plain: &[u8]) -> Vec<u8> {
    let mut buf = plain.to_vec();
    buf.resize(plain.len().div_ceil(16) * 16, 0);
    let len = buf.len();
    cbc::Encryptor::<Aes256>::new(key.into(), &iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .unwrap();
    buf
}

fn record(kind: u64, body: &[u8]) -> Vec<u8> {
    let mut inner = Vec::new();
    vint(&mut inner, kind);
    inner.extend_from_slice(body);
    let mut out = Vec::new();
    vint(&mut out, inner.len() as u64);
    out.extend(inner);
    out
}

fn check_sum(check: &[u8; 8]) -> [u8; 4] {
    let digest = Sha256::digest(check);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// What an entry is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    File,
    Directory,
    /// Redirect record with the raw type code (1 Unix symlink, 4 hard link, 5 copy).
    Redirect { code: u64, target: String },
}

/// One entry of a fixture archive.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub data: Vec<u8>,
    pub kind: Kind,
    pub mtime: Option<u32>,
    pub attributes: u64,
    pub host_os: u64,
    pub method: u8,
    pub blake2: bool,
    pub encrypted: bool,
    pub unknown_size: bool,
    pub corrupt_crc: bool,
}

impl Entry {
    pub fn file(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            data: data.to_vec(),
            kind: Kind::File,
            mtime: None,
            attributes: 0o644,
            host_os: 1,
            method: 0,
            blake2: false,
            encrypted: false,
            unknown_size: false,
            corrupt_crc: false,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            kind: Kind::Directory,
            attributes: 0o755,
            ..Self::file(name, b"")
        }
    }

    pub fn symlink(name: &str, target: &str) -> Self {
        Self::redirect(name, 1, target)
    }

    pub fn hard_link(name: &str, target: &str) -> Self {
        Self::redirect(name, 4, target)
    }

    pub fn file_copy(name: &str, target: &str) -> Self {
        Self::redirect(name, 5, target)
    }

    pub fn redirect(name: &str, code: u64, target: &str) -> Self {
        Self {
            kind: Kind::Redirect {
                code,
                target: target.to_string(),
            },
            attributes: 0o777,
            ..Self::file(name, b"")
        }
    }

    pub fn mtime(mut self, secs: u32) -> Self {
        self.mtime = Some(secs);
        self
    }

    pub fn attributes(mut self, attributes: u64) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn host_os(mut self, host: u64) -> Self {
        self.host_os = host;
        self
    }

    pub fn method(mut self, method: u8) -> Self {
        self.method = method;
        self
    }

    pub fn blake2(mut self) -> Self {
        self.blake2 = true;
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn unknown_size(mut self) -> Self {
        self.unknown_size = true;
        self
    }

    /// Stores a wrong data checksum.
    pub fn corrupt_crc(mut self) -> Self {
        self.corrupt_crc = true;
        self
    }

    fn has_data(&self) -> bool {
        self.kind == Kind::File
    }
}

/// Slice of an entry's packed data stored in one volume.
#[derive(Debug, Clone, Copy)]
struct Piece {
    entry: usize,
    start: usize,
    end: usize,
    split_before: bool,
    split_after: bool,
}

/// Writes RAR 5.0 archives for tests.
#[derive(Debug, Clone)]
pub struct RarBuilder {
    entries: Vec<Entry>,
    comment: Option<Vec<u8>>,
    solid: bool,
    locked: bool,
    recovery: bool,
    password: String,
    header_password: Option<String>,
    psw_check: bool,
    hash_mac: bool,
    sfx_stub: Vec<u8>,
}

impl Default for RarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RarBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            comment: None,
            solid: false,
            locked: false,
            recovery: false,
            password: String::new(),
            header_password: None,
            psw_check: true,
            hash_mac: false,
            sfx_stub: Vec::new(),
        }
    }

    pub fn entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn file(self, name: &str, data: &[u8]) -> Self {
        self.entry(Entry::file(name, data))
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.comment = Some(text.as_bytes().to_vec());
        self
    }

    pub fn solid(mut self) -> Self {
        self.solid = true;
        self
    }

    pub fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    pub fn recovery(mut self) -> Self {
        self.recovery = true;
        self
    }

    /// Password for entries marked [`Entry::encrypted`].
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    /// Encrypts every header after the signature with `password`.
    pub fn encrypt_headers(mut self, password: &str) -> Self {
        self.header_password = Some(password.to_string());
        self
    }

    /// Leaves out the password check values.
    pub fn without_password_check(mut self) -> Self {
        self.psw_check = false;
        self
    }

    /// Stores checksums of encrypted entries as keyed MACs.
    pub fn hash_mac(mut self) -> Self {
        self.hash_mac = true;
        self
    }

    /// Prepends a self-extractor stub.
    pub fn sfx_stub(mut self, stub: &[u8]) -> Self {
        self.sfx_stub = stub.to_vec();
        self
    }

    /// Builds a single-volume archive.
    pub fn build(&self) -> Vec<u8> {
        let pieces = (0..self.entries.len())
            .map(|i| Piece {
                entry: i,
                start: 0,
                end: self.packed(i).len(),
                split_before: false,
                split_after: false,
            })
            .collect();
        self.serialize(&[pieces], false).remove(0)
    }

    /// Builds a volume set, placing at most `capacity` packed data bytes in
    /// each volume. Entries that do not fit are split across volumes.
    pub fn build_volumes(&self, capacity: usize) -> Vec<Vec<u8>> {
        let mut plan: Vec<Vec<Piece>> = vec![Vec::new()];
        let mut used = 0;
        for i in 0..self.entries.len() {
            let len = self.packed(i).len();
            let mut start = 0;
            loop {
                let room = capacity.saturating_sub(used);
                if room == 0 && len > 0 {
                    plan.push(Vec::new());
                    used = 0;
                    continue;
                }
                let end = start + room.min(len - start);
                plan.last_mut().unwrap().push(Piece {
                    entry: i,
                    start,
                    end,
                    split_before: start > 0,
                    split_after: end < len,
                });
                used += end - start;
                start = end;
                if end == len {
                    break;
                }
                plan.push(Vec::new());
                used = 0;
            }
        }
        self.serialize(&plan, true)
    }

    /// Writes a single-volume archive to `dir/name`.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    /// Writes a volume set as `dir/{stem}.partN.rar` and returns the paths.
    pub fn write_volumes(&self, dir: &Path, stem: &str, capacity: usize) -> Vec<PathBuf> {
        self.build_volumes(capacity)
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| {
                let path = dir.join(format!("{}.part{}.rar", stem, i + 1));
                std::fs::write(&path, bytes).unwrap();
                path
            })
            .collect()
    }

    fn file_keys(&self) -> DerivedKeys {
        derive_keys(&Password::new(self.password.as_str()), &FILE_SALT, TEST_LG2, 24).unwrap()
    }

    fn header_keys(&self) -> Option<DerivedKeys> {
        self.header_password.as_ref().map(|pw| {
            derive_keys(&Password::new(pw.as_str()), &HEADER_SALT, TEST_LG2, 24).unwrap()
        })
    }

    fn entry_iv(index: usize) -> [u8; 16] {
        [0x40 ^ index as u8; 16]
    }

    /// Packed bytes of entry `i`: the data, encrypted if requested.
    fn packed(&self, i: usize) -> Vec<u8> {
        let e = &self.entries[i];
        if !e.has_data() {
            return Vec::new();
        }
        if e.encrypted {
            encrypt(&self.file_keys().key, Self::entry_iv(i), &e.data)
        } else {
            e.data.clone()
        }
    }

    fn keyed(&self, e: &Entry) -> bool {
        e.encrypted && self.hash_mac
    }

    fn crc_value(&self, e: &Entry, bytes: &[u8]) -> u32 {
        let crc = crc32fast::hash(bytes);
        if self.keyed(e) {
            mac_crc32(&self.file_keys().hash_key, crc).unwrap()
        } else {
            crc
        }
    }

    fn blake2_value(&self, e: &Entry, bytes: &[u8]) -> [u8; 32] {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&blake2s_simd::blake2sp::blake2sp(bytes).as_bytes()[..32]);
        if self.keyed(e) {
            mac_digest(&self.file_keys().hash_key, &digest).unwrap()
        } else {
            digest
        }
    }

    fn serialize(&self, plan: &[Vec<Piece>], volumes: bool) -> Vec<Vec<u8>> {
        let header_keys = self.header_keys();
        let mut header_iv = 0u8;
        let mut out = Vec::new();

        for (number, pieces) in plan.iter().enumerate() {
            let mut bytes = if number == 0 { self.sfx_stub.clone() } else { Vec::new() };
            bytes.extend_from_slice(SIGNATURE);

            if let Some(keys) = &header_keys {
                let mut fields = Vec::new();
                vint(&mut fields, 4);
                vint(&mut fields, 0);
                vint(&mut fields, 0);
                vint(&mut fields, u64::from(self.psw_check));
                fields.push(TEST_LG2);
                fields.extend_from_slice(&HEADER_SALT);
                if self.psw_check {
                    fields.extend_from_slice(&keys.check);
                    fields.extend_from_slice(&check_sum(&keys.check));
                }
                bytes.extend(frame(&fields));
            }

            let mut emit = |bytes: &mut Vec<u8>, framed: Vec<u8>, data: &[u8]| {
                match &header_keys {
                    Some(keys) => {
                        header_iv = header_iv.wrapping_add(1);
                        let iv = [0x30 ^ header_iv; 16];
                        bytes.extend_from_slice(&iv);
                        bytes.extend(encrypt(&keys.key, iv, &framed));
                    }
                    None => bytes.extend(framed),
                }
                bytes.extend_from_slice(data);
            };

            emit(&mut bytes, self.main_block(volumes, number), &[]);
            if number == 0 {
                if let Some(comment) = &self.comment {
                    emit(&mut bytes, self.comment_block(comment), comment);
                }
            }
            for piece in pieces {
                let packed = self.packed(piece.entry);
                let data = &packed[piece.start..piece.end];
                emit(&mut bytes, self.file_block(piece, data), data);
            }
            let last = number + 1 == plan.len();
            let mut end = Vec::new();
            vint(&mut end, 5);
            vint(&mut end, 0);
            vint(&mut end, u64::from(!last));
            emit(&mut bytes, frame(&end), &[]);
            out.push(bytes);
        }
        out
    }

    fn main_block(&self, volume: bool, number: usize) -> Vec<u8> {
        let mut flags = 0;
        if volume {
            flags |= 0x01;
            if number > 0 {
                flags |= 0x02;
            }
        }
        if self.solid {
            flags |= 0x04;
        }
        if self.recovery {
            flags |= 0x08;
        }
        if self.locked {
            flags |= 0x10;
        }
        let mut fields = Vec::new();
        vint(&mut fields, 1);
        vint(&mut fields, 0);
        vint(&mut fields, flags);
        if flags & 0x02 != 0 {
            vint(&mut fields, number as u64);
        }
        frame(&fields)
    }

    fn comment_block(&self, comment: &[u8]) -> Vec<u8> {
        let mut fields = Vec::new();
        vint(&mut fields, 3);
        vint(&mut fields, 0x02);
        vint(&mut fields, comment.len() as u64);
        vint(&mut fields, 0x04);
        vint(&mut fields, comment.len() as u64);
        vint(&mut fields, 0);
        fields.extend_from_slice(&crc32fast::hash(comment).to_le_bytes());
        vint(&mut fields, 0);
        vint(&mut fields, 0);
        vint(&mut fields, 3);
        fields.extend_from_slice(b"CMT");
        frame(&fields)
    }

    fn file_block(&self, piece: &Piece, data: &[u8]) -> Vec<u8> {
        let e = &self.entries[piece.entry];
        let whole = &e.data;

        let mut extra = Vec::new();
        if e.encrypted {
            let keys = self.file_keys();
            let mut body = Vec::new();
            vint(&mut body, 0);
            let mut flags = 0;
            if self.psw_check {
                flags |= 0x01;
            }
            if self.hash_mac {
                flags |= 0x02;
            }
            vint(&mut body, flags);
            body.push(TEST_LG2);
            body.extend_from_slice(&FILE_SALT);
            body.extend_from_slice(&Self::entry_iv(piece.entry));
            if self.psw_check {
                body.extend_from_slice(&keys.check);
                body.extend_from_slice(&check_sum(&keys.check));
            }
            extra.extend(record(0x01, &body));
        }
        if e.blake2 && e.has_data() {
            let mut digest = if piece.split_after {
                self.blake2_value(e, data)
            } else {
                self.blake2_value(e, whole)
            };
            if e.corrupt_crc && !piece.split_after {
                digest[0] ^= 0xFF;
            }
            let mut body = Vec::new();
            vint(&mut body, 0);
            body.extend_from_slice(&digest);
            extra.extend(record(0x02, &body));
        }
        if let Kind::Redirect { code, target } = &e.kind {
            let mut body = Vec::new();
            vint(&mut body, *code);
            vint(&mut body, 0);
            vint(&mut body, target.len() as u64);
            body.extend_from_slice(target.as_bytes());
            extra.extend(record(0x05, &body));
        }

        let mut block_flags = 0;
        if !extra.is_empty() {
            block_flags |= 0x01;
        }
        if e.has_data() {
            block_flags |= 0x02;
        }
        if piece.split_before {
            block_flags |= 0x08;
        }
        if piece.split_after {
            block_flags |= 0x10;
        }

        let mut file_flags = 0;
        if e.kind == Kind::Directory {
            file_flags |= 0x01;
        }
        if e.mtime.is_some() {
            file_flags |= 0x02;
        }
        let with_crc = e.has_data() && !e.blake2;
        if with_crc {
            file_flags |= 0x04;
        }
        if e.unknown_size {
            file_flags |= 0x08;
        }

        let mut fields = Vec::new();
        vint(&mut fields, 2);
        vint(&mut fields, block_flags);
        if !extra.is_empty() {
            vint(&mut fields, extra.len() as u64);
        }
        if e.has_data() {
            vint(&mut fields, data.len() as u64);
        }
        vint(&mut fields, file_flags);
        vint(&mut fields, if e.unknown_size { 0 } else { whole.len() as u64 });
        vint(&mut fields, e.attributes);
        if let Some(mtime) = e.mtime {
            fields.extend_from_slice(&mtime.to_le_bytes());
        }
        if with_crc {
            let mut crc = if piece.split_after {
                self.crc_value(e, data)
            } else {
                self.crc_value(e, whole)
            };
            if e.corrupt_crc && !piece.split_after {
                crc ^= 0xFFFF_FFFF;
            }
            fields.extend_from_slice(&crc.to_le_bytes());
        }
        let solid = self.solid && piece.entry > 0 && e.kind != Kind::Directory;
        let compression = if e.kind == Kind::Directory {
            0
        } else {
            (u64::from(e.method) << 7) | (u64::from(solid) << 6)
        };
        vint(&mut fields, compression);
        vint(&mut fields, e.host_os);
        vint(&mut fields, e.name.len() as u64);
        fields.extend_from_slice(e.name.as_bytes());
        fields.extend(extra);
        frame(&fields)
    }
}

/// Writes `bytes` to `dir/name`.
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Deterministic pseudo-random data of `len` bytes.
pub fn sample_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Extracts the error from a Result, panicking if it's Ok.
pub fn expect_err<T, E>(result: Result<T, E>) -> E {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}
