//! Decompression strategies for entry data.
//!
//! RAR 5.0 identifies the compression of an entry by a method code (0 for
//! store, 1-5 for increasing compression levels) and an algorithm version.
//! The extraction engine looks both up in a [`CodecRegistry`] and drives the
//! resulting [`Unpacker`]. Only store is built in; other algorithms are
//! supplied by the caller through [`CodecRegistry::register`].
//!
//! # Example
//!
//! ```rust
//! use rarkit::codec::{CodecRegistry, StoreUnpacker};
//!
//! let mut codecs = CodecRegistry::new();
//! assert!(codecs.supports(0, 0));
//! assert!(!codecs.supports(3, 0));
//!
//! // Pretend method 3 is stored data, e.g. for a test double.
//! codecs.register(3, 0, |_params| Ok(Box::new(StoreUnpacker::new())));
//! assert!(codecs.supports(3, 0));
//! ```

mod copy;

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::{Error, Result};

pub use copy::StoreUnpacker;

/// Method codes.
pub mod method {
    /// No compression.
    pub const STORE: u8 = 0;
    /// Fastest compression.
    pub const FASTEST: u8 = 1;
    /// Best compression.
    pub const BEST: u8 = 5;
}

/// Parameters an unpacker receives for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackParams {
    /// Method code.
    pub method: u8,
    /// Algorithm version from the compression information.
    pub version: u8,
    /// Dictionary size in bytes.
    pub dictionary_size: u64,
    /// Entry continues the stream of the previous entry.
    pub solid: bool,
    /// Declared unpacked size; `None` when unknown.
    pub unpacked_size: Option<u64>,
}

/// A decompressor for one method.
///
/// Instances used for solid archives are kept alive across entries; the
/// `solid` flag in [`UnpackParams`] tells the unpacker to keep its window.
pub trait Unpacker: Send {
    /// Returns the method code handled by this unpacker.
    fn method(&self) -> u8;

    /// Decodes one entry from `input` into `output`.
    ///
    /// Returns the number of bytes written. Implementations stop after
    /// `unpacked_size` bytes when it is known and must report
    /// [`io::ErrorKind::UnexpectedEof`] if the input ends first.
    fn unpack(
        &mut self,
        params: &UnpackParams,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<u64>;
}

/// Constructor for unpackers of one method and version.
pub type UnpackerFactory = Arc<dyn Fn(&UnpackParams) -> Result<Box<dyn Unpacker>> + Send + Sync>;

/// Lookup table from `(method, version)` to unpacker factories.
#[derive(Clone)]
pub struct CodecRegistry {
    factories: HashMap<(u8, u8), UnpackerFactory>,
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.factories.keys().copied().collect();
        keys.sort_unstable();
        f.debug_struct("CodecRegistry")
            .field("methods", &keys)
            .finish()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry {
    /// Creates a registry with the built-in store method.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for version in [0, 1] {
            registry.register(method::STORE, version, |_| Ok(Box::new(StoreUnpacker::new())));
        }
        registry
    }

    /// Creates a registry without any methods.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers (or replaces) the factory for `method` and `version`.
    pub fn register<F>(&mut self, method: u8, version: u8, factory: F) -> &mut Self
    where
        F: Fn(&UnpackParams) -> Result<Box<dyn Unpacker>> + Send + Sync + 'static,
    {
        self.factories.insert((method, version), Arc::new(factory));
        self
    }

    /// Returns `true` if an unpacker is registered for `method` and `version`.
    pub fn supports(&self, method: u8, version: u8) -> bool {
        self.factories.contains_key(&(method, version))
    }

    /// Creates an unpacker for the given parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] when nothing is registered.
    pub fn create(&self, params: &UnpackParams) -> Result<Box<dyn Unpacker>> {
        let factory = self
            .factories
            .get(&(params.method, params.version))
            .ok_or(Error::UnsupportedMethod {
                method: params.method,
                version: params.version,
            })?;
        factory(params)
    }
}
