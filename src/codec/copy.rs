//! Store method (no compression).

use std::io::{self, Read, Write};

use super::{UnpackParams, Unpacker, method};
use crate::READ_BUFFER_SIZE;

/// An unpacker that passes data through unchanged.
///
/// With a known unpacked size it copies exactly that many bytes and leaves
/// any trailing input (cipher padding) unread.
#[derive(Debug, Default)]
pub struct StoreUnpacker {
    buffer: Vec<u8>,
}

impl StoreUnpacker {
    /// Creates a new store unpacker.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Unpacker for StoreUnpacker {
    fn method(&self) -> u8 {
        method::STORE
    }

    fn unpack(
        &mut self,
        params: &UnpackParams,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> io::Result<u64> {
        if self.buffer.is_empty() {
            self.buffer.resize(READ_BUFFER_SIZE, 0);
        }

        let mut remaining = params.unpacked_size;
        let mut written = 0u64;
        loop {
            let want = match remaining {
                Some(0) => break,
                Some(n) => (n.min(self.buffer.len() as u64)) as usize,
                None => self.buffer.len(),
            };
            let n = match input.read(&mut self.buffer[..want]) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                if let Some(left) = remaining {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("stored data ends {} bytes early", left),
                    ));
                }
                break;
            }
            output.write_all(&self.buffer[..n])?;
            written += n as u64;
            remaining = remaining.map(|r| r - n as u64);
        }
        Ok(written)
    }
}
