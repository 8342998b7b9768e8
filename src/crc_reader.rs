//! CRC-32 checking for member streams

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

/// Reader that validates the CRC-32 of everything it passed along
/// once the inner reader reports EOF.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    expected: u32,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, expected: u32) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            expected,
        }
    }

    fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count == 0 && !buf.is_empty() {
            let actual = self.checksum();
            if actual != self.expected {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Invalid checksum: expected {:08x}, got {:08x}",
                        self.expected, actual
                    ),
                ));
            }
        }
        self.hasher.update(&buf[..count]);
        Ok(count)
    }
}
