//! Fixed-capacity byte buffers with an explicit fill length.
//!
//! Buffers are allocated once at their full capacity and never grow.
//! The number of valid bytes is tracked separately from the capacity, so
//! content containing zero bytes is measured correctly and trailing unused
//! capacity is never handed to a writer.

use bytes::Bytes;
use std::io::{self, Read};

/// A fixed-size buffer plus the count of bytes actually filled.
pub struct FixedBuffer {
    /// Backing storage, always `capacity` bytes long.
    data: Box<[u8]>,
    /// Number of valid bytes at the start of `data`.
    len: usize,
}

impl FixedBuffer {
    /// Create an empty buffer with `capacity` bytes of storage.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Total storage in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// The valid bytes only.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Forget the contents; capacity is kept.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Perform a single read into the buffer, replacing its contents.
    ///
    /// Returns the number of bytes read; `0` means the peer closed its side.
    /// Anything beyond capacity stays unread in the source.
    pub fn read_once<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        self.len = 0;
        loop {
            match reader.read(&mut self.data) {
                Ok(n) => {
                    self.len = n;
                    return Ok(n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read until the buffer is full or the source reaches EOF.
    ///
    /// Short reads are retried, so a source that trickles data in is not
    /// cut off early. Returns the number of bytes appended by this call.
    pub fn fill_from<R: Read>(&mut self, reader: &mut R) -> io::Result<usize> {
        let start = self.len;
        while self.len < self.data.len() {
            match reader.read(&mut self.data[self.len..]) {
                Ok(0) => break,
                Ok(n) => self.len += n,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(self.len - start)
    }

    /// Copy the valid bytes into an immutable, cheaply cloneable handle.
    pub fn freeze(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_slice())
    }
}
