//! Payload loading.
//!
//! The payload file is read exactly once, before any socket exists. Its
//! contents are capped at a fixed capacity; anything past the cap is
//! dropped and only the operator hears about it.

use crate::runtime::FixedBuffer;
use bytes::Bytes;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while loading the payload. Both are fatal at start-up.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to open payload file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read payload file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PayloadError {
    pub fn path(&self) -> &Path {
        match self {
            PayloadError::Open { path, .. } | PayloadError::Read { path, .. } => path,
        }
    }
}

/// The bytes served to every client. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Payload {
    bytes: Bytes,
    truncated: bool,
}

impl Payload {
    /// Read up to `capacity` bytes of the file at `path`.
    ///
    /// The file handle is closed before this returns, whether or not the
    /// buffer was filled.
    pub fn load(path: impl AsRef<Path>, capacity: usize) -> Result<Self, PayloadError> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|source| PayloadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let payload = Self::read_from(&mut file, capacity).map_err(|source| PayloadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        drop(file);

        if payload.truncated() {
            warn!(
                path = %path.display(),
                capacity,
                "Payload file exceeds capacity, serving the first {} bytes",
                capacity
            );
        } else if payload.is_empty() {
            warn!(path = %path.display(), "Payload file is empty, clients get the header only");
        }
        debug!(path = %path.display(), len = payload.len(), "Payload loaded");

        Ok(payload)
    }

    /// Read up to `capacity` bytes from any reader.
    pub fn read_from<R: Read>(reader: &mut R, capacity: usize) -> std::io::Result<Self> {
        let mut buf = FixedBuffer::new(capacity);
        buf.fill_from(reader)?;

        // One probe byte past a full buffer tells truncation apart from an exact fit.
        let truncated = buf.is_full() && {
            let mut probe = [0u8; 1];
            loop {
                match reader.read(&mut probe) {
                    Ok(n) => break n > 0,
                    Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
        };

        Ok(Self {
            bytes: buf.freeze(),
            truncated,
        })
    }

    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self {
            bytes: Bytes::from_static(bytes),
            truncated: false,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Logical length: the bytes actually read, never the capacity.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the source held more than `capacity` bytes.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}
