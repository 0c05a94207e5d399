//! Content identity of file bytes.
//!
//! Identities are SHA-256 digests rendered as lowercase hex. They only need
//! to separate accidental changes, but a strong digest costs little here.

use filemesh_types::ContentId;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Read size used when streaming files through the hasher.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Incremental hasher; feeding the same bytes in any chunking yields the
/// same identity.
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    digest: Sha256,
    len: u64,
}

impl ContentHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next slice of content.
    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// Number of bytes fed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no bytes were fed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Consumes the hasher and returns the identity.
    pub fn finish(self) -> ContentId {
        ContentId::new(hex::encode(self.digest.finalize()))
    }
}

/// Identity of an in-memory byte slice.
pub fn content_id(bytes: &[u8]) -> ContentId {
    let mut hasher = ContentHasher::new();
    hasher.update(bytes);
    hasher.finish()
}

/// Streams a reader to the end in [`CHUNK_SIZE`] reads.
/// Returns the identity and the number of bytes read.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<(ContentId, u64)> {
    let mut hasher = ContentHasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    let len = hasher.len();
    Ok((hasher.finish(), len))
}

/// Identity and size of a file on disk.
pub fn hash_file(path: &Path) -> io::Result<(ContentId, u64)> {
    hash_reader(File::open(path)?)
}
