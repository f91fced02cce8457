//! SHA-256 digests for payloads, WAL records, headers, and the TOC.

use sha2::{Digest, Sha256};

/// Length in bytes of every checksum stored by the format.
pub const CHECKSUM_LEN: usize = 32;

/// 32-byte SHA-256 digest.
pub type Checksum = [u8; CHECKSUM_LEN];

/// One-shot digest of a byte slice.
#[must_use]
pub fn digest(bytes: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Digest of the empty string, used by WAL padding records.
#[must_use]
pub fn empty_digest() -> Checksum {
    static EMPTY: std::sync::OnceLock<Checksum> = std::sync::OnceLock::new();
    *EMPTY.get_or_init(|| digest(&[]))
}

/// Streaming hasher for multi-part digests (header pages, checksummed TOCs).
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    #[must_use]
    pub fn finalize(self) -> Checksum {
        self.inner.finalize().into()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}
