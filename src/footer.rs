use std::convert::TryInto;

use memchr::memrchr;

use crate::checksum::{self, CHECKSUM_LEN, Checksum};
use crate::constants::FOOTER_MAGIC;

/// Total size of a commit footer in bytes.
pub const FOOTER_SIZE: usize = FOOTER_MAGIC.len() + 8 + CHECKSUM_LEN + 8 + 8;

/// Parsed representation of the 64-byte footer trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitFooter {
    pub toc_len: u64,
    pub toc_hash: Checksum,
    pub generation: u64,
    pub wal_committed_seq: u64,
}

impl CommitFooter {
    /// Serialises the footer into its fixed-size byte array.
    #[must_use]
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[..8].copy_from_slice(&FOOTER_MAGIC);
        buf[8..16].copy_from_slice(&self.toc_len.to_le_bytes());
        buf[16..48].copy_from_slice(&self.toc_hash);
        buf[48..56].copy_from_slice(&self.generation.to_le_bytes());
        buf[56..64].copy_from_slice(&self.wal_committed_seq.to_le_bytes());
        buf
    }

    /// Attempts to decode a footer from a byte slice.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FOOTER_SIZE {
            return None;
        }
        if bytes[..8] != FOOTER_MAGIC {
            return None;
        }
        let toc_len = u64::from_le_bytes(bytes[8..16].try_into().ok()?);
        let mut toc_hash = [0u8; CHECKSUM_LEN];
        toc_hash.copy_from_slice(&bytes[16..48]);
        let generation = u64::from_le_bytes(bytes[48..56].try_into().ok()?);
        let wal_committed_seq = u64::from_le_bytes(bytes[56..64].try_into().ok()?);
        Some(Self {
            toc_len,
            toc_hash,
            generation,
            wal_committed_seq,
        })
    }

    /// Checks the footer hash against serialized TOC bytes. The hash covers
    /// the TOC with its trailing 32 checksum bytes zeroed.
    #[must_use]
    pub fn hash_matches(&self, toc_bytes: &[u8]) -> bool {
        if toc_bytes.len() < CHECKSUM_LEN {
            return false;
        }
        let mut hasher = checksum::Hasher::new();
        hasher.update(&toc_bytes[..toc_bytes.len() - CHECKSUM_LEN]);
        hasher.update(&[0u8; CHECKSUM_LEN]);
        hasher.finalize() == self.toc_hash
    }
}

/// Positions (descending) of every footer-magic occurrence inside `tail`
/// that leaves room for a complete footer.
#[must_use]
pub fn candidate_positions(tail: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut search_end = tail.len();
    while let Some(pos) = memrchr(FOOTER_MAGIC[0], &tail[..search_end]) {
        if pos + FOOTER_SIZE <= tail.len() && tail[pos..pos + 8] == FOOTER_MAGIC {
            positions.push(pos);
        }
        if pos == 0 {
            break;
        }
        search_end = pos;
    }
    positions
}
