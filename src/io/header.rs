//! Fixed-size header pages and the dual-page atomic swap.
//!
//! Two 4 KiB pages live at file offsets 0 and 4096. Every commit rewrites
//! both; the page with the higher `header_page_generation` wins on open, so
//! a torn header write always leaves one intact page behind.

use std::convert::TryInto;
use std::fs::File;

use crate::checksum::{self, CHECKSUM_LEN, Checksum};
use crate::constants::{
    FORMAT_VERSION, HEADER_SIZE, MAGIC, SNAPSHOT_MAGIC, SPEC_MAJOR, SPEC_MINOR, WAL_OFFSET,
};
use crate::error::{Result, StoreError};
use crate::io::pfile;

const VERSION_OFFSET: usize = 4;
const SPEC_BYTES_OFFSET: usize = 6;
const PAGE_GENERATION_POS: usize = 8;
const FILE_GENERATION_POS: usize = 16;
const FOOTER_OFFSET_POS: usize = 24;
const WAL_OFFSET_POS: usize = 32;
const WAL_SIZE_POS: usize = 40;
const WAL_WRITE_POS: usize = 48;
const WAL_CHECKPOINT_POS: usize = 56;
const WAL_COMMITTED_SEQ_POS: usize = 64;
const TOC_CHECKSUM_POS: usize = 72;
const TOC_CHECKSUM_END: usize = 104;
const HEADER_CHECKSUM_POS: usize = 104;
const HEADER_CHECKSUM_END: usize = 136;
const SNAPSHOT_POS: usize = 136;
const SNAPSHOT_END: usize = SNAPSHOT_POS + 8 + 7 * 8;

fn invalid(reason: &'static str) -> StoreError {
    StoreError::InvalidHeader {
        reason: reason.into(),
    }
}

/// WAL state captured at the instant of the last successful commit. When it
/// still matches the selected footer on open, the WAL scan can be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySnapshot {
    pub file_generation: u64,
    pub wal_committed_seq: u64,
    pub footer_offset: u64,
    pub wal_write_pos: u64,
    pub wal_checkpoint_pos: u64,
    pub wal_pending_bytes: u64,
    pub wal_last_sequence: u64,
}

/// Decoded header page contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPage {
    /// Page selector; the copy with the higher value wins.
    pub header_page_generation: u64,
    /// Commit generation of the store as a whole.
    pub file_generation: u64,
    pub footer_offset: u64,
    pub wal_offset: u64,
    pub wal_size: u64,
    pub wal_write_pos: u64,
    pub wal_checkpoint_pos: u64,
    pub wal_committed_seq: u64,
    pub toc_checksum: Checksum,
    pub replay_snapshot: Option<ReplaySnapshot>,
}

impl HeaderPage {
    /// Encodes the page into its canonical 4 KiB representation, computing
    /// the header checksum over the page with the checksum field zeroed.
    pub fn encode(&self) -> Result<[u8; HEADER_SIZE]> {
        if self.wal_offset < WAL_OFFSET {
            return Err(invalid("wal_offset precedes the data region"));
        }
        if self.wal_size == 0 {
            return Err(invalid("wal_size must be non-zero"));
        }

        let mut buf = [0u8; HEADER_SIZE];
        buf[..MAGIC.len()].copy_from_slice(&MAGIC);
        buf[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[SPEC_BYTES_OFFSET] = SPEC_MAJOR;
        buf[SPEC_BYTES_OFFSET + 1] = SPEC_MINOR;
        buf[PAGE_GENERATION_POS..PAGE_GENERATION_POS + 8]
            .copy_from_slice(&self.header_page_generation.to_le_bytes());
        buf[FILE_GENERATION_POS..FILE_GENERATION_POS + 8]
            .copy_from_slice(&self.file_generation.to_le_bytes());
        buf[FOOTER_OFFSET_POS..FOOTER_OFFSET_POS + 8]
            .copy_from_slice(&self.footer_offset.to_le_bytes());
        buf[WAL_OFFSET_POS..WAL_OFFSET_POS + 8].copy_from_slice(&self.wal_offset.to_le_bytes());
        buf[WAL_SIZE_POS..WAL_SIZE_POS + 8].copy_from_slice(&self.wal_size.to_le_bytes());
        buf[WAL_WRITE_POS..WAL_WRITE_POS + 8].copy_from_slice(&self.wal_write_pos.to_le_bytes());
        buf[WAL_CHECKPOINT_POS..WAL_CHECKPOINT_POS + 8]
            .copy_from_slice(&self.wal_checkpoint_pos.to_le_bytes());
        buf[WAL_COMMITTED_SEQ_POS..WAL_COMMITTED_SEQ_POS + 8]
            .copy_from_slice(&self.wal_committed_seq.to_le_bytes());
        buf[TOC_CHECKSUM_POS..TOC_CHECKSUM_END].copy_from_slice(&self.toc_checksum);

        if let Some(snapshot) = &self.replay_snapshot {
            let mut pos = SNAPSHOT_POS;
            buf[pos..pos + 8].copy_from_slice(&SNAPSHOT_MAGIC);
            pos += 8;
            for value in [
                snapshot.file_generation,
                snapshot.wal_committed_seq,
                snapshot.footer_offset,
                snapshot.wal_write_pos,
                snapshot.wal_checkpoint_pos,
                snapshot.wal_pending_bytes,
                snapshot.wal_last_sequence,
            ] {
                buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
                pos += 8;
            }
        }

        let digest = page_digest(&buf);
        buf[HEADER_CHECKSUM_POS..HEADER_CHECKSUM_END].copy_from_slice(&digest);
        Ok(buf)
    }

    /// Decodes and validates a header page: magic, versions, and the page
    /// checksum computed with the checksum field zeroed.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        if bytes[..MAGIC.len()] != MAGIC {
            return Err(invalid("magic mismatch"));
        }
        let version = u16::from_le_bytes(bytes[VERSION_OFFSET..VERSION_OFFSET + 2].try_into()?);
        if version != FORMAT_VERSION {
            return Err(invalid("unsupported format version"));
        }
        if bytes[SPEC_BYTES_OFFSET] != SPEC_MAJOR || bytes[SPEC_BYTES_OFFSET + 1] != SPEC_MINOR {
            return Err(invalid("spec byte mismatch"));
        }

        let stored: Checksum = bytes[HEADER_CHECKSUM_POS..HEADER_CHECKSUM_END].try_into()?;
        if page_digest(bytes) != stored {
            return Err(invalid("header checksum mismatch"));
        }

        let read_u64 = |pos: usize| -> Result<u64> {
            Ok(u64::from_le_bytes(bytes[pos..pos + 8].try_into()?))
        };

        let wal_offset = read_u64(WAL_OFFSET_POS)?;
        if wal_offset < WAL_OFFSET {
            return Err(invalid("wal_offset precedes the data region"));
        }
        let wal_size = read_u64(WAL_SIZE_POS)?;
        if wal_size == 0 {
            return Err(invalid("wal_size must be non-zero"));
        }

        let replay_snapshot = if bytes[SNAPSHOT_POS..SNAPSHOT_POS + 8] == SNAPSHOT_MAGIC {
            let mut values = [0u64; 7];
            for (i, value) in values.iter_mut().enumerate() {
                *value = read_u64(SNAPSHOT_POS + 8 + i * 8)?;
            }
            Some(ReplaySnapshot {
                file_generation: values[0],
                wal_committed_seq: values[1],
                footer_offset: values[2],
                wal_write_pos: values[3],
                wal_checkpoint_pos: values[4],
                wal_pending_bytes: values[5],
                wal_last_sequence: values[6],
            })
        } else if bytes[SNAPSHOT_POS..SNAPSHOT_END].iter().all(|b| *b == 0) {
            None
        } else {
            return Err(invalid("malformed replay snapshot"));
        };

        Ok(Self {
            header_page_generation: read_u64(PAGE_GENERATION_POS)?,
            file_generation: read_u64(FILE_GENERATION_POS)?,
            footer_offset: read_u64(FOOTER_OFFSET_POS)?,
            wal_offset,
            wal_size,
            wal_write_pos: read_u64(WAL_WRITE_POS)?,
            wal_checkpoint_pos: read_u64(WAL_CHECKPOINT_POS)?,
            wal_committed_seq: read_u64(WAL_COMMITTED_SEQ_POS)?,
            toc_checksum: bytes[TOC_CHECKSUM_POS..TOC_CHECKSUM_END].try_into()?,
            replay_snapshot,
        })
    }
}

fn page_digest(bytes: &[u8; HEADER_SIZE]) -> Checksum {
    let mut hasher = checksum::Hasher::new();
    hasher.update(&bytes[..HEADER_CHECKSUM_POS]);
    hasher.update(&[0u8; CHECKSUM_LEN]);
    hasher.update(&bytes[HEADER_CHECKSUM_END..]);
    hasher.finalize()
}

/// Reads and decodes both header pages.
pub fn read_pages(file: &mut File) -> (Result<HeaderPage>, Result<HeaderPage>) {
    let read_one = |file: &mut File, offset: u64| -> Result<HeaderPage> {
        let mut buf = [0u8; HEADER_SIZE];
        pfile::read_exact_at(file, offset, &mut buf)?;
        HeaderPage::decode(&buf)
    };
    let a = read_one(file, 0);
    let b = read_one(file, HEADER_SIZE as u64);
    (a, b)
}

/// Selects the authoritative page: both valid takes the higher page
/// generation, one valid takes that one, neither fails the open.
pub fn select_page(a: Result<HeaderPage>, b: Result<HeaderPage>) -> Result<HeaderPage> {
    match (a, b) {
        (Ok(a), Ok(b)) => {
            if a.header_page_generation >= b.header_page_generation {
                Ok(a)
            } else {
                Ok(b)
            }
        }
        (Ok(page), Err(err)) | (Err(err), Ok(page)) => {
            tracing::debug!(error = %err, "one header page invalid, using the surviving copy");
            Ok(page)
        }
        (Err(_), Err(_)) => Err(invalid("neither header page is valid")),
    }
}

/// Writes one header page at slot 0 (offset 0) or slot 1 (offset 4096).
pub fn write_page(file: &mut File, slot: usize, page: &HeaderPage) -> Result<()> {
    debug_assert!(slot < 2);
    let bytes = page.encode()?;
    pfile::write_all_at(file, (slot * HEADER_SIZE) as u64, &bytes)
}
