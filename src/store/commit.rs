//! The transactional commit boundary.
//!
//! A commit replays pending WAL mutations onto the committed TOC image,
//! serializes the new TOC, and advances the on-disk state in a fixed order:
//! TOC → footer → truncate → fsync → header A → header B → fsync. A crash at
//! any point leaves the previous footer (and the WAL) recoverable.

use std::collections::BTreeSet;

use crate::error::{Result, StoreError};
use crate::footer::{CommitFooter, FOOTER_SIZE};
use crate::io::wal::Mutation;
use crate::io::{header, pfile};
use crate::store::lifecycle::Store;
use crate::store::{meta_from_put, PendingState};
use crate::types::{FrameStatus, SegmentKind, Toc};

fn invalid(reason: impl Into<std::borrow::Cow<'static, str>>) -> StoreError {
    StoreError::InvalidToc {
        reason: reason.into(),
    }
}

/// Applies pending mutations in sequence order to a copy of the committed
/// TOC, enforcing the commit-time invariants.
pub(crate) fn apply_mutations(base: &Toc, mutations: &[(u64, Mutation)]) -> Result<Toc> {
    let mut toc = base.clone();
    for (_, mutation) in mutations {
        match mutation {
            Mutation::PutFrame(record) => {
                if record.frame_id != toc.frames.len() as u64 {
                    return Err(invalid(format!(
                        "put frame id {} is not dense (expected {})",
                        record.frame_id,
                        toc.frames.len()
                    )));
                }
                toc.frames.push(meta_from_put(record));
            }
            Mutation::DeleteFrame { frame_id } => {
                let frame = toc
                    .frames
                    .get_mut(*frame_id as usize)
                    .ok_or_else(|| invalid(format!("delete references unknown frame {frame_id}")))?;
                frame.status = FrameStatus::Deleted;
            }
            Mutation::SupersedeFrame { old_id, new_id } => {
                apply_supersede(&mut toc, *old_id, *new_id)?;
            }
            Mutation::PutEmbedding { .. } => {
                // Embeddings are drained by the external vector layer; the
                // TOC itself does not change.
            }
        }
    }
    Ok(toc)
}

fn apply_supersede(toc: &mut Toc, old_id: u64, new_id: u64) -> Result<()> {
    let count = toc.frames.len() as u64;
    if old_id == new_id {
        return Err(invalid(format!("frame {old_id} cannot supersede itself")));
    }
    if old_id >= count || new_id >= count {
        return Err(invalid(format!(
            "supersede references unknown frames ({old_id}, {new_id})"
        )));
    }
    if toc.frames[old_id as usize].superseded_by.is_some() {
        return Err(invalid(format!("frame {old_id} is already superseded")));
    }
    if toc.frames[new_id as usize].supersedes.is_some() {
        return Err(invalid(format!(
            "frame {new_id} already supersedes another frame"
        )));
    }
    // Cycle walk with an explicit visited set; multiple pending edges may
    // land in the same commit.
    let mut visited = BTreeSet::new();
    let mut cursor = toc.frames[old_id as usize].supersedes;
    while let Some(id) = cursor {
        if id == new_id {
            return Err(StoreError::SupersedeCycle { old_id, new_id });
        }
        if !visited.insert(id) {
            return Err(StoreError::SupersedeCycle { old_id, new_id });
        }
        cursor = toc.frames[id as usize].supersedes;
    }
    toc.frames[old_id as usize].superseded_by = Some(new_id);
    toc.frames[new_id as usize].supersedes = Some(old_id);
    Ok(())
}

impl Store {
    /// Atomically advances the visible state by one generation. A commit
    /// with no pending mutations and no staged indexes is a no-op.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_writable()?;
        if self.pending.is_empty() && !self.has_staged_indexes() {
            tracing::debug!("commit with no pending mutations is a no-op");
            return Ok(());
        }

        let mut toc = apply_mutations(&self.toc, &self.pending.mutations)?;

        for (kind, staged) in [
            (SegmentKind::Lex, self.staged_lex.clone()),
            (SegmentKind::Vec, self.staged_vec.clone()),
        ] {
            let Some(staged) = staged else { continue };
            // The catalog entries of this kind are replaced wholesale.
            toc.segment_catalog.retain(|entry| entry.kind != kind);
            toc.segment_catalog.push(staged.entry.clone());
            match kind {
                SegmentKind::Lex => toc.indexes.lex = staged.lex.clone(),
                SegmentKind::Vec => toc.indexes.vec = staged.vec.clone(),
            }
        }
        toc.segment_catalog.sort_by_key(|entry| entry.bytes_offset);
        toc.validate_structure()?;

        let toc_bytes = toc.encode()?;
        let toc_checksum = Toc::checksum_of(&toc_bytes);

        // The new TOC goes after both the committed data and the previous
        // footer so a torn commit can always fall back to it.
        let data_end = toc.max_data_end().max(self.data_start());
        let toc_offset = data_end.max(self.footer_end());
        let footer_offset = toc_offset + toc_bytes.len() as u64;
        let generation = self.file_generation + 1;
        let committed_seq = self.wal.last_sequence();
        let footer = CommitFooter {
            toc_len: toc_bytes.len() as u64,
            toc_hash: toc_checksum,
            generation,
            wal_committed_seq: committed_seq,
        };

        pfile::write_all_at(&mut self.file, toc_offset, &toc_bytes)?;
        pfile::write_all_at(&mut self.file, footer_offset, &footer.encode())?;
        pfile::truncate(&self.file, footer_offset + FOOTER_SIZE as u64)?;
        pfile::sync(&self.file)?;

        self.wal.checkpoint();

        let snapshot = header::ReplaySnapshot {
            file_generation: generation,
            wal_committed_seq: committed_seq,
            footer_offset,
            wal_write_pos: self.wal.write_pos(),
            wal_checkpoint_pos: self.wal.checkpoint_pos(),
            wal_pending_bytes: 0,
            wal_last_sequence: self.wal.last_sequence(),
        };
        let page_generation = self.header_page_generation + 1;
        let mut page = header::HeaderPage {
            header_page_generation: page_generation,
            file_generation: generation,
            footer_offset,
            wal_offset: self.wal_offset,
            wal_size: self.wal_size,
            wal_write_pos: self.wal.write_pos(),
            wal_checkpoint_pos: self.wal.checkpoint_pos(),
            wal_committed_seq: committed_seq,
            toc_checksum,
            replay_snapshot: Some(snapshot),
        };
        header::write_page(&mut self.file, 0, &page)?;
        pfile::sync(&self.file)?;
        page.header_page_generation = page_generation - 1;
        header::write_page(&mut self.file, 1, &page)?;
        pfile::sync(&self.file)?;

        self.header_page_generation = page_generation;
        self.file_generation = generation;
        self.footer_offset = footer_offset;
        self.toc_checksum = toc_checksum;
        self.toc = toc;
        self.pending = PendingState::default();
        self.staged_lex = None;
        self.staged_vec = None;

        tracing::debug!(
            generation,
            frames = self.toc.frames.len(),
            committed_seq,
            "commit complete"
        );
        Ok(())
    }
}
