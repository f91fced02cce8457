//! Open-time recovery: header selection, footer selection, WAL replay, and
//! optional repair truncation.

use std::fs::File;
use std::path::PathBuf;

use crate::constants::{FOOTER_SCAN_WINDOW, MAX_TOC_BYTES, MIN_TOC_BYTES};
use crate::error::{Result, StoreError};
use crate::footer::{self, CommitFooter, FOOTER_SIZE};
use crate::io::wal::{Mutation, WalRing};
use crate::io::{header, pfile};
use crate::lock::FileLock;
use crate::store::lifecycle::{OpenOptions, Store};
use crate::store::PendingState;
use crate::types::Toc;

/// A validated footer candidate: the footer, its file offset, and the TOC
/// bytes it covers.
struct SelectedFooter {
    offset: u64,
    footer: CommitFooter,
    toc_bytes: Vec<u8>,
}

pub(crate) fn open_existing(
    path: PathBuf,
    mut file: File,
    lock: FileLock,
    options: OpenOptions,
) -> Result<Store> {
    let (page_a, page_b) = header::read_pages(&mut file);
    let page = header::select_page(page_a, page_b)?;

    let selected = select_footer(&mut file, &page)?;
    let toc = Toc::decode(&selected.toc_bytes)?;
    toc.validate_ranges(page.wal_offset + page.wal_size, selected.offset)?;

    // The footer is the authoritative commit watermark; the header may be one
    // commit behind when a crash hit between footer and header rewrite.
    let committed_seq = selected.footer.wal_committed_seq;
    let floor_seq = page.wal_committed_seq.min(committed_seq);

    let mut wal = WalRing::new(
        page.wal_offset,
        page.wal_size,
        page.wal_write_pos,
        page.wal_checkpoint_pos,
        committed_seq,
        committed_seq,
        0,
    );
    wal.validate_geometry()?;

    let mut snapshot_state = None;
    if let Some(snapshot) = &page.replay_snapshot {
        let matches_footer = snapshot.file_generation == selected.footer.generation
            && snapshot.wal_committed_seq == selected.footer.wal_committed_seq
            && snapshot.footer_offset == selected.offset
            && snapshot.wal_write_pos == snapshot.wal_checkpoint_pos
            && snapshot.wal_write_pos <= page.wal_size;
        if matches_footer && wal.probe_terminal(&mut file, snapshot.wal_write_pos)? {
            snapshot_state = Some(crate::io::wal::ScanState {
                write_pos: snapshot.wal_write_pos,
                pending_bytes: snapshot.wal_pending_bytes,
                last_sequence: snapshot.wal_last_sequence,
            });
        }
    }

    let mut pending = PendingState::default();
    if let Some(state) = snapshot_state {
        wal.adopt(state);
        wal.counters.replay_snapshot_hit_count += 1;
        tracing::debug!("replay snapshot matched footer; wal scan skipped");
    } else {
        let outcome = wal.scan(&mut file, floor_seq, committed_seq)?;
        wal.adopt(outcome.state);
        for (sequence, mutation) in outcome.mutations {
            pending.absorb(sequence, mutation);
        }
        if !pending.is_empty() {
            tracing::debug!(
                pending = pending.mutations.len(),
                "recovered pending wal mutations"
            );
        }
    }

    let footer_end = selected.offset + FOOTER_SIZE as u64;
    let mut keep_end = footer_end;
    for (_, mutation) in &pending.mutations {
        if let Mutation::PutFrame(record) = mutation {
            keep_end = keep_end.max(record.payload_offset + record.payload_length);
        }
    }
    let file_len = pfile::file_len(&file)?;
    if file_len > keep_end {
        if options.repair && !options.read_only {
            tracing::warn!(
                trailing = file_len - keep_end,
                "repair: truncating trailing bytes beyond the recoverable tail"
            );
            pfile::truncate(&file, keep_end)?;
            pfile::sync(&file)?;
        } else {
            tracing::debug!(
                trailing = file_len - keep_end,
                "trailing bytes beyond the recoverable tail left in place"
            );
        }
    }

    tracing::debug!(
        path = %path.display(),
        generation = selected.footer.generation,
        frames = toc.frames.len(),
        pending = pending.mutations.len(),
        "opened store"
    );

    Ok(Store {
        path,
        file,
        lock: Some(lock),
        read_only: options.read_only,
        is_open: true,
        header_page_generation: page.header_page_generation,
        file_generation: selected.footer.generation,
        footer_offset: selected.offset,
        toc_checksum: selected.footer.toc_hash,
        toc,
        wal,
        wal_offset: page.wal_offset,
        wal_size: page.wal_size,
        pending,
        staged_lex: None,
        staged_vec: None,
        auto_commit_threshold_pct: options.auto_commit_threshold_pct,
    })
}

/// Validates the footer named by `offset`: bounded TOC length and matching
/// TOC hash. Returns the candidate with its TOC bytes on success.
fn validate_candidate(
    file: &mut File,
    file_len: u64,
    offset: u64,
) -> Option<SelectedFooter> {
    if offset + FOOTER_SIZE as u64 > file_len {
        return None;
    }
    let mut buf = [0u8; FOOTER_SIZE];
    pfile::read_exact_at(file, offset, &mut buf).ok()?;
    let footer = CommitFooter::decode(&buf)?;
    if footer.toc_len < MIN_TOC_BYTES || footer.toc_len > MAX_TOC_BYTES || footer.toc_len > offset {
        return None;
    }
    let toc_offset = offset - footer.toc_len;
    let mut toc_bytes = vec![0u8; footer.toc_len as usize];
    pfile::read_exact_at(file, toc_offset, &mut toc_bytes).ok()?;
    if !footer.hash_matches(&toc_bytes) {
        return None;
    }
    Some(SelectedFooter {
        offset,
        footer,
        toc_bytes,
    })
}

/// Considers the header fast path, the replay snapshot, and a bounded tail
/// scan; picks the valid candidate with the highest (generation, offset).
fn select_footer(file: &mut File, page: &header::HeaderPage) -> Result<SelectedFooter> {
    let file_len = pfile::file_len(file)?;
    let mut best: Option<SelectedFooter> = None;

    consider(&mut best, validate_candidate(file, file_len, page.footer_offset));
    if let Some(snapshot) = &page.replay_snapshot {
        if snapshot.footer_offset != page.footer_offset {
            consider(
                &mut best,
                validate_candidate(file, file_len, snapshot.footer_offset),
            );
        }
    }

    // Bounded backward scan over the file tail.
    let window = FOOTER_SCAN_WINDOW.min(file_len);
    let window_base = file_len - window;
    let mut tail = vec![0u8; window as usize];
    pfile::read_exact_at(file, window_base, &mut tail)?;
    for pos in footer::candidate_positions(&tail) {
        let offset = window_base + pos as u64;
        let already_best = best
            .as_ref()
            .is_some_and(|current| current.offset == offset);
        if !already_best {
            consider(&mut best, validate_candidate(file, file_len, offset));
        }
    }

    best.ok_or_else(|| StoreError::InvalidFooter {
        reason: "no valid commit footer found".into(),
    })
}

fn consider(best: &mut Option<SelectedFooter>, candidate: Option<SelectedFooter>) {
    if let Some(candidate) = candidate {
        let better = match best {
            None => true,
            Some(current) => {
                (candidate.footer.generation, candidate.offset)
                    > (current.footer.generation, current.offset)
            }
        };
        if better {
            *best = Some(candidate);
        }
    }
}
