//! Embedded write-ahead log ring.
//!
//! The ring lives at a fixed offset inside the store file. Records carry a
//! 48-byte header (sequence, length, flags, SHA-256 of the payload) followed
//! by the payload. A record never straddles the end of the ring: the writer
//! either zero-fills a short tail or emits a padding record, then wraps.
//! Every append leaves a terminal marker after the newest record so a scan
//! knows where the log ends; a wrapped scan relies on sequence monotonicity
//! to tell a terminal sentinel apart from a zero-filled tail.

use std::fs::File;

use serde::{Deserialize, Serialize};

use crate::checksum::{self, CHECKSUM_LEN, Checksum};
use crate::codec::{Decoder, Encoder};
use crate::constants::WAL_RECORD_HEADER_SIZE;
use crate::error::{Result, StoreError};
use crate::io::pfile;
use crate::toc;
use crate::types::{FrameMetaSubset, PayloadEncoding};

/// Record header size as usize for buffer arithmetic.
pub const RECORD_HEADER_SIZE: usize = WAL_RECORD_HEADER_SIZE as usize;

const FLAG_PADDING: u32 = 1;

const OP_PUT_FRAME: u8 = 0x01;
const OP_DELETE_FRAME: u8 = 0x02;
const OP_SUPERSEDE_FRAME: u8 = 0x03;
const OP_PUT_EMBEDDING: u8 = 0x04;

fn corruption(offset: u64, reason: &'static str) -> StoreError {
    StoreError::WalCorruption {
        offset,
        reason: reason.into(),
    }
}

/// Fixed-size WAL record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub sequence: u64,
    pub length: u32,
    pub flags: u32,
    pub checksum: Checksum,
}

impl RecordHeader {
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        buf[..8].copy_from_slice(&self.sequence.to_le_bytes());
        buf[8..12].copy_from_slice(&self.length.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..48].copy_from_slice(&self.checksum);
        buf
    }

    #[must_use]
    pub fn decode(bytes: &[u8; RECORD_HEADER_SIZE]) -> Self {
        let mut checksum = [0u8; CHECKSUM_LEN];
        checksum.copy_from_slice(&bytes[16..48]);
        Self {
            sequence: u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes")),
            length: u32::from_le_bytes(bytes[8..12].try_into().expect("4 bytes")),
            flags: u32::from_le_bytes(bytes[12..16].try_into().expect("4 bytes")),
            checksum,
        }
    }

    #[must_use]
    pub fn is_padding(&self) -> bool {
        self.flags & FLAG_PADDING != 0
    }
}

/// One decoded WAL mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    PutFrame(PutFrameRecord),
    DeleteFrame {
        frame_id: u64,
    },
    SupersedeFrame {
        old_id: u64,
        new_id: u64,
    },
    PutEmbedding {
        frame_id: u64,
        values: Vec<f32>,
    },
}

/// Payload of a PutFrame record: everything needed to rebuild the frame meta
/// during replay.
#[derive(Debug, Clone, PartialEq)]
pub struct PutFrameRecord {
    pub frame_id: u64,
    pub timestamp: i64,
    pub subset: FrameMetaSubset,
    pub payload_offset: u64,
    pub payload_length: u64,
    pub canonical_encoding: PayloadEncoding,
    pub canonical_length: Option<u64>,
    pub checksum: Checksum,
    pub stored_checksum: Option<Checksum>,
}

impl Mutation {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        match self {
            Mutation::PutFrame(record) => {
                enc.put_u8(OP_PUT_FRAME);
                enc.put_u64(record.frame_id);
                enc.put_i64(record.timestamp);
                toc::encode_subset(&mut enc, &record.subset)?;
                enc.put_u64(record.payload_offset);
                enc.put_u64(record.payload_length);
                enc.put_u8(record.canonical_encoding.as_byte());
                enc.put_opt_u64(record.canonical_length);
                enc.put_checksum(&record.checksum)?;
                enc.put_opt_checksum(record.stored_checksum.as_ref())?;
            }
            Mutation::DeleteFrame { frame_id } => {
                enc.put_u8(OP_DELETE_FRAME);
                enc.put_u64(*frame_id);
            }
            Mutation::SupersedeFrame { old_id, new_id } => {
                enc.put_u8(OP_SUPERSEDE_FRAME);
                enc.put_u64(*old_id);
                enc.put_u64(*new_id);
            }
            Mutation::PutEmbedding { frame_id, values } => {
                enc.put_u8(OP_PUT_EMBEDDING);
                enc.put_u64(*frame_id);
                enc.put_u32(u32::try_from(values.len()).map_err(|_| StoreError::Encoding {
                    reason: "embedding dimension exceeds u32".into(),
                })?);
                for value in values {
                    enc.put_u32(value.to_bits());
                }
            }
        }
        Ok(enc.finish())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let mutation = match dec.take_u8()? {
            OP_PUT_FRAME => {
                let frame_id = dec.take_u64()?;
                let timestamp = dec.take_i64()?;
                let subset = toc::decode_subset(&mut dec)?;
                let payload_offset = dec.take_u64()?;
                let payload_length = dec.take_u64()?;
                let canonical_encoding = PayloadEncoding::from_byte(dec.take_u8()?)
                    .ok_or_else(|| StoreError::Decoding {
                        reason: "canonical encoding out of range".into(),
                    })?;
                let canonical_length = dec.take_opt_u64()?;
                let checksum = dec.take_checksum()?;
                let stored_checksum = dec.take_opt_checksum()?;
                Mutation::PutFrame(PutFrameRecord {
                    frame_id,
                    timestamp,
                    subset,
                    payload_offset,
                    payload_length,
                    canonical_encoding,
                    canonical_length,
                    checksum,
                    stored_checksum,
                })
            }
            OP_DELETE_FRAME => Mutation::DeleteFrame {
                frame_id: dec.take_u64()?,
            },
            OP_SUPERSEDE_FRAME => Mutation::SupersedeFrame {
                old_id: dec.take_u64()?,
                new_id: dec.take_u64()?,
            },
            OP_PUT_EMBEDDING => {
                let frame_id = dec.take_u64()?;
                let dimension = dec.take_u32()? as usize;
                let mut values = Vec::with_capacity(dimension);
                for _ in 0..dimension {
                    values.push(f32::from_bits(dec.take_u32()?));
                }
                Mutation::PutEmbedding { frame_id, values }
            }
            _ => {
                return Err(StoreError::Decoding {
                    reason: "unknown wal opcode".into(),
                });
            }
        };
        dec.finish()?;
        Ok(mutation)
    }
}

/// Diagnostic counters maintained across the life of an open handle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WalCounters {
    pub wrap_count: u64,
    pub checkpoint_count: u64,
    /// Sentinel emissions that needed their own write call.
    pub sentinel_write_count: u64,
    pub write_call_count: u64,
    pub auto_commit_count: u64,
    pub replay_snapshot_hit_count: u64,
}

/// Snapshot of WAL state exposed through `Store::wal_stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalStats {
    pub wal_size: u64,
    pub write_pos: u64,
    pub checkpoint_pos: u64,
    pub pending_bytes: u64,
    pub committed_seq: u64,
    pub last_seq: u64,
    pub wrap_count: u64,
    pub checkpoint_count: u64,
    pub sentinel_write_count: u64,
    pub write_call_count: u64,
    pub auto_commit_count: u64,
    pub replay_snapshot_hit_count: u64,
}

/// Final ring state produced by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    pub write_pos: u64,
    pub pending_bytes: u64,
    pub last_sequence: u64,
}

/// Outcome of scanning the ring from the checkpoint.
#[derive(Debug)]
pub struct ScanOutcome {
    pub state: ScanState,
    /// Mutations with sequence beyond the committed watermark, in order.
    pub mutations: Vec<(u64, Mutation)>,
    /// True when a record payload failed semantic decoding; the state scan
    /// still completed, but later mutations were not collected.
    pub mutation_decode_failed: bool,
}

/// The embedded WAL ring and its in-memory write state.
#[derive(Debug)]
pub struct WalRing {
    offset: u64,
    size: u64,
    write_pos: u64,
    checkpoint_pos: u64,
    committed_seq: u64,
    last_sequence: u64,
    pending_bytes: u64,
    pub counters: WalCounters,
}

impl WalRing {
    #[must_use]
    pub fn new(
        offset: u64,
        size: u64,
        write_pos: u64,
        checkpoint_pos: u64,
        committed_seq: u64,
        last_sequence: u64,
        pending_bytes: u64,
    ) -> Self {
        Self {
            offset,
            size,
            write_pos,
            checkpoint_pos,
            committed_seq,
            last_sequence,
            pending_bytes,
            counters: WalCounters::default(),
        }
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn write_pos(&self) -> u64 {
        self.write_pos
    }

    #[must_use]
    pub fn checkpoint_pos(&self) -> u64 {
        self.checkpoint_pos
    }

    #[must_use]
    pub fn committed_seq(&self) -> u64 {
        self.committed_seq
    }

    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    #[must_use]
    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes
    }

    #[must_use]
    pub fn stats(&self) -> WalStats {
        WalStats {
            wal_size: self.size,
            write_pos: self.write_pos,
            checkpoint_pos: self.checkpoint_pos,
            pending_bytes: self.pending_bytes,
            committed_seq: self.committed_seq,
            last_seq: self.last_sequence,
            wrap_count: self.counters.wrap_count,
            checkpoint_count: self.counters.checkpoint_count,
            sentinel_write_count: self.counters.sentinel_write_count,
            write_call_count: self.counters.write_call_count,
            auto_commit_count: self.counters.auto_commit_count,
            replay_snapshot_hit_count: self.counters.replay_snapshot_hit_count,
        }
    }

    /// Marks everything up to the current write position as committed.
    pub fn checkpoint(&mut self) {
        self.checkpoint_pos = self.write_pos;
        self.committed_seq = self.last_sequence;
        self.pending_bytes = 0;
        self.counters.checkpoint_count += 1;
    }

    /// Appends one data record and its terminal marker, returning the
    /// assigned sequence number.
    pub fn append(&mut self, file: &mut File, payload: &[u8]) -> Result<u64> {
        if payload.is_empty() {
            return Err(StoreError::Encoding {
                reason: "wal payload must not be empty".into(),
            });
        }
        if u32::try_from(payload.len()).is_err() {
            return Err(StoreError::Encoding {
                reason: "wal payload exceeds u32::MAX".into(),
            });
        }
        let entry = WAL_RECORD_HEADER_SIZE + payload.len() as u64;
        let remaining = self.size - self.write_pos;
        let wrap_fill = if remaining < entry { remaining } else { 0 };
        let required = wrap_fill + entry + WAL_RECORD_HEADER_SIZE;
        if entry > self.size || self.pending_bytes + required > self.size {
            return Err(StoreError::CapacityExceeded {
                current: self.pending_bytes,
                limit: self.size,
                required,
            });
        }

        if remaining < entry {
            if remaining <= WAL_RECORD_HEADER_SIZE {
                // Too short for even a padding header: zero-fill and wrap.
                if remaining > 0 {
                    let zeros = vec![0u8; remaining as usize];
                    pfile::write_all_at(file, self.offset + self.write_pos, &zeros)?;
                    self.counters.write_call_count += 1;
                }
            } else {
                let sequence = self.last_sequence + 1;
                let skip = remaining - WAL_RECORD_HEADER_SIZE;
                let header = RecordHeader {
                    sequence,
                    length: skip as u32,
                    flags: FLAG_PADDING,
                    checksum: checksum::empty_digest(),
                };
                pfile::write_all_at(file, self.offset + self.write_pos, &header.encode())?;
                self.counters.write_call_count += 1;
                self.last_sequence = sequence;
            }
            self.pending_bytes += remaining;
            self.write_pos = 0;
            self.counters.wrap_count += 1;
        }

        let sequence = self.last_sequence + 1;
        let header = RecordHeader {
            sequence,
            length: payload.len() as u32,
            flags: 0,
            checksum: checksum::digest(payload),
        };
        let post = self.write_pos + entry;
        let contiguous_after = self.size - post;
        let mut buf = Vec::with_capacity(entry as usize + RECORD_HEADER_SIZE);
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(payload);
        if contiguous_after >= WAL_RECORD_HEADER_SIZE {
            // Inline sentinel in the same write.
            buf.extend_from_slice(&[0u8; RECORD_HEADER_SIZE]);
            pfile::write_all_at(file, self.offset + self.write_pos, &buf)?;
            self.counters.write_call_count += 1;
            self.write_pos = post;
        } else if contiguous_after > 0 {
            pfile::write_all_at(file, self.offset + self.write_pos, &buf)?;
            let zeros = vec![0u8; contiguous_after as usize];
            pfile::write_all_at(file, self.offset + post, &zeros)?;
            self.counters.write_call_count += 2;
            self.counters.sentinel_write_count += 1;
            self.write_pos = post;
        } else {
            pfile::write_all_at(file, self.offset + self.write_pos, &buf)?;
            pfile::write_all_at(file, self.offset, &[0u8; RECORD_HEADER_SIZE])?;
            self.counters.write_call_count += 2;
            self.counters.sentinel_write_count += 1;
            self.write_pos = 0;
            self.counters.wrap_count += 1;
        }
        self.pending_bytes += entry;
        self.last_sequence = sequence;
        Ok(sequence)
    }

    /// Scans the ring from the checkpoint and returns the recovered state
    /// plus pending mutations.
    ///
    /// `floor_seq` is the sequence watermark at the checkpoint position (the
    /// selected header's committed sequence); `committed_seq` is the
    /// authoritative watermark of the selected footer. The two differ only
    /// when a crash landed between footer and header rewrite.
    pub fn scan(&self, file: &mut File, floor_seq: u64, committed_seq: u64) -> Result<ScanOutcome> {
        let start = if self.checkpoint_pos >= self.size {
            0
        } else {
            self.checkpoint_pos
        };
        let mut pos = start;
        let mut prev_seq = floor_seq;
        let mut pending: u64 = 0;
        let mut last_sequence = floor_seq.max(committed_seq);
        let mut wrapped = false;
        // Set while crossing a zeroed tail: (write_pos, pending) to restore
        // if nothing valid follows at position 0.
        let mut tail_restore: Option<(u64, u64)> = None;
        let mut mutations = Vec::new();
        let mut mutation_decode_failed = false;

        let mut header_buf = [0u8; RECORD_HEADER_SIZE];
        loop {
            if wrapped && pos == start && tail_restore.is_none() {
                break;
            }
            let remaining = self.size - pos;
            if remaining < WAL_RECORD_HEADER_SIZE {
                if wrapped {
                    break;
                }
                tail_restore = Some((pos, pending));
                pending += remaining;
                pos = 0;
                wrapped = true;
                continue;
            }
            pfile::read_exact_at(file, self.offset + pos, &mut header_buf)?;
            if header_buf.iter().all(|b| *b == 0) {
                if remaining == WAL_RECORD_HEADER_SIZE && !wrapped {
                    // Either a terminal sentinel that happens to sit at the
                    // tail, or a zero-filled tail before a wrap. The record
                    // at position 0 settles it via the sequence rule.
                    tail_restore = Some((pos, pending));
                    pending += remaining;
                    pos = 0;
                    wrapped = true;
                    continue;
                }
                if let Some((restore_pos, restore_pending)) = tail_restore {
                    pos = restore_pos;
                    pending = restore_pending;
                }
                break;
            }
            let header = RecordHeader::decode(&header_buf);
            if header.sequence == 0 || header.sequence <= prev_seq {
                if let Some((restore_pos, restore_pending)) = tail_restore {
                    pos = restore_pos;
                    pending = restore_pending;
                }
                break;
            }
            if header.is_padding() {
                if header.checksum != checksum::empty_digest() {
                    tracing::debug!(pos, "wal scan stopped at padding with bad checksum");
                    break;
                }
                let advance = WAL_RECORD_HEADER_SIZE + u64::from(header.length);
                if advance > remaining {
                    tracing::debug!(pos, "wal scan stopped at oversized padding");
                    break;
                }
                tail_restore = None;
                prev_seq = header.sequence;
                last_sequence = last_sequence.max(header.sequence);
                pending += advance;
                pos += advance;
                if pos == self.size {
                    if wrapped {
                        break;
                    }
                    pos = 0;
                    wrapped = true;
                }
                continue;
            }

            // Data record: bounds, then payload checksum.
            let length = u64::from(header.length);
            if header.length == 0
                || length > self.size - WAL_RECORD_HEADER_SIZE
                || length > remaining - WAL_RECORD_HEADER_SIZE
            {
                if let Some((restore_pos, restore_pending)) = tail_restore {
                    pos = restore_pos;
                    pending = restore_pending;
                } else {
                    tracing::debug!(pos, length, "wal scan stopped at invalid record length");
                }
                break;
            }
            let mut payload = vec![0u8; header.length as usize];
            pfile::read_exact_at(file, self.offset + pos + WAL_RECORD_HEADER_SIZE, &mut payload)?;
            if checksum::digest(&payload) != header.checksum {
                if let Some((restore_pos, restore_pending)) = tail_restore {
                    pos = restore_pos;
                    pending = restore_pending;
                } else {
                    tracing::debug!(pos, "wal scan stopped at payload checksum mismatch");
                }
                break;
            }

            tail_restore = None;
            prev_seq = header.sequence;
            last_sequence = last_sequence.max(header.sequence);
            let advance = WAL_RECORD_HEADER_SIZE + length;
            pending += advance;
            pos += advance;

            if header.sequence > committed_seq && !mutation_decode_failed {
                match Mutation::decode(&payload) {
                    Ok(mutation) => mutations.push((header.sequence, mutation)),
                    Err(err) => {
                        tracing::warn!(
                            sequence = header.sequence,
                            error = %err,
                            "pending wal mutation failed to decode; later mutations dropped"
                        );
                        mutation_decode_failed = true;
                    }
                }
            }

            if pos == self.size {
                if wrapped {
                    break;
                }
                pos = 0;
                wrapped = true;
            }
        }

        Ok(ScanOutcome {
            state: ScanState {
                write_pos: pos,
                pending_bytes: pending,
                last_sequence,
            },
            mutations,
            mutation_decode_failed,
        })
    }

    /// Adopts a scan result as the live write state.
    pub fn adopt(&mut self, state: ScanState) {
        self.write_pos = state.write_pos;
        self.pending_bytes = state.pending_bytes;
        self.last_sequence = state.last_sequence;
    }

    /// True when the byte(s) at `write_pos` form a terminal marker: a
    /// sentinel header, a zero-filled tail, or the ring boundary itself.
    pub fn probe_terminal(&self, file: &mut File, write_pos: u64) -> Result<bool> {
        if write_pos >= self.size {
            return Ok(write_pos == self.size);
        }
        let span = (self.size - write_pos).min(WAL_RECORD_HEADER_SIZE) as usize;
        let mut buf = vec![0u8; span];
        pfile::read_exact_at(file, self.offset + write_pos, &mut buf)?;
        Ok(buf.iter().all(|b| *b == 0))
    }

    /// Validates header-derived geometry before trusting it.
    pub fn validate_geometry(&self) -> Result<()> {
        if self.write_pos > self.size {
            return Err(corruption(self.write_pos, "write position escapes the ring"));
        }
        if self.checkpoint_pos > self.size {
            return Err(corruption(
                self.checkpoint_pos,
                "checkpoint position escapes the ring",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    const RING_OFFSET: u64 = 64;

    fn ring(size: u64) -> (WalRing, File) {
        let file = tempfile().expect("tempfile");
        (WalRing::new(RING_OFFSET, size, 0, 0, 0, 0, 0), file)
    }

    fn sample_mutation(id: u64) -> Mutation {
        Mutation::DeleteFrame { frame_id: id }
    }

    #[test]
    fn record_header_roundtrip() {
        let header = RecordHeader {
            sequence: 9,
            length: 1234,
            flags: FLAG_PADDING,
            checksum: [0x5A; 32],
        };
        let decoded = RecordHeader::decode(&header.encode());
        assert_eq!(decoded, header);
        assert!(decoded.is_padding());
    }

    #[test]
    fn mutation_roundtrips() {
        let put = Mutation::PutFrame(PutFrameRecord {
            frame_id: 3,
            timestamp: 1_700_000_123_456,
            subset: FrameMetaSubset {
                uri: Some("mv2s://x".into()),
                ..FrameMetaSubset::default()
            },
            payload_offset: 70_000,
            payload_length: 42,
            canonical_encoding: PayloadEncoding::Lz4,
            canonical_length: Some(80),
            checksum: [1; 32],
            stored_checksum: Some([2; 32]),
        });
        for mutation in [
            put,
            Mutation::DeleteFrame { frame_id: 7 },
            Mutation::SupersedeFrame {
                old_id: 1,
                new_id: 2,
            },
            Mutation::PutEmbedding {
                frame_id: 5,
                values: vec![0.5, -1.25, 3.75],
            },
        ] {
            let bytes = mutation.encode().unwrap();
            assert_eq!(Mutation::decode(&bytes).unwrap(), mutation);
        }
    }

    #[test]
    fn append_then_scan_recovers_mutations() {
        let (mut wal, mut file) = ring(4096);
        let mut sequences = Vec::new();
        for id in 0..5 {
            let payload = sample_mutation(id).encode().unwrap();
            sequences.push(wal.append(&mut file, &payload).unwrap());
        }
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

        let outcome = wal.scan(&mut file, 0, 0).unwrap();
        assert_eq!(outcome.state.write_pos, wal.write_pos());
        assert_eq!(outcome.state.pending_bytes, wal.pending_bytes());
        assert_eq!(outcome.state.last_sequence, 5);
        assert_eq!(outcome.mutations.len(), 5);
        assert!(!outcome.mutation_decode_failed);
        for (i, (seq, mutation)) in outcome.mutations.iter().enumerate() {
            assert_eq!(*seq, i as u64 + 1);
            assert_eq!(*mutation, sample_mutation(i as u64));
        }
    }

    #[test]
    fn committed_records_are_not_replayed() {
        let (mut wal, mut file) = ring(4096);
        for id in 0..4 {
            let payload = sample_mutation(id).encode().unwrap();
            wal.append(&mut file, &payload).unwrap();
        }
        let outcome = wal.scan(&mut file, 0, 2).unwrap();
        assert_eq!(outcome.mutations.len(), 2);
        assert_eq!(outcome.mutations[0].0, 3);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let (mut wal, mut file) = ring(4096);
        let err = wal.append(&mut file, &[]).expect_err("empty payload");
        assert!(matches!(err, StoreError::Encoding { .. }));
    }

    #[test]
    fn entry_that_fills_ring_exactly_is_rejected() {
        let (mut wal, mut file) = ring(256);
        // 48-byte header + 208-byte payload == ring size; the sentinel no
        // longer fits.
        let payload = vec![7u8; 208];
        let err = wal.append(&mut file, &payload).expect_err("no sentinel room");
        assert!(matches!(err, StoreError::CapacityExceeded { .. }));
    }

    #[test]
    fn padding_record_covers_tail_before_wrap() {
        let (mut wal, mut file) = ring(512);
        // First record leaves a tail bigger than one header but smaller than
        // the next entry.
        let first = vec![1u8; 300]; // entry 348, remaining 164
        wal.append(&mut file, &first).unwrap();
        let wrote_at = wal.write_pos();
        assert_eq!(wrote_at, 348);

        let second = vec![2u8; 200]; // entry 248 > 164 remaining
        let err = wal.append(&mut file, &second).expect_err("would overflow pending");
        assert!(matches!(err, StoreError::CapacityExceeded { .. }));

        // After a checkpoint the same append wraps via a padding record.
        wal.checkpoint();
        wal.append(&mut file, &second).unwrap();
        assert_eq!(wal.counters.wrap_count, 1);
        assert_eq!(wal.write_pos(), 248);

        let outcome = wal.scan(&mut file, wal.committed_seq(), wal.committed_seq()).unwrap();
        assert_eq!(outcome.state.write_pos, 248);
        assert_eq!(outcome.state.last_sequence, 3); // padding consumed seq 2
        assert_eq!(outcome.mutations.len(), 0); // raw payloads fail decode...
    }

    #[test]
    fn exactly_sentinel_sized_tail_zero_fills_without_padding() {
        let (mut wal, mut file) = ring(512);
        // Entry of 416 leaves exactly 48 bytes of tail; a second append after
        // checkpoint must wrap without consuming a padding sequence.
        let first = vec![3u8; 416 - RECORD_HEADER_SIZE];
        wal.append(&mut file, &first).unwrap();
        assert_eq!(wal.size() - wal.write_pos(), 96);

        wal.checkpoint();
        let second = vec![4u8; 100]; // entry 148 > 96 remaining, 96 > 48 -> padding
        wal.append(&mut file, &second).unwrap();
        assert_eq!(wal.counters.wrap_count, 1);

        // Now engineer the exact-48 case from a fresh ring.
        let (mut wal, mut file) = ring(512);
        let first = vec![5u8; 464 - RECORD_HEADER_SIZE]; // entry 464, tail 48
        let seq1 = wal.append(&mut file, &first).unwrap();
        assert_eq!(wal.size() - wal.write_pos(), 48);
        wal.checkpoint();
        let second = vec![6u8; 32]; // entry 80 > 48
        let seq2 = wal.append(&mut file, &second).unwrap();
        // No padding sequence was consumed between the two data records.
        assert_eq!(seq2, seq1 + 1);
        assert_eq!(wal.counters.wrap_count, 1);
    }

    #[test]
    fn scan_continues_across_zero_filled_tail() {
        let (mut wal, mut file) = ring(512);
        let first = vec![5u8; 464 - RECORD_HEADER_SIZE]; // tail of exactly 48
        wal.append(&mut file, &first).unwrap();
        let second = sample_mutation(1).encode().unwrap();
        // Keep both records pending so the scan must cross the tail.
        let err = wal.append(&mut file, &second).expect_err("pending budget");
        assert!(matches!(err, StoreError::CapacityExceeded { .. }));

        // Commit the first record only, then append the second pending one.
        wal.checkpoint();
        wal.append(&mut file, &second).unwrap();
        let outcome = wal
            .scan(&mut file, wal.committed_seq(), wal.committed_seq())
            .unwrap();
        assert_eq!(outcome.mutations.len(), 1);
        assert_eq!(outcome.state.write_pos, wal.write_pos());
    }

    #[test]
    fn scan_stops_cleanly_at_corrupted_record() {
        let (mut wal, mut file) = ring(4096);
        let mut offsets = Vec::new();
        for id in 0..3 {
            offsets.push(wal.write_pos());
            let payload = sample_mutation(id).encode().unwrap();
            wal.append(&mut file, &payload).unwrap();
        }
        // Flip one payload byte of the second record.
        let victim = RING_OFFSET + offsets[1] + WAL_RECORD_HEADER_SIZE;
        let mut byte = [0u8; 1];
        pfile::read_exact_at(&mut file, victim, &mut byte).unwrap();
        byte[0] ^= 0xFF;
        pfile::write_all_at(&mut file, victim, &byte).unwrap();

        let outcome = wal.scan(&mut file, 0, 0).unwrap();
        // The scan ends at the corrupt record; only the first survives.
        assert_eq!(outcome.mutations.len(), 1);
        assert_eq!(outcome.state.write_pos, offsets[1]);
        assert_eq!(outcome.state.last_sequence, 1);
    }

    #[test]
    fn stale_sequence_terminates_scan() {
        let (mut wal, mut file) = ring(4096);
        let payload = sample_mutation(0).encode().unwrap();
        wal.append(&mut file, &payload).unwrap();
        // A scan whose floor is already past the record sees a stale ring.
        let outcome = wal.scan(&mut file, 5, 5).unwrap();
        assert_eq!(outcome.mutations.len(), 0);
        assert_eq!(outcome.state.write_pos, 0);
        assert_eq!(outcome.state.last_sequence, 5);
    }

    #[test]
    fn randomized_fill_matches_scan() {
        fastrand::seed(0x5EED);
        for round in 0..25 {
            let size = 512 + fastrand::u64(..2048);
            let (mut wal, mut file) = ring(size);
            let mut appended = 0u64;
            for _ in 0..200 {
                let len = 1 + fastrand::usize(..96);
                let payload: Vec<u8> = (0..len).map(|_| fastrand::u8(..)).collect();
                match wal.append(&mut file, &payload) {
                    Ok(_) => appended += 1,
                    // A full ring checkpoints and keeps going, forcing wraps.
                    Err(StoreError::CapacityExceeded { .. }) => wal.checkpoint(),
                    Err(err) => panic!("unexpected append error: {err}"),
                }
            }
            assert!(appended > 0, "round {round} appended nothing");
            assert!(wal.counters.wrap_count > 0, "round {round} never wrapped");

            // The scan must reconstruct exactly the writer's state, padding
            // records and wrapped tails included.
            let outcome = wal
                .scan(&mut file, wal.committed_seq(), wal.committed_seq())
                .unwrap();
            assert_eq!(outcome.state.write_pos, wal.write_pos(), "round {round}");
            assert_eq!(
                outcome.state.pending_bytes,
                wal.pending_bytes(),
                "round {round}"
            );
            assert_eq!(
                outcome.state.last_sequence,
                wal.last_sequence(),
                "round {round}"
            );
        }
    }

    #[test]
    fn probe_terminal_detects_sentinel_and_data() {
        let (mut wal, mut file) = ring(4096);
        let payload = sample_mutation(0).encode().unwrap();
        wal.append(&mut file, &payload).unwrap();
        assert!(wal.probe_terminal(&mut file, wal.write_pos()).unwrap());
        assert!(!wal.probe_terminal(&mut file, 0).unwrap());
    }
}
