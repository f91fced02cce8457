//! WAL-backed mutations: put, delete, supersede, embeddings, and index
//! staging.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::checksum::digest;
use crate::compress;
use crate::error::{Result, StoreError};
use crate::io::pfile;
use crate::io::wal::{Mutation, PutFrameRecord};
use crate::store::lifecycle::Store;
use crate::store::StagedIndex;
use crate::types::{
    FrameId, LexIndexManifest, PayloadEncoding, PutOptions, SegmentCatalogEntry, SegmentKind,
    VecIndexManifest, VecMetric,
};

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl Store {
    /// Stores one content frame and returns its dense id. The frame becomes
    /// durable and visible to committed readers at the next commit.
    pub fn put(&mut self, content: &[u8], options: PutOptions) -> Result<FrameId> {
        self.ensure_writable()?;
        let frame_id = self.total_frame_count();
        let timestamp = options.timestamp.unwrap_or_else(now_millis);
        let encoding = options.encoding;

        let stored = compress::encode_payload(content, encoding)?;
        let checksum = digest(content);
        let stored_checksum = if stored.is_empty() {
            None
        } else {
            Some(digest(&stored))
        };
        let canonical_length = match encoding {
            PayloadEncoding::Plain => None,
            _ => Some(content.len() as u64),
        };

        // Payload bytes land at end-of-file, beyond the committed footer.
        let payload_offset = if stored.is_empty() {
            0
        } else {
            let offset = pfile::file_len(&self.file)?;
            pfile::write_all_at(&mut self.file, offset, &stored)?;
            offset
        };

        let record = PutFrameRecord {
            frame_id,
            timestamp,
            subset: options.into_subset(),
            payload_offset,
            payload_length: stored.len() as u64,
            canonical_encoding: encoding,
            canonical_length,
            checksum,
            stored_checksum,
        };
        let mutation = Mutation::PutFrame(record);
        let payload = mutation.encode()?;
        let sequence = self.wal.append(&mut self.file, &payload)?;
        self.pending.absorb(sequence, mutation);
        self.maybe_auto_commit()?;
        Ok(frame_id)
    }

    /// Stores a batch of frames, returning their ids in input order.
    pub fn put_batch<I>(&mut self, items: I) -> Result<Vec<FrameId>>
    where
        I: IntoIterator<Item = (Vec<u8>, PutOptions)>,
    {
        let mut ids = Vec::new();
        for (content, options) in items {
            ids.push(self.put(&content, options)?);
        }
        Ok(ids)
    }

    /// Stores a frame together with its embedding vector. The embedding is
    /// queued for the external vector layer and drained at commit.
    pub fn put_with_embedding(
        &mut self,
        content: &[u8],
        options: PutOptions,
        embedding: Vec<f32>,
    ) -> Result<FrameId> {
        self.ensure_writable()?;
        let dimension = u32::try_from(embedding.len()).map_err(|_| StoreError::Encoding {
            reason: "embedding dimension exceeds u32".into(),
        })?;
        let expected = self
            .pending
            .embedding_dim
            .or_else(|| self.toc.indexes.vec.as_ref().map(|m| m.dimension));
        if let Some(expected) = expected {
            if expected != dimension {
                return Err(StoreError::EmbeddingDimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
        }

        let frame_id = self.put(content, options)?;
        let mutation = Mutation::PutEmbedding {
            frame_id,
            values: embedding,
        };
        let payload = mutation.encode()?;
        let sequence = self.wal.append(&mut self.file, &payload)?;
        self.pending.absorb(sequence, mutation);
        self.maybe_auto_commit()?;
        Ok(frame_id)
    }

    /// Marks a frame deleted. The status flips at the next commit; deleting
    /// a frame whose put is still pending collapses at commit.
    pub fn delete(&mut self, frame_id: FrameId) -> Result<()> {
        self.ensure_writable()?;
        if frame_id >= self.total_frame_count() {
            return Err(StoreError::FrameNotFound { frame_id });
        }
        let mutation = Mutation::DeleteFrame { frame_id };
        let payload = mutation.encode()?;
        let sequence = self.wal.append(&mut self.file, &payload)?;
        self.pending.absorb(sequence, mutation);
        self.maybe_auto_commit()?;
        Ok(())
    }

    /// Records that `new_id` logically replaces `old_id`. Both frames stay
    /// addressable; the edge set must remain acyclic and one-to-one.
    pub fn supersede(&mut self, old_id: FrameId, new_id: FrameId) -> Result<()> {
        self.ensure_writable()?;
        if old_id == new_id {
            return Err(StoreError::InvalidFrame {
                frame_id: old_id,
                reason: "a frame cannot supersede itself",
            });
        }
        let total = self.total_frame_count();
        for id in [old_id, new_id] {
            if id >= total {
                return Err(StoreError::FrameNotFound { frame_id: id });
            }
        }

        let old_meta = self.meta_view(old_id)?;
        if old_meta.superseded_by.is_some() {
            return Err(StoreError::InvalidFrame {
                frame_id: old_id,
                reason: "frame is already superseded",
            });
        }
        let new_meta = self.meta_view(new_id)?;
        if new_meta.supersedes.is_some() {
            return Err(StoreError::InvalidFrame {
                frame_id: new_id,
                reason: "frame already supersedes another frame",
            });
        }

        // Walk the supersedes chain from `old_id`; reaching `new_id` means
        // the new edge would close a cycle.
        let mut visited = std::collections::BTreeSet::new();
        let mut cursor = old_meta.supersedes;
        let mut hops: u64 = 0;
        while let Some(id) = cursor {
            if id == new_id {
                return Err(StoreError::SupersedeCycle { old_id, new_id });
            }
            hops += 1;
            if hops > total || !visited.insert(id) {
                return Err(StoreError::SupersedeCycle { old_id, new_id });
            }
            cursor = self.meta_view(id)?.supersedes;
        }

        let mutation = Mutation::SupersedeFrame { old_id, new_id };
        let payload = mutation.encode()?;
        let sequence = self.wal.append(&mut self.file, &payload)?;
        self.pending.absorb(sequence, mutation);
        self.maybe_auto_commit()?;
        Ok(())
    }

    /// Stages lexical index segment bytes for the next commit. Staging bytes
    /// identical to the committed segment is a no-op.
    pub fn stage_lex_index(
        &mut self,
        bytes: &[u8],
        doc_count: u64,
        format_version: u32,
    ) -> Result<()> {
        self.ensure_writable()?;
        let checksum = digest(bytes);
        if let Some(committed) = &self.toc.indexes.lex {
            if committed.checksum == checksum && committed.bytes_length == bytes.len() as u64 {
                tracing::debug!("staged lex index identical to committed; skipping");
                self.staged_lex = None;
                return Ok(());
            }
        }
        let offset = pfile::file_len(&self.file)?;
        pfile::write_all_at(&mut self.file, offset, bytes)?;
        let entry = SegmentCatalogEntry {
            segment_id: self.next_segment_id(),
            bytes_offset: offset,
            bytes_length: bytes.len() as u64,
            checksum,
            compression: PayloadEncoding::Plain,
            kind: SegmentKind::Lex,
        };
        self.staged_lex = Some(StagedIndex {
            lex: Some(LexIndexManifest {
                doc_count,
                bytes_offset: offset,
                bytes_length: bytes.len() as u64,
                checksum,
                format_version,
            }),
            vec: None,
            entry,
        });
        Ok(())
    }

    /// Stages vector index segment bytes for the next commit. Staging bytes
    /// identical to the committed segment is a no-op.
    pub fn stage_vec_index(
        &mut self,
        bytes: &[u8],
        vector_count: u64,
        dimension: u32,
        metric: VecMetric,
        format_version: u32,
    ) -> Result<()> {
        self.ensure_writable()?;
        let checksum = digest(bytes);
        if let Some(committed) = &self.toc.indexes.vec {
            if committed.checksum == checksum && committed.bytes_length == bytes.len() as u64 {
                tracing::debug!("staged vec index identical to committed; skipping");
                self.staged_vec = None;
                return Ok(());
            }
        }
        let offset = pfile::file_len(&self.file)?;
        pfile::write_all_at(&mut self.file, offset, bytes)?;
        let entry = SegmentCatalogEntry {
            segment_id: self.next_segment_id(),
            bytes_offset: offset,
            bytes_length: bytes.len() as u64,
            checksum,
            compression: PayloadEncoding::Plain,
            kind: SegmentKind::Vec,
        };
        self.staged_vec = Some(StagedIndex {
            lex: None,
            vec: Some(VecIndexManifest {
                vector_count,
                dimension,
                bytes_offset: offset,
                bytes_length: bytes.len() as u64,
                checksum,
                format_version,
                metric,
            }),
            entry,
        });
        Ok(())
    }

    fn next_segment_id(&self) -> u64 {
        let committed = self
            .toc
            .segment_catalog
            .iter()
            .map(|entry| entry.segment_id + 1)
            .max()
            .unwrap_or(0);
        let staged = self
            .staged_lex
            .iter()
            .chain(self.staged_vec.iter())
            .map(|staged| staged.entry.segment_id + 1)
            .max()
            .unwrap_or(0);
        committed.max(staged)
    }

    /// Internal commit triggered by WAL pressure.
    fn maybe_auto_commit(&mut self) -> Result<()> {
        let Some(pct) = self.auto_commit_threshold_pct else {
            return Ok(());
        };
        let threshold = self.wal.size() / 100 * u64::from(pct);
        if self.wal.pending_bytes() > threshold {
            tracing::debug!(
                pending = self.wal.pending_bytes(),
                threshold,
                "wal pressure triggered internal commit"
            );
            self.commit()?;
            self.wal.counters.auto_commit_count += 1;
        }
        Ok(())
    }
}
