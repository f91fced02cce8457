//! Read paths: statistics, frame metadata, content, previews, and the
//! timeline.
//!
//! Committed reads never observe pending mutations; the
//! `*_including_pending` entry points overlay the pending view explicitly.

use crate::checksum::Checksum;
use crate::compress;
use crate::error::{Result, StoreError};
use crate::io::pfile;
use crate::io::wal::WalStats;
use crate::store::lifecycle::Store;
use crate::types::{
    FrameId, FrameMeta, FrameStatus, Stats, TimelineOrder, TimelineQuery,
};

impl Store {
    /// Store-level statistics over the committed state.
    pub fn stats(&self) -> Result<Stats> {
        self.ensure_open()?;
        let payload_bytes = self.toc.frames.iter().map(|f| f.payload_length).sum();
        let logical_bytes = self.toc.frames.iter().map(FrameMeta::logical_length).sum();
        let active_frame_count = self
            .toc
            .frames
            .iter()
            .filter(|f| f.status == FrameStatus::Active)
            .count() as u64;
        Ok(Stats {
            frame_count: self.toc.frames.len() as u64,
            pending_frames: self.pending.new_frames.len() as u64,
            generation: self.file_generation,
            active_frame_count,
            payload_bytes,
            logical_bytes,
            wal_bytes: self.wal_size,
            file_size_bytes: pfile::file_len(&self.file)?,
        })
    }

    /// WAL observability counters and positions.
    pub fn wal_stats(&self) -> Result<WalStats> {
        self.ensure_open()?;
        Ok(self.wal.stats())
    }

    /// Committed frame metadata.
    pub fn frame_meta(&self, frame_id: FrameId) -> Result<FrameMeta> {
        self.ensure_open()?;
        self.toc
            .frames
            .get(usize::try_from(frame_id).map_err(|_| StoreError::FrameNotFound { frame_id })?)
            .cloned()
            .ok_or(StoreError::FrameNotFound { frame_id })
    }

    /// Frame metadata with pending WAL mutations overlaid.
    pub fn frame_meta_including_pending(&self, frame_id: FrameId) -> Result<FrameMeta> {
        self.ensure_open()?;
        self.meta_view(frame_id)
    }

    /// Batch variant of `frame_meta_including_pending`.
    pub fn frame_metas_including_pending(&self, frame_ids: &[FrameId]) -> Result<Vec<FrameMeta>> {
        self.ensure_open()?;
        frame_ids.iter().map(|id| self.meta_view(*id)).collect()
    }

    /// Canonical content bytes of a committed frame, decompressing stored
    /// bytes when needed.
    pub fn frame_content(&mut self, frame_id: FrameId) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let meta = self.frame_meta(frame_id)?;
        self.canonical_bytes(&meta)
    }

    /// Canonical content of a frame whose put may still be pending.
    pub fn frame_content_including_pending(&mut self, frame_id: FrameId) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let meta = self.meta_view(frame_id)?;
        self.canonical_bytes(&meta)
    }

    /// Canonical bytes truncated to at most `max_bytes`.
    pub fn frame_preview(&mut self, frame_id: FrameId, max_bytes: usize) -> Result<Vec<u8>> {
        let mut bytes = self.frame_content(frame_id)?;
        bytes.truncate(max_bytes);
        Ok(bytes)
    }

    /// Ordered committed frame metas matching the query.
    pub fn timeline(&self, query: TimelineQuery) -> Result<Vec<FrameMeta>> {
        self.ensure_open()?;
        let mut entries: Vec<FrameMeta> = self
            .toc
            .frames
            .iter()
            .filter(|frame| query.include_deleted || frame.status == FrameStatus::Active)
            .filter(|frame| query.include_superseded || frame.superseded_by.is_none())
            .filter(|frame| query.after.is_none_or(|after| frame.timestamp >= after))
            .filter(|frame| query.before.is_none_or(|before| frame.timestamp <= before))
            .cloned()
            .collect();
        entries.sort_by_key(|frame| (frame.timestamp, frame.id));
        if query.order == TimelineOrder::Descending {
            entries.reverse();
        }
        if let Some(limit) = query.limit {
            entries.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(entries)
    }

    /// Newest active frame with the given URI, falling back to any status.
    pub fn frame_by_uri(&self, uri: &str) -> Result<FrameMeta> {
        self.ensure_open()?;
        self.toc
            .frames
            .iter()
            .rev()
            .find(|frame| frame.uri.as_deref() == Some(uri) && frame.status == FrameStatus::Active)
            .or_else(|| {
                self.toc
                    .frames
                    .iter()
                    .rev()
                    .find(|frame| frame.uri.as_deref() == Some(uri))
            })
            .cloned()
            .ok_or_else(|| StoreError::FrameNotFoundByUri {
                uri: uri.to_string(),
            })
    }

    /// Newest active frame whose canonical checksum matches; used by
    /// ingestion layers for dedup.
    #[must_use]
    pub fn find_frame_by_hash(&self, checksum: &Checksum) -> Option<&FrameMeta> {
        self.toc
            .frames
            .iter()
            .rev()
            .find(|frame| frame.status == FrameStatus::Active && frame.checksum == *checksum)
    }

    /// Replayed-but-uncommitted embeddings, for the external vector layer to
    /// drain before the next commit.
    pub fn pending_embeddings(&self) -> Result<&[(FrameId, Vec<f32>)]> {
        self.ensure_open()?;
        Ok(&self.pending.embeddings)
    }

    /// Frame meta lookup across the committed table and the pending overlay.
    pub(crate) fn meta_view(&self, frame_id: FrameId) -> Result<FrameMeta> {
        let committed = self.toc.frames.len() as u64;
        let mut meta = if frame_id < committed {
            self.toc.frames[frame_id as usize].clone()
        } else {
            let index = usize::try_from(frame_id - committed)
                .map_err(|_| StoreError::FrameNotFound { frame_id })?;
            self.pending
                .new_frames
                .get(index)
                .cloned()
                .ok_or(StoreError::FrameNotFound { frame_id })?
        };
        self.pending.patch(&mut meta);
        Ok(meta)
    }

    pub(crate) fn canonical_bytes(&mut self, meta: &FrameMeta) -> Result<Vec<u8>> {
        let stored = self.read_payload(meta)?;
        compress::decode_payload(&stored, meta.canonical_encoding, meta.canonical_length)
    }

    fn read_payload(&mut self, meta: &FrameMeta) -> Result<Vec<u8>> {
        if meta.payload_length == 0 {
            return Ok(Vec::new());
        }
        if meta.payload_offset < self.data_start() {
            return Err(StoreError::InvalidFrame {
                frame_id: meta.id,
                reason: "payload overlaps the wal region",
            });
        }
        let end = meta
            .payload_offset
            .checked_add(meta.payload_length)
            .ok_or(StoreError::InvalidFrame {
                frame_id: meta.id,
                reason: "payload range overflow",
            })?;
        if end > pfile::file_len(&self.file)? {
            return Err(StoreError::InvalidFrame {
                frame_id: meta.id,
                reason: "payload extends past file length",
            });
        }
        let mut buf = vec![0u8; meta.payload_length as usize];
        pfile::read_exact_at(&mut self.file, meta.payload_offset, &mut buf)?;
        Ok(buf)
    }
}
