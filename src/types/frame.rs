//! Frame metadata, put options, timeline queries, and store statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::types::common::{FrameId, FrameRole, FrameStatus, PayloadEncoding};

/// Frame metadata — the per-content-unit record serialized into the TOC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    pub id: FrameId,
    /// Creation timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Optional temporal anchor distinct from the ingestion timestamp.
    pub anchor_ts: Option<i64>,
    pub kind: Option<String>,
    pub track: Option<String>,
    pub payload_offset: u64,
    pub payload_length: u64,
    /// SHA-256 of the canonical (uncompressed) content.
    pub checksum: Checksum,
    pub canonical_encoding: PayloadEncoding,
    /// Canonical byte length; present exactly when the encoding is not plain.
    pub canonical_length: Option<u64>,
    /// SHA-256 of the on-disk bytes; present exactly when the payload is
    /// non-empty.
    pub stored_checksum: Option<Checksum>,
    pub uri: Option<String>,
    pub title: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub search_text: Option<String>,
    pub tags: Vec<(String, String)>,
    pub labels: Vec<String>,
    pub content_dates: Vec<String>,
    pub role: FrameRole,
    pub parent_id: Option<FrameId>,
    pub chunk_index: Option<u32>,
    pub chunk_count: Option<u32>,
    pub status: FrameStatus,
    pub supersedes: Option<FrameId>,
    pub superseded_by: Option<FrameId>,
}

impl FrameMeta {
    /// End offset of the payload range in the data region.
    #[must_use]
    pub fn payload_end(&self) -> u64 {
        self.payload_offset.saturating_add(self.payload_length)
    }

    /// Canonical content length regardless of encoding.
    #[must_use]
    pub fn logical_length(&self) -> u64 {
        self.canonical_length.unwrap_or(self.payload_length)
    }
}

/// Caller-settable frame attributes carried inside a PutFrame WAL record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetaSubset {
    pub kind: Option<String>,
    pub track: Option<String>,
    pub anchor_ts: Option<i64>,
    pub uri: Option<String>,
    pub title: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub search_text: Option<String>,
    pub tags: Vec<(String, String)>,
    pub labels: Vec<String>,
    pub content_dates: Vec<String>,
    pub role: FrameRole,
    pub parent_id: Option<FrameId>,
    pub chunk_index: Option<u32>,
    pub chunk_count: Option<u32>,
}

/// Options accepted by `put` and `put_batch`.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Creation timestamp override in milliseconds; defaults to the wall
    /// clock at append time.
    pub timestamp: Option<i64>,
    /// Requested payload compression; defaults to plain.
    pub encoding: PayloadEncoding,
    pub kind: Option<String>,
    pub track: Option<String>,
    pub anchor_ts: Option<i64>,
    pub uri: Option<String>,
    pub title: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub search_text: Option<String>,
    pub tags: Vec<(String, String)>,
    pub labels: Vec<String>,
    pub content_dates: Vec<String>,
    pub role: FrameRole,
    pub parent_id: Option<FrameId>,
    pub chunk_index: Option<u32>,
    pub chunk_count: Option<u32>,
}

impl PutOptions {
    pub(crate) fn into_subset(self) -> FrameMetaSubset {
        FrameMetaSubset {
            kind: self.kind,
            track: self.track,
            anchor_ts: self.anchor_ts,
            uri: self.uri,
            title: self.title,
            metadata: self.metadata,
            search_text: self.search_text,
            tags: self.tags,
            labels: self.labels,
            content_dates: self.content_dates,
            role: self.role,
            parent_id: self.parent_id,
            chunk_index: self.chunk_index,
            chunk_count: self.chunk_count,
        }
    }
}

/// Ordering of timeline results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineOrder {
    #[default]
    Ascending,
    Descending,
}

/// Timeline query over committed frame metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineQuery {
    pub limit: Option<u64>,
    pub order: TimelineOrder,
    /// Inclusive lower timestamp bound in milliseconds.
    pub after: Option<i64>,
    /// Inclusive upper timestamp bound in milliseconds.
    pub before: Option<i64>,
    pub include_deleted: bool,
    pub include_superseded: bool,
}

impl TimelineQuery {
    /// Start a fluent builder for timeline queries.
    #[must_use]
    pub fn builder() -> TimelineQueryBuilder {
        TimelineQueryBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct TimelineQueryBuilder {
    inner: TimelineQuery,
}

impl TimelineQueryBuilder {
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.inner.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn order(mut self, order: TimelineOrder) -> Self {
        self.inner.order = order;
        self
    }

    #[must_use]
    pub fn after(mut self, ts: i64) -> Self {
        self.inner.after = Some(ts);
        self
    }

    #[must_use]
    pub fn before(mut self, ts: i64) -> Self {
        self.inner.before = Some(ts);
        self
    }

    #[must_use]
    pub fn include_deleted(mut self, include: bool) -> Self {
        self.inner.include_deleted = include;
        self
    }

    #[must_use]
    pub fn include_superseded(mut self, include: bool) -> Self {
        self.inner.include_superseded = include;
        self
    }

    #[must_use]
    pub fn build(self) -> TimelineQuery {
        self.inner
    }
}

/// Public-facing statistics summarising a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    /// Committed frame count.
    pub frame_count: u64,
    /// Frames accepted into the WAL but not yet committed.
    pub pending_frames: u64,
    /// Commit generation of the current footer.
    pub generation: u64,
    #[serde(default)]
    pub active_frame_count: u64,
    /// On-disk payload bytes across committed frames.
    #[serde(default)]
    pub payload_bytes: u64,
    /// Canonical (uncompressed) bytes across committed frames.
    #[serde(default)]
    pub logical_bytes: u64,
    #[serde(default)]
    pub wal_bytes: u64,
    #[serde(default)]
    pub file_size_bytes: u64,
}
