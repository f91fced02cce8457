//! The store engine: lifecycle, recovery, mutations, commit, and reads.

mod commit;
mod lifecycle;
mod maintenance;
mod mutation;
mod read;
mod recovery;

pub use lifecycle::{CreateOptions, OpenOptions, Store};

use std::collections::BTreeSet;

use crate::io::wal::{Mutation, PutFrameRecord};
use crate::types::{
    FrameId, FrameMeta, FrameStatus, LexIndexManifest, SegmentCatalogEntry, VecIndexManifest,
};

/// Uncommitted state reconstructed from the WAL at open time and refreshed
/// after every local mutation. Committed reads never consult it; the
/// `*_including_pending` entry points overlay it on the committed TOC.
#[derive(Debug, Default)]
pub(crate) struct PendingState {
    /// Pending mutations in sequence order (sequence > committed watermark).
    pub mutations: Vec<(u64, Mutation)>,
    /// Metas of frames whose PutFrame records are pending; ids continue the
    /// committed table densely.
    pub new_frames: Vec<FrameMeta>,
    /// Frames with a pending DeleteFrame record.
    pub deleted: BTreeSet<FrameId>,
    /// Pending supersede edges as (old, new) pairs.
    pub links: Vec<(FrameId, FrameId)>,
    /// Pending embeddings awaiting the external vector layer.
    pub embeddings: Vec<(FrameId, Vec<f32>)>,
    pub embedding_dim: Option<u32>,
}

impl PendingState {
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Folds one replayed or freshly appended mutation into the overlay.
    pub fn absorb(&mut self, sequence: u64, mutation: Mutation) {
        match &mutation {
            Mutation::PutFrame(record) => {
                self.new_frames.push(meta_from_put(record));
            }
            Mutation::DeleteFrame { frame_id } => {
                self.deleted.insert(*frame_id);
            }
            Mutation::SupersedeFrame { old_id, new_id } => {
                self.links.push((*old_id, *new_id));
            }
            Mutation::PutEmbedding { frame_id, values } => {
                self.embedding_dim = Some(values.len() as u32);
                self.embeddings.push((*frame_id, values.clone()));
            }
        }
        self.mutations.push((sequence, mutation));
    }

    /// Applies status and link patches to a base meta copy.
    pub fn patch(&self, meta: &mut FrameMeta) {
        if self.deleted.contains(&meta.id) {
            meta.status = FrameStatus::Deleted;
        }
        for (old, new) in &self.links {
            if *old == meta.id {
                meta.superseded_by = Some(*new);
            }
            if *new == meta.id {
                meta.supersedes = Some(*old);
            }
        }
    }
}

pub(crate) fn meta_from_put(record: &PutFrameRecord) -> FrameMeta {
    let subset = record.subset.clone();
    FrameMeta {
        id: record.frame_id,
        timestamp: record.timestamp,
        anchor_ts: subset.anchor_ts,
        kind: subset.kind,
        track: subset.track,
        payload_offset: record.payload_offset,
        payload_length: record.payload_length,
        checksum: record.checksum,
        canonical_encoding: record.canonical_encoding,
        canonical_length: record.canonical_length,
        stored_checksum: record.stored_checksum,
        uri: subset.uri,
        title: subset.title,
        metadata: subset.metadata,
        search_text: subset.search_text,
        tags: subset.tags,
        labels: subset.labels,
        content_dates: subset.content_dates,
        role: subset.role,
        parent_id: subset.parent_id,
        chunk_index: subset.chunk_index,
        chunk_count: subset.chunk_count,
        status: FrameStatus::Active,
        supersedes: None,
        superseded_by: None,
    }
}

/// Index segment bytes staged for the next commit.
#[derive(Debug, Clone)]
pub(crate) struct StagedIndex {
    pub entry: SegmentCatalogEntry,
    pub lex: Option<LexIndexManifest>,
    pub vec: Option<VecIndexManifest>,
}
