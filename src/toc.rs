//! Versioned, checksummed table-of-contents codec.
//!
//! The serialized TOC is the commit unit the footer points at: frame metas
//! in id order, the segment catalog, the index manifest block, and a
//! trailing self-checksum (SHA-256 of the TOC with its final 32 bytes
//! zeroed). Decoding validates every structural invariant the engine relies
//! on so a corrupt TOC never reaches the store layer.

use std::collections::BTreeMap;

use crate::checksum::{self, CHECKSUM_LEN};
use crate::codec::{Decoder, Encoder};
use crate::constants::TOC_VERSION;
use crate::error::{Result, StoreError};
use crate::types::{
    FrameMeta, FrameMetaSubset, FrameRole, FrameStatus, IndexManifests, LexIndexManifest,
    PayloadEncoding, SegmentCatalogEntry, SegmentKind, Toc, VecIndexManifest, VecMetric,
};

fn invalid(reason: impl Into<std::borrow::Cow<'static, str>>) -> StoreError {
    StoreError::InvalidToc {
        reason: reason.into(),
    }
}

pub(crate) fn encode_subset(enc: &mut Encoder, subset: &FrameMetaSubset) -> Result<()> {
    enc.put_opt_string(subset.kind.as_deref())?;
    enc.put_opt_string(subset.track.as_deref())?;
    enc.put_opt_i64(subset.anchor_ts);
    enc.put_opt_string(subset.uri.as_deref())?;
    enc.put_opt_string(subset.title.as_deref())?;
    enc.put_count(subset.metadata.len())?;
    for (key, value) in &subset.metadata {
        enc.put_string(key)?;
        enc.put_string(value)?;
    }
    enc.put_opt_string(subset.search_text.as_deref())?;
    enc.put_count(subset.tags.len())?;
    for (key, value) in &subset.tags {
        enc.put_string(key)?;
        enc.put_string(value)?;
    }
    enc.put_count(subset.labels.len())?;
    for label in &subset.labels {
        enc.put_string(label)?;
    }
    enc.put_count(subset.content_dates.len())?;
    for date in &subset.content_dates {
        enc.put_string(date)?;
    }
    enc.put_u8(subset.role.as_byte());
    enc.put_opt_u64(subset.parent_id);
    enc.put_opt_u32(subset.chunk_index);
    enc.put_opt_u32(subset.chunk_count);
    Ok(())
}

pub(crate) fn decode_subset(dec: &mut Decoder<'_>) -> Result<FrameMetaSubset> {
    let kind = dec.take_opt_string()?;
    let track = dec.take_opt_string()?;
    let anchor_ts = dec.take_opt_i64()?;
    let uri = dec.take_opt_string()?;
    let title = dec.take_opt_string()?;
    let mut metadata = BTreeMap::new();
    for _ in 0..dec.take_count()? {
        let key = dec.take_string()?;
        let value = dec.take_string()?;
        metadata.insert(key, value);
    }
    let search_text = dec.take_opt_string()?;
    let mut tags = Vec::new();
    for _ in 0..dec.take_count()? {
        let key = dec.take_string()?;
        let value = dec.take_string()?;
        tags.push((key, value));
    }
    let mut labels = Vec::new();
    for _ in 0..dec.take_count()? {
        labels.push(dec.take_string()?);
    }
    let mut content_dates = Vec::new();
    for _ in 0..dec.take_count()? {
        content_dates.push(dec.take_string()?);
    }
    let role =
        FrameRole::from_byte(dec.take_u8()?).ok_or_else(|| invalid("frame role out of range"))?;
    let parent_id = dec.take_opt_u64()?;
    let chunk_index = dec.take_opt_u32()?;
    let chunk_count = dec.take_opt_u32()?;
    Ok(FrameMetaSubset {
        kind,
        track,
        anchor_ts,
        uri,
        title,
        metadata,
        search_text,
        tags,
        labels,
        content_dates,
        role,
        parent_id,
        chunk_index,
        chunk_count,
    })
}

pub(crate) fn encode_frame_meta(enc: &mut Encoder, frame: &FrameMeta) -> Result<()> {
    enc.put_u64(frame.id);
    enc.put_i64(frame.timestamp);
    enc.put_opt_i64(frame.anchor_ts);
    enc.put_opt_string(frame.kind.as_deref())?;
    enc.put_opt_string(frame.track.as_deref())?;
    enc.put_u64(frame.payload_offset);
    enc.put_u64(frame.payload_length);
    enc.put_checksum(&frame.checksum)?;
    enc.put_u8(frame.canonical_encoding.as_byte());
    enc.put_opt_u64(frame.canonical_length);
    enc.put_opt_checksum(frame.stored_checksum.as_ref())?;
    enc.put_opt_string(frame.uri.as_deref())?;
    enc.put_opt_string(frame.title.as_deref())?;
    enc.put_count(frame.metadata.len())?;
    for (key, value) in &frame.metadata {
        enc.put_string(key)?;
        enc.put_string(value)?;
    }
    enc.put_opt_string(frame.search_text.as_deref())?;
    enc.put_count(frame.tags.len())?;
    for (key, value) in &frame.tags {
        enc.put_string(key)?;
        enc.put_string(value)?;
    }
    enc.put_count(frame.labels.len())?;
    for label in &frame.labels {
        enc.put_string(label)?;
    }
    enc.put_count(frame.content_dates.len())?;
    for date in &frame.content_dates {
        enc.put_string(date)?;
    }
    enc.put_u8(frame.role.as_byte());
    enc.put_opt_u64(frame.parent_id);
    enc.put_opt_u32(frame.chunk_index);
    enc.put_opt_u32(frame.chunk_count);
    enc.put_u8(frame.status.as_byte());
    enc.put_opt_u64(frame.supersedes);
    enc.put_opt_u64(frame.superseded_by);
    Ok(())
}

pub(crate) fn decode_frame_meta(dec: &mut Decoder<'_>) -> Result<FrameMeta> {
    let id = dec.take_u64()?;
    let timestamp = dec.take_i64()?;
    let anchor_ts = dec.take_opt_i64()?;
    let kind = dec.take_opt_string()?;
    let track = dec.take_opt_string()?;
    let payload_offset = dec.take_u64()?;
    let payload_length = dec.take_u64()?;
    let checksum = dec.take_checksum()?;
    let canonical_encoding = PayloadEncoding::from_byte(dec.take_u8()?)
        .ok_or_else(|| invalid("canonical encoding out of range"))?;
    let canonical_length = dec.take_opt_u64()?;
    let stored_checksum = dec.take_opt_checksum()?;
    let uri = dec.take_opt_string()?;
    let title = dec.take_opt_string()?;
    let mut metadata = BTreeMap::new();
    for _ in 0..dec.take_count()? {
        let key = dec.take_string()?;
        let value = dec.take_string()?;
        metadata.insert(key, value);
    }
    let search_text = dec.take_opt_string()?;
    let mut tags = Vec::new();
    for _ in 0..dec.take_count()? {
        let key = dec.take_string()?;
        let value = dec.take_string()?;
        tags.push((key, value));
    }
    let mut labels = Vec::new();
    for _ in 0..dec.take_count()? {
        labels.push(dec.take_string()?);
    }
    let mut content_dates = Vec::new();
    for _ in 0..dec.take_count()? {
        content_dates.push(dec.take_string()?);
    }
    let role =
        FrameRole::from_byte(dec.take_u8()?).ok_or_else(|| invalid("frame role out of range"))?;
    let parent_id = dec.take_opt_u64()?;
    let chunk_index = dec.take_opt_u32()?;
    let chunk_count = dec.take_opt_u32()?;
    let status = FrameStatus::from_byte(dec.take_u8()?)
        .ok_or_else(|| invalid("frame status out of range"))?;
    let supersedes = dec.take_opt_u64()?;
    let superseded_by = dec.take_opt_u64()?;
    Ok(FrameMeta {
        id,
        timestamp,
        anchor_ts,
        kind,
        track,
        payload_offset,
        payload_length,
        checksum,
        canonical_encoding,
        canonical_length,
        stored_checksum,
        uri,
        title,
        metadata,
        search_text,
        tags,
        labels,
        content_dates,
        role,
        parent_id,
        chunk_index,
        chunk_count,
        status,
        supersedes,
        superseded_by,
    })
}

fn encode_catalog_entry(enc: &mut Encoder, entry: &SegmentCatalogEntry) -> Result<()> {
    enc.put_u64(entry.segment_id);
    enc.put_u64(entry.bytes_offset);
    enc.put_u64(entry.bytes_length);
    enc.put_checksum(&entry.checksum)?;
    enc.put_u8(entry.compression.as_byte());
    enc.put_u8(entry.kind.as_byte());
    Ok(())
}

fn decode_catalog_entry(dec: &mut Decoder<'_>) -> Result<SegmentCatalogEntry> {
    let segment_id = dec.take_u64()?;
    let bytes_offset = dec.take_u64()?;
    let bytes_length = dec.take_u64()?;
    let checksum = dec.take_checksum()?;
    let compression = PayloadEncoding::from_byte(dec.take_u8()?)
        .ok_or_else(|| invalid("segment compression out of range"))?;
    let kind =
        SegmentKind::from_byte(dec.take_u8()?).ok_or_else(|| invalid("segment kind out of range"))?;
    Ok(SegmentCatalogEntry {
        segment_id,
        bytes_offset,
        bytes_length,
        checksum,
        compression,
        kind,
    })
}

impl Toc {
    /// Serialises the TOC and appends its trailing self-checksum.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::with_capacity(64 + self.frames.len() * 160);
        enc.put_u64(self.toc_version);
        enc.put_u32(u32::try_from(self.frames.len()).map_err(|_| {
            StoreError::Encoding {
                reason: "frame count exceeds u32".into(),
            }
        })?);
        // Reserved structured-memory track tag; always zero in v1.
        enc.put_u8(0);
        for frame in &self.frames {
            encode_frame_meta(&mut enc, frame)?;
        }
        enc.put_count(self.segment_catalog.len())?;
        for entry in &self.segment_catalog {
            encode_catalog_entry(&mut enc, entry)?;
        }
        match &self.indexes.lex {
            Some(lex) => {
                enc.put_u8(1);
                enc.put_u64(lex.doc_count);
                enc.put_u64(lex.bytes_offset);
                enc.put_u64(lex.bytes_length);
                enc.put_checksum(&lex.checksum)?;
                enc.put_u32(lex.format_version);
            }
            None => enc.put_u8(0),
        }
        match &self.indexes.vec {
            Some(vec) => {
                enc.put_u8(1);
                enc.put_u64(vec.vector_count);
                enc.put_u32(vec.dimension);
                enc.put_u64(vec.bytes_offset);
                enc.put_u64(vec.bytes_length);
                enc.put_checksum(&vec.checksum)?;
                enc.put_u32(vec.format_version);
                enc.put_u8(vec.metric.as_byte());
            }
            None => enc.put_u8(0),
        }
        Ok(enc.finish_checksummed())
    }

    /// Deserialises and structurally validates a TOC, including its trailing
    /// self-checksum.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CHECKSUM_LEN {
            return Err(invalid("toc shorter than its checksum"));
        }
        let (body, stored_tail) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        let mut hasher = checksum::Hasher::new();
        hasher.update(body);
        hasher.update(&[0u8; CHECKSUM_LEN]);
        if hasher.finalize() != stored_tail {
            return Err(StoreError::ChecksumMismatch { context: "toc" });
        }

        let mut dec = Decoder::new(body);
        let toc_version = dec.take_u64()?;
        if toc_version != TOC_VERSION {
            return Err(invalid(format!("unsupported toc version {toc_version}")));
        }
        let frame_count = dec.take_u32()? as usize;
        let memories_track = dec.take_u8()?;
        if memories_track != 0 {
            return Err(invalid("reserved memories track tag must be zero in v1"));
        }
        let mut frames = Vec::with_capacity(frame_count.min(1 << 16));
        for _ in 0..frame_count {
            frames.push(decode_frame_meta(&mut dec)?);
        }
        let catalog_count = dec.take_count()?;
        let mut segment_catalog = Vec::with_capacity(catalog_count.min(1 << 10));
        for _ in 0..catalog_count {
            segment_catalog.push(decode_catalog_entry(&mut dec)?);
        }
        let lex = if dec.take_u8()? == 1 {
            Some(LexIndexManifest {
                doc_count: dec.take_u64()?,
                bytes_offset: dec.take_u64()?,
                bytes_length: dec.take_u64()?,
                checksum: dec.take_checksum()?,
                format_version: dec.take_u32()?,
            })
        } else {
            None
        };
        let vec = if dec.take_u8()? == 1 {
            Some(VecIndexManifest {
                vector_count: dec.take_u64()?,
                dimension: dec.take_u32()?,
                bytes_offset: dec.take_u64()?,
                bytes_length: dec.take_u64()?,
                checksum: dec.take_checksum()?,
                format_version: dec.take_u32()?,
                metric: VecMetric::from_byte(dec.take_u8()?)
                    .ok_or_else(|| invalid("vector metric out of range"))?,
            })
        } else {
            None
        };
        dec.finish()?;

        let toc = Self {
            toc_version,
            frames,
            segment_catalog,
            indexes: IndexManifests { lex, vec },
        };
        toc.validate_structure()?;
        Ok(toc)
    }

    /// Invariants that hold independently of file geometry: dense ids, field
    /// presence rules, catalog ordering, and supersede link consistency.
    pub fn validate_structure(&self) -> Result<()> {
        for (index, frame) in self.frames.iter().enumerate() {
            if frame.id != index as u64 {
                return Err(invalid(format!(
                    "frame ids must be dense (frame {} at index {index})",
                    frame.id
                )));
            }
            match frame.canonical_encoding {
                PayloadEncoding::Plain => {
                    if frame.canonical_length.is_some() {
                        return Err(invalid("plain frame carries a canonical length"));
                    }
                }
                _ => {
                    if frame.canonical_length.is_none() {
                        return Err(invalid("compressed frame missing canonical length"));
                    }
                }
            }
            if frame.payload_length > 0 && frame.stored_checksum.is_none() {
                return Err(invalid("non-empty frame missing stored checksum"));
            }
            if frame.payload_length == 0 && frame.stored_checksum.is_some() {
                return Err(invalid("empty frame carries a stored checksum"));
            }
        }

        self.validate_supersede_links()?;

        let mut sorted_frames: Vec<&FrameMeta> = self
            .frames
            .iter()
            .filter(|f| f.payload_length > 0)
            .collect();
        sorted_frames.sort_by_key(|f| f.payload_offset);
        for pair in sorted_frames.windows(2) {
            if pair[0].payload_end() > pair[1].payload_offset {
                return Err(invalid(format!(
                    "payload ranges of frames {} and {} overlap",
                    pair[0].id, pair[1].id
                )));
            }
        }

        for pair in self.segment_catalog.windows(2) {
            if pair[0].bytes_offset > pair[1].bytes_offset {
                return Err(invalid("segment catalog is not sorted by offset"));
            }
            if pair[0].bytes_end() > pair[1].bytes_offset {
                return Err(invalid("segment catalog entries overlap"));
            }
        }

        for (manifest_kind, offset, length) in self
            .indexes
            .lex
            .iter()
            .map(|m| (SegmentKind::Lex, m.bytes_offset, m.bytes_length))
            .chain(
                self.indexes
                    .vec
                    .iter()
                    .map(|m| (SegmentKind::Vec, m.bytes_offset, m.bytes_length)),
            )
        {
            let covered = self.segment_catalog.iter().any(|entry| {
                entry.kind == manifest_kind
                    && entry.bytes_offset == offset
                    && entry.bytes_length == length
            });
            if !covered {
                return Err(invalid("index manifest range missing from segment catalog"));
            }
        }

        Ok(())
    }

    fn validate_supersede_links(&self) -> Result<()> {
        let frame_count = self.frames.len() as u64;
        for frame in &self.frames {
            if let Some(old) = frame.supersedes {
                if old == frame.id {
                    return Err(invalid(format!("frame {} supersedes itself", frame.id)));
                }
                if old >= frame_count {
                    return Err(invalid(format!(
                        "frame {} supersedes unknown frame {old}",
                        frame.id
                    )));
                }
                if self.frames[old as usize].superseded_by != Some(frame.id) {
                    return Err(invalid(format!(
                        "supersede link {} -> {} has no matching back-link",
                        old, frame.id
                    )));
                }
            }
            if let Some(new) = frame.superseded_by {
                if new == frame.id || new >= frame_count {
                    return Err(invalid(format!(
                        "frame {} has invalid superseded_by link",
                        frame.id
                    )));
                }
                if self.frames[new as usize].supersedes != Some(frame.id) {
                    return Err(invalid(format!(
                        "superseded_by link {} -> {new} has no matching forward link",
                        frame.id
                    )));
                }
            }
        }

        // Walk supersede chains; any chain longer than the frame count has a
        // cycle.
        for frame in &self.frames {
            let mut hops = 0u64;
            let mut cursor = frame.supersedes;
            while let Some(older) = cursor {
                hops += 1;
                if hops > frame_count {
                    return Err(invalid(format!(
                        "supersede cycle reachable from frame {}",
                        frame.id
                    )));
                }
                cursor = self.frames[older as usize].supersedes;
            }
        }
        Ok(())
    }

    /// Geometry checks that need the file layout: every committed range must
    /// sit inside the data region and below the footer.
    pub fn validate_ranges(&self, data_start: u64, footer_offset: u64) -> Result<()> {
        for frame in &self.frames {
            if frame.payload_length == 0 {
                continue;
            }
            if frame.payload_offset < data_start {
                return Err(invalid(format!(
                    "frame {} payload begins before the data region",
                    frame.id
                )));
            }
            if frame.payload_end() > footer_offset {
                return Err(invalid(format!(
                    "frame {} payload extends past the footer",
                    frame.id
                )));
            }
        }
        for entry in &self.segment_catalog {
            if entry.bytes_offset < data_start || entry.bytes_end() > footer_offset {
                return Err(invalid(format!(
                    "segment {} range escapes the data region",
                    entry.segment_id
                )));
            }
        }
        Ok(())
    }

    /// Checksum the footer stores for this serialized TOC.
    #[must_use]
    pub fn checksum_of(bytes: &[u8]) -> crate::checksum::Checksum {
        let body_len = bytes.len().saturating_sub(CHECKSUM_LEN);
        let mut hasher = checksum::Hasher::new();
        hasher.update(&bytes[..body_len]);
        hasher.update(&[0u8; CHECKSUM_LEN]);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::digest;

    fn sample_frame(id: u64, offset: u64, len: u64) -> FrameMeta {
        FrameMeta {
            id,
            timestamp: 1_700_000_000_000 + id as i64,
            anchor_ts: None,
            kind: Some("note".into()),
            track: None,
            payload_offset: offset,
            payload_length: len,
            checksum: digest(&id.to_le_bytes()),
            canonical_encoding: PayloadEncoding::Plain,
            canonical_length: None,
            stored_checksum: if len > 0 {
                Some(digest(&id.to_le_bytes()))
            } else {
                None
            },
            uri: Some(format!("mv2s://doc/{id}")),
            title: None,
            metadata: BTreeMap::new(),
            search_text: None,
            tags: vec![("topic".into(), "storage".into())],
            labels: Vec::new(),
            content_dates: Vec::new(),
            role: FrameRole::Document,
            parent_id: None,
            chunk_index: None,
            chunk_count: None,
            status: FrameStatus::Active,
            supersedes: None,
            superseded_by: None,
        }
    }

    fn sample_toc() -> Toc {
        Toc {
            toc_version: TOC_VERSION,
            frames: vec![
                sample_frame(0, 70_000, 128),
                sample_frame(1, 70_128, 64),
                sample_frame(2, 70_192, 0),
            ],
            segment_catalog: vec![
                SegmentCatalogEntry {
                    segment_id: 0,
                    bytes_offset: 80_000,
                    bytes_length: 256,
                    checksum: [0x11; 32],
                    compression: PayloadEncoding::Plain,
                    kind: SegmentKind::Lex,
                },
                SegmentCatalogEntry {
                    segment_id: 1,
                    bytes_offset: 80_256,
                    bytes_length: 128,
                    checksum: [0x22; 32],
                    compression: PayloadEncoding::Plain,
                    kind: SegmentKind::Vec,
                },
            ],
            indexes: IndexManifests {
                lex: Some(LexIndexManifest {
                    doc_count: 2,
                    bytes_offset: 80_000,
                    bytes_length: 256,
                    checksum: [0x11; 32],
                    format_version: 1,
                }),
                vec: Some(VecIndexManifest {
                    vector_count: 2,
                    dimension: 384,
                    bytes_offset: 80_256,
                    bytes_length: 128,
                    checksum: [0x22; 32],
                    format_version: 1,
                    metric: VecMetric::Cosine,
                }),
            },
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let toc = sample_toc();
        let bytes = toc.encode().expect("encode");
        let decoded = Toc::decode(&bytes).expect("decode");
        assert_eq!(decoded.frames, toc.frames);
        assert_eq!(decoded.segment_catalog, toc.segment_catalog);
        assert_eq!(decoded.indexes, toc.indexes);
    }

    #[test]
    fn trailing_checksum_detects_corruption() {
        let toc = sample_toc();
        let mut bytes = toc.encode().expect("encode");
        bytes[10] ^= 0xFF;
        let err = Toc::decode(&bytes).expect_err("corrupt body");
        assert!(matches!(err, StoreError::ChecksumMismatch { context: "toc" }));
    }

    #[test]
    fn excess_bytes_are_rejected() {
        let toc = sample_toc();
        let mut bytes = toc.encode().expect("encode");
        // Splice an extra byte before the checksum and restamp it so only the
        // excess-bytes check can fire.
        let tail = bytes.len() - CHECKSUM_LEN;
        bytes.insert(tail, 0);
        let restamped = Toc::checksum_of(&bytes);
        let tail = bytes.len() - CHECKSUM_LEN;
        bytes[tail..].copy_from_slice(&restamped);
        let err = Toc::decode(&bytes).expect_err("excess bytes");
        assert!(matches!(err, StoreError::Decoding { .. }));
    }

    #[test]
    fn nonzero_reserved_track_tag_is_rejected() {
        let toc = sample_toc();
        let mut bytes = toc.encode().expect("encode");
        bytes[12] = 1; // reserved tag sits after version (8) + frame count (4)
        let restamped = Toc::checksum_of(&bytes);
        let tail = bytes.len() - CHECKSUM_LEN;
        bytes[tail..].copy_from_slice(&restamped);
        let err = Toc::decode(&bytes).expect_err("reserved tag");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn non_dense_ids_are_rejected() {
        let mut toc = sample_toc();
        toc.frames[1].id = 5;
        let err = toc.validate_structure().expect_err("gap in ids");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn overlapping_payloads_are_rejected() {
        let mut toc = sample_toc();
        toc.frames[1].payload_offset = 70_064; // overlaps frame 0's 128 bytes
        let err = toc.validate_structure().expect_err("overlap");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn compressed_frame_requires_canonical_length() {
        let mut toc = sample_toc();
        toc.frames[0].canonical_encoding = PayloadEncoding::Lz4;
        let err = toc.validate_structure().expect_err("missing length");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn missing_stored_checksum_is_rejected() {
        let mut toc = sample_toc();
        toc.frames[0].stored_checksum = None;
        let err = toc.validate_structure().expect_err("missing checksum");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn supersede_links_must_be_bijective() {
        let mut toc = sample_toc();
        toc.frames[1].supersedes = Some(0);
        // Missing back-link on frame 0.
        let err = toc.validate_structure().expect_err("one-sided link");
        assert!(matches!(err, StoreError::InvalidToc { .. }));

        toc.frames[0].superseded_by = Some(1);
        toc.validate_structure().expect("consistent links pass");
    }

    #[test]
    fn supersede_cycles_are_rejected() {
        let mut toc = sample_toc();
        toc.frames[1].supersedes = Some(0);
        toc.frames[0].superseded_by = Some(1);
        toc.frames[0].supersedes = Some(1);
        toc.frames[1].superseded_by = Some(0);
        let err = toc.validate_structure().expect_err("two-cycle");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn unsorted_catalog_is_rejected() {
        let mut toc = sample_toc();
        let entry = |id: u64, offset: u64| SegmentCatalogEntry {
            segment_id: id,
            bytes_offset: offset,
            bytes_length: 32,
            checksum: [0; 32],
            compression: PayloadEncoding::Plain,
            kind: SegmentKind::Lex,
        };
        toc.segment_catalog = vec![entry(0, 90_000), entry(1, 80_000)];
        let err = toc.validate_structure().expect_err("unsorted");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn manifest_must_have_catalog_entry() {
        let mut toc = sample_toc();
        toc.indexes.vec = None;
        toc.indexes.lex = Some(LexIndexManifest {
            doc_count: 2,
            bytes_offset: 90_000,
            bytes_length: 256,
            checksum: [7; 32],
            format_version: 1,
        });
        let err = toc.validate_structure().expect_err("uncovered manifest");
        assert!(matches!(err, StoreError::InvalidToc { .. }));

        toc.segment_catalog = vec![SegmentCatalogEntry {
            segment_id: 0,
            bytes_offset: 90_000,
            bytes_length: 256,
            checksum: [7; 32],
            compression: PayloadEncoding::Plain,
            kind: SegmentKind::Lex,
        }];
        toc.validate_structure().expect("covered manifest passes");
    }

    #[test]
    fn range_validation_enforces_data_region() {
        let toc = sample_toc();
        toc.validate_ranges(65_536, 90_000).expect("in range");
        let err = toc.validate_ranges(71_000, 90_000).expect_err("before start");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
        let err = toc.validate_ranges(65_536, 70_100).expect_err("past footer");
        assert!(matches!(err, StoreError::InvalidToc { .. }));
    }

    #[test]
    fn subset_roundtrip() {
        let subset = FrameMetaSubset {
            kind: Some("chat".into()),
            track: Some("main".into()),
            anchor_ts: Some(-5),
            uri: None,
            title: Some("title".into()),
            metadata: BTreeMap::from([("a".to_string(), "b".to_string())]),
            search_text: Some("searchable".into()),
            tags: vec![("k".into(), "v".into())],
            labels: vec!["l1".into(), "l2".into()],
            content_dates: vec!["2026-07-01".into()],
            role: FrameRole::Assistant,
            parent_id: Some(3),
            chunk_index: Some(1),
            chunk_count: Some(4),
        };
        let mut enc = Encoder::new();
        encode_subset(&mut enc, &subset).unwrap();
        let bytes = enc.finish();
        let mut dec = Decoder::new(&bytes);
        let decoded = decode_subset(&mut dec).unwrap();
        dec.finish().unwrap();
        assert_eq!(decoded, subset);
    }
}
