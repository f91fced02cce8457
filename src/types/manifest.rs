//! Persistent manifest structures describing segments, indices, and the TOC.

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::constants::TOC_VERSION;
use crate::types::common::{PayloadEncoding, SegmentId, SegmentKind, VecMetric};
use crate::types::frame::FrameMeta;

/// Catalog entry identifying a contiguous index byte range in the data
/// region. Entries are sorted by `bytes_offset` and never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCatalogEntry {
    pub segment_id: SegmentId,
    pub bytes_offset: u64,
    pub bytes_length: u64,
    pub checksum: Checksum,
    pub compression: PayloadEncoding,
    pub kind: SegmentKind,
}

impl SegmentCatalogEntry {
    #[must_use]
    pub fn bytes_end(&self) -> u64 {
        self.bytes_offset.saturating_add(self.bytes_length)
    }
}

/// Manifest for the embedded text (lexical) index segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexIndexManifest {
    pub doc_count: u64,
    pub bytes_offset: u64,
    pub bytes_length: u64,
    pub checksum: Checksum,
    pub format_version: u32,
}

/// Manifest for the embedded vector index segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VecIndexManifest {
    pub vector_count: u64,
    pub dimension: u32,
    pub bytes_offset: u64,
    pub bytes_length: u64,
    pub checksum: Checksum,
    pub format_version: u32,
    pub metric: VecMetric,
}

/// At most one manifest per index kind exists at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifests {
    pub lex: Option<LexIndexManifest>,
    pub vec: Option<VecIndexManifest>,
}

/// Committed table of contents: the catalog of frames, segments, and index
/// manifests that a footer points at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toc {
    pub toc_version: u64,
    pub frames: Vec<FrameMeta>,
    pub segment_catalog: Vec<SegmentCatalogEntry>,
    pub indexes: IndexManifests,
}

impl Default for Toc {
    fn default() -> Self {
        Self {
            toc_version: TOC_VERSION,
            frames: Vec::new(),
            segment_catalog: Vec::new(),
            indexes: IndexManifests::default(),
        }
    }
}

impl Toc {
    /// Largest committed byte offset across frame payloads and segments.
    #[must_use]
    pub fn max_data_end(&self) -> u64 {
        let frame_end = self.frames.iter().map(FrameMeta::payload_end).max();
        let segment_end = self
            .segment_catalog
            .iter()
            .map(SegmentCatalogEntry::bytes_end)
            .max();
        frame_end.unwrap_or(0).max(segment_end.unwrap_or(0))
    }
}

/// Outcome of a single verification check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Passed,
    Failed,
    Skipped,
}

/// One named check within a verification report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub status: VerificationStatus,
    pub details: Option<String>,
}

/// Result of `Store::verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub file_path: std::path::PathBuf,
    pub checks: Vec<VerificationCheck>,
    pub overall_status: VerificationStatus,
}
