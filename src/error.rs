use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::FrameId;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Canonical error surface for the storage core.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("Header validation failed: {reason}")]
    InvalidHeader { reason: Cow<'static, str> },

    #[error("Commit footer validation failed: {reason}")]
    InvalidFooter { reason: Cow<'static, str> },

    #[error("Table of contents validation failed: {reason}")]
    InvalidToc { reason: Cow<'static, str> },

    #[error("Checksum mismatch while validating {context}")]
    ChecksumMismatch { context: &'static str },

    #[error("Encoding failed: {reason}")]
    Encoding { reason: Cow<'static, str> },

    #[error("Decoding failed: {reason}")]
    Decoding { reason: Cow<'static, str> },

    #[error(
        "WAL capacity exceeded. Pending: {current} bytes, ring size: {limit} bytes, required: {required} bytes"
    )]
    CapacityExceeded {
        current: u64,
        limit: u64,
        required: u64,
    },

    #[error("Embedded WAL is corrupted at offset {offset}: {reason}")]
    WalCorruption {
        offset: u64,
        reason: Cow<'static, str>,
    },

    #[error("Frame {frame_id} was not found")]
    FrameNotFound { frame_id: FrameId },

    #[error("Frame with uri '{uri}' was not found")]
    FrameNotFoundByUri { uri: String },

    #[error("Invalid frame {frame_id}: {reason}")]
    InvalidFrame {
        frame_id: FrameId,
        reason: &'static str,
    },

    #[error("Superseding frame {new_id} with {old_id} would create a cycle")]
    SupersedeCycle { old_id: FrameId, new_id: FrameId },

    #[error("Embedding dimension mismatch (expected {expected}, got {actual})")]
    EmbeddingDimensionMismatch { expected: u32, actual: u32 },

    #[error("Store is opened read-only")]
    ReadOnly,

    #[error("Store handle is closed")]
    Closed,

    #[error("Feature '{feature}' is not available in this build")]
    FeatureUnavailable { feature: &'static str },
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

impl From<std::array::TryFromSliceError> for StoreError {
    fn from(_: std::array::TryFromSliceError) -> Self {
        Self::Decoding {
            reason: "fixed-width field truncated".into(),
        }
    }
}

impl StoreError {
    pub(crate) fn io_at(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: Some(path.into()),
        }
    }
}
