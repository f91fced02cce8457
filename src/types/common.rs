//! Foundational enums and identifier types shared across store structures.

use serde::{Deserialize, Serialize};

/// Frame IDs are dense u64 indexes into the committed frame table.
pub type FrameId = u64;

/// Segment IDs identify embedded index segments; monotonic within a file.
pub type SegmentId = u64;

/// Encoding of the stored payload bytes relative to the canonical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    #[default]
    Plain,
    Lzfse,
    Lz4,
    Deflate,
}

impl PayloadEncoding {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Plain),
            1 => Some(Self::Lzfse),
            2 => Some(Self::Lz4),
            3 => Some(Self::Deflate),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Plain => 0,
            Self::Lzfse => 1,
            Self::Lz4 => 2,
            Self::Deflate => 3,
        }
    }
}

/// Role attributed to a frame in the conversation/document model.
///
/// The integer mapping is part of the on-disk format and is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRole {
    #[default]
    Document,
    Chunk,
    System,
    User,
    Assistant,
}

impl FrameRole {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Document),
            1 => Some(Self::Chunk),
            2 => Some(Self::System),
            3 => Some(Self::User),
            4 => Some(Self::Assistant),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Document => 0,
            Self::Chunk => 1,
            Self::System => 2,
            Self::User => 3,
            Self::Assistant => 4,
        }
    }
}

/// Lifecycle status of a frame. Transitions are monotonic: a deleted frame
/// never becomes active again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameStatus {
    #[default]
    Active,
    Deleted,
}

impl FrameStatus {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Active),
            1 => Some(Self::Deleted),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Deleted => 1,
        }
    }
}

/// Index family an embedded segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Lex,
    Vec,
}

impl SegmentKind {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Lex),
            1 => Some(Self::Vec),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Lex => 0,
            Self::Vec => 1,
        }
    }
}

/// Similarity metric recorded for a vector index segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VecMetric {
    #[default]
    Cosine,
    Dot,
    L2,
}

impl VecMetric {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Cosine),
            1 => Some(Self::Dot),
            2 => Some(Self::L2),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Cosine => 0,
            Self::Dot => 1,
            Self::L2 => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_byte_mappings_roundtrip() {
        for value in 0..4 {
            let enc = PayloadEncoding::from_byte(value).unwrap();
            assert_eq!(enc.as_byte(), value);
        }
        assert!(PayloadEncoding::from_byte(4).is_none());

        for value in 0..5 {
            let role = FrameRole::from_byte(value).unwrap();
            assert_eq!(role.as_byte(), value);
        }
        assert!(FrameRole::from_byte(5).is_none());

        assert_eq!(FrameStatus::from_byte(1), Some(FrameStatus::Deleted));
        assert!(FrameStatus::from_byte(2).is_none());
        assert_eq!(SegmentKind::from_byte(0), Some(SegmentKind::Lex));
        assert_eq!(VecMetric::from_byte(2), Some(VecMetric::L2));
    }
}
