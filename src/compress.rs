//! Canonical payload encodings.
//!
//! Content is stored under one of four encodings. `plain` is a pass-through;
//! the others compress the canonical bytes before they hit the data region.
//! Decoding always reproduces the canonical bytes and checks them against
//! the recorded canonical length.

use std::io::Write;

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::error::{Result, StoreError};
use crate::types::PayloadEncoding;

/// Compresses canonical bytes into their stored representation.
pub fn encode_payload(bytes: &[u8], encoding: PayloadEncoding) -> Result<Vec<u8>> {
    match encoding {
        PayloadEncoding::Plain => Ok(bytes.to_vec()),
        PayloadEncoding::Lzfse => Err(StoreError::FeatureUnavailable { feature: "lzfse" }),
        PayloadEncoding::Lz4 => Ok(lz4_flex::block::compress(bytes)),
        PayloadEncoding::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            Ok(encoder.finish()?)
        }
    }
}

/// Decompresses stored bytes back into canonical bytes.
///
/// `canonical_length` is required for every encoding except `plain`; the
/// decoded size must match it exactly.
pub fn decode_payload(
    stored: &[u8],
    encoding: PayloadEncoding,
    canonical_length: Option<u64>,
) -> Result<Vec<u8>> {
    match encoding {
        PayloadEncoding::Plain => Ok(stored.to_vec()),
        PayloadEncoding::Lzfse => Err(StoreError::FeatureUnavailable { feature: "lzfse" }),
        PayloadEncoding::Lz4 => {
            let expected = required_length(canonical_length)?;
            let decoded = lz4_flex::block::decompress(stored, expected).map_err(|_| {
                StoreError::Decoding {
                    reason: "lz4 payload is corrupt".into(),
                }
            })?;
            check_length(&decoded, expected)?;
            Ok(decoded)
        }
        PayloadEncoding::Deflate => {
            let expected = required_length(canonical_length)?;
            let mut decoded = Vec::with_capacity(expected);
            let mut decoder = DeflateDecoder::new(stored);
            std::io::Read::read_to_end(&mut decoder, &mut decoded).map_err(|_| {
                StoreError::Decoding {
                    reason: "deflate payload is corrupt".into(),
                }
            })?;
            check_length(&decoded, expected)?;
            Ok(decoded)
        }
    }
}

fn required_length(canonical_length: Option<u64>) -> Result<usize> {
    let length = canonical_length.ok_or_else(|| StoreError::InvalidToc {
        reason: "canonical length missing for compressed payload".into(),
    })?;
    usize::try_from(length).map_err(|_| StoreError::Decoding {
        reason: "canonical length exceeds addressable memory".into(),
    })
}

fn check_length(decoded: &[u8], expected: usize) -> Result<()> {
    if decoded.len() != expected {
        return Err(StoreError::Decoding {
            reason: "decompressed payload length mismatch".into(),
        });
    }
    Ok(())
}
