//! Deterministic little-endian codec for the on-disk format.
//!
//! Every multi-byte integer is little-endian. Strings and blobs are
//! u32-length-prefixed, arrays are u32-count-prefixed, and optionals are a
//! single 0/1 tag byte followed by the value. The encoder validates field
//! limits up front so a serialized structure always decodes.

use crate::checksum::{self, CHECKSUM_LEN, Checksum};
use crate::constants::{MAX_ARRAY_ELEMENTS, MAX_BLOB_BYTES, MAX_STRING_BYTES};
use crate::error::{Result, StoreError};

fn encode_err(reason: &'static str) -> StoreError {
    StoreError::Encoding {
        reason: reason.into(),
    }
}

fn decode_err(reason: &'static str) -> StoreError {
    StoreError::Decoding {
        reason: reason.into(),
    }
}

/// Append-only byte encoder.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Appends a 32-byte checksum field verbatim.
    pub fn put_checksum(&mut self, value: &[u8]) -> Result<()> {
        if value.len() != CHECKSUM_LEN {
            return Err(encode_err("checksum length must be 32 bytes"));
        }
        self.buf.extend_from_slice(value);
        Ok(())
    }

    pub fn put_string(&mut self, value: &str) -> Result<()> {
        if value.len() > MAX_STRING_BYTES {
            return Err(encode_err("string field exceeds 16 MiB"));
        }
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn put_blob(&mut self, value: &[u8]) -> Result<()> {
        if value.len() > MAX_BLOB_BYTES {
            return Err(encode_err("blob field exceeds 256 MiB"));
        }
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    /// Appends an array count prefix after bounds-checking it.
    pub fn put_count(&mut self, count: usize) -> Result<()> {
        if count > MAX_ARRAY_ELEMENTS {
            return Err(encode_err("array count exceeds 10,000,000 elements"));
        }
        self.put_u32(count as u32);
        Ok(())
    }

    fn put_tag(&mut self, present: bool) {
        self.buf.push(u8::from(present));
    }

    pub fn put_opt_u32(&mut self, value: Option<u32>) {
        self.put_tag(value.is_some());
        if let Some(v) = value {
            self.put_u32(v);
        }
    }

    pub fn put_opt_u64(&mut self, value: Option<u64>) {
        self.put_tag(value.is_some());
        if let Some(v) = value {
            self.put_u64(v);
        }
    }

    pub fn put_opt_i64(&mut self, value: Option<i64>) {
        self.put_tag(value.is_some());
        if let Some(v) = value {
            self.put_i64(v);
        }
    }

    pub fn put_opt_string(&mut self, value: Option<&str>) -> Result<()> {
        self.put_tag(value.is_some());
        if let Some(v) = value {
            self.put_string(v)?;
        }
        Ok(())
    }

    pub fn put_opt_checksum(&mut self, value: Option<&Checksum>) -> Result<()> {
        self.put_tag(value.is_some());
        if let Some(v) = value {
            self.put_checksum(v)?;
        }
        Ok(())
    }

    /// Consumes the encoder and returns the serialized bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Appends a trailing self-checksum: SHA-256 of the buffer with the final
    /// 32 bytes treated as zero. Used by the TOC.
    #[must_use]
    pub fn finish_checksummed(mut self) -> Vec<u8> {
        let mut hasher = checksum::Hasher::new();
        hasher.update(&self.buf);
        hasher.update(&[0u8; CHECKSUM_LEN]);
        let digest = hasher.finalize();
        self.buf.extend_from_slice(&digest);
        self.buf
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor-based decoder over a byte slice.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| decode_err("truncated buffer"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn take_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    pub fn take_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    pub fn take_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        Ok(i64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    pub fn take_checksum(&mut self) -> Result<Checksum> {
        let bytes = self.take(CHECKSUM_LEN)?;
        Ok(bytes.try_into().expect("32 bytes"))
    }

    pub fn take_string(&mut self) -> Result<String> {
        let len = self.take_u32()? as usize;
        if len > MAX_STRING_BYTES {
            return Err(decode_err("string field exceeds 16 MiB"));
        }
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| decode_err("invalid utf-8 in string field"))
    }

    pub fn take_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.take_u32()? as usize;
        if len > MAX_BLOB_BYTES {
            return Err(decode_err("blob field exceeds 256 MiB"));
        }
        Ok(self.take(len)?.to_vec())
    }

    /// Reads `len` raw bytes without a length prefix.
    pub fn take_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    pub fn take_count(&mut self) -> Result<usize> {
        let count = self.take_u32()? as usize;
        if count > MAX_ARRAY_ELEMENTS {
            return Err(decode_err("array count exceeds 10,000,000 elements"));
        }
        Ok(count)
    }

    fn take_tag(&mut self) -> Result<bool> {
        match self.take_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(decode_err("invalid optional tag")),
        }
    }

    pub fn take_opt_u32(&mut self) -> Result<Option<u32>> {
        Ok(if self.take_tag()? {
            Some(self.take_u32()?)
        } else {
            None
        })
    }

    pub fn take_opt_u64(&mut self) -> Result<Option<u64>> {
        Ok(if self.take_tag()? {
            Some(self.take_u64()?)
        } else {
            None
        })
    }

    pub fn take_opt_i64(&mut self) -> Result<Option<i64>> {
        Ok(if self.take_tag()? {
            Some(self.take_i64()?)
        } else {
            None
        })
    }

    pub fn take_opt_string(&mut self) -> Result<Option<String>> {
        Ok(if self.take_tag()? {
            Some(self.take_string()?)
        } else {
            None
        })
    }

    pub fn take_opt_checksum(&mut self) -> Result<Option<Checksum>> {
        Ok(if self.take_tag()? {
            Some(self.take_checksum()?)
        } else {
            None
        })
    }

    /// Fails unless the cursor consumed the entire buffer.
    pub fn finish(self) -> Result<()> {
        if self.pos != self.buf.len() {
            return Err(decode_err("excess bytes after decoded value"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_roundtrip() {
        let mut enc = Encoder::new();
        enc.put_u8(7);
        enc.put_u16(0x0100);
        enc.put_u32(0xDEAD_BEEF);
        enc.put_u64(u64::MAX - 1);
        enc.put_i64(-42);
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.take_u8().unwrap(), 7);
        assert_eq!(dec.take_u16().unwrap(), 0x0100);
        assert_eq!(dec.take_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(dec.take_u64().unwrap(), u64::MAX - 1);
        assert_eq!(dec.take_i64().unwrap(), -42);
        dec.finish().unwrap();
    }

    #[test]
    fn strings_and_optionals_roundtrip() {
        let mut enc = Encoder::new();
        enc.put_string("καλημέρα").unwrap();
        enc.put_opt_string(None).unwrap();
        enc.put_opt_string(Some("tail")).unwrap();
        enc.put_opt_u64(Some(99));
        enc.put_opt_i64(None);
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.take_string().unwrap(), "καλημέρα");
        assert_eq!(dec.take_opt_string().unwrap(), None);
        assert_eq!(dec.take_opt_string().unwrap().as_deref(), Some("tail"));
        assert_eq!(dec.take_opt_u64().unwrap(), Some(99));
        assert_eq!(dec.take_opt_i64().unwrap(), None);
        dec.finish().unwrap();
    }

    #[test]
    fn truncated_read_is_rejected() {
        let mut enc = Encoder::new();
        enc.put_u64(1234);
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes[..6]);
        let err = dec.take_u64().expect_err("short buffer");
        assert!(matches!(err, StoreError::Decoding { .. }));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut enc = Encoder::new();
        enc.put_blob(&[0xFF, 0xFE, 0xFD]).unwrap();
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes);
        let err = dec.take_string().expect_err("invalid utf-8");
        assert!(matches!(err, StoreError::Decoding { .. }));
    }

    #[test]
    fn excess_bytes_fail_finish() {
        let mut enc = Encoder::new();
        enc.put_u32(5);
        enc.put_u8(0);
        let bytes = enc.finish();

        let mut dec = Decoder::new(&bytes);
        assert_eq!(dec.take_u32().unwrap(), 5);
        let err = dec.finish().expect_err("one byte left over");
        assert!(matches!(err, StoreError::Decoding { .. }));
    }

    #[test]
    fn invalid_optional_tag_is_rejected() {
        let bytes = [2u8];
        let mut dec = Decoder::new(&bytes);
        let err = dec.take_opt_u64().expect_err("tag out of range");
        assert!(matches!(err, StoreError::Decoding { .. }));
    }

    #[test]
    fn checksum_length_is_enforced() {
        let mut enc = Encoder::new();
        let err = enc.put_checksum(&[0u8; 16]).expect_err("short checksum");
        assert!(matches!(err, StoreError::Encoding { .. }));
    }

    #[test]
    fn checksummed_finish_appends_self_digest() {
        let mut enc = Encoder::new();
        enc.put_u64(42);
        let bytes = enc.finish_checksummed();
        assert_eq!(bytes.len(), 8 + 32);

        let mut zeroed = bytes.clone();
        let tail = zeroed.len() - 32;
        zeroed[tail..].fill(0);
        assert_eq!(&bytes[tail..], crate::checksum::digest(&zeroed));
    }
}
