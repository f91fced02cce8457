//! Structural and deep verification.

use std::path::Path;

use crate::checksum::digest;
use crate::error::{Result, StoreError};
use crate::io::pfile;
use crate::store::lifecycle::Store;
use crate::types::{VerificationCheck, VerificationReport, VerificationStatus};

impl Store {
    /// Verifies the file at `path`.
    ///
    /// The structural pass is the same validation an open performs: header
    /// selection, footer selection, TOC decode, range checks, and a WAL
    /// scan. With `deep`, every frame's stored bytes and every segment range
    /// are re-hashed; a mismatch is fatal and surfaces as `ChecksumMismatch`.
    pub fn verify<P: AsRef<Path>>(path: P, deep: bool) -> Result<VerificationReport> {
        let path_buf = path.as_ref().to_path_buf();
        let mut store = Self::open_read_only(&path_buf)?;

        let mut checks = Vec::new();
        let mut push_check = |name: &str, status: VerificationStatus, details: Option<String>| {
            checks.push(VerificationCheck {
                name: name.to_string(),
                status,
                details,
            });
        };

        // Reaching this point means the structural pass succeeded.
        push_check("HeaderSelection", VerificationStatus::Passed, None);
        push_check("FooterSelection", VerificationStatus::Passed, None);
        push_check("TocDecode", VerificationStatus::Passed, None);
        push_check(
            "WalScan",
            VerificationStatus::Passed,
            Some(format!(
                "{} pending mutations",
                store.pending.mutations.len()
            )),
        );

        if deep {
            store.verify_frame_payloads()?;
            push_check("FramePayloadChecksums", VerificationStatus::Passed, None);
            store.verify_segment_ranges()?;
            push_check("SegmentChecksums", VerificationStatus::Passed, None);
        } else {
            push_check(
                "FramePayloadChecksums",
                VerificationStatus::Skipped,
                Some("deep verification disabled".into()),
            );
            push_check(
                "SegmentChecksums",
                VerificationStatus::Skipped,
                Some("deep verification disabled".into()),
            );
        }

        Ok(VerificationReport {
            file_path: path_buf,
            checks,
            overall_status: VerificationStatus::Passed,
        })
    }

    fn verify_frame_payloads(&mut self) -> Result<()> {
        for index in 0..self.toc.frames.len() {
            let meta = self.toc.frames[index].clone();
            if meta.payload_length == 0 {
                continue;
            }
            let stored_checksum = meta.stored_checksum.ok_or(StoreError::InvalidFrame {
                frame_id: meta.id,
                reason: "non-empty frame missing stored checksum",
            })?;
            let mut buf = vec![0u8; meta.payload_length as usize];
            pfile::read_exact_at(&mut self.file, meta.payload_offset, &mut buf)?;
            if digest(&buf) != stored_checksum {
                tracing::warn!(frame_id = meta.id, "stored payload checksum mismatch");
                return Err(StoreError::ChecksumMismatch {
                    context: "frame payload",
                });
            }
        }
        Ok(())
    }

    fn verify_segment_ranges(&mut self) -> Result<()> {
        for index in 0..self.toc.segment_catalog.len() {
            let entry = self.toc.segment_catalog[index].clone();
            let mut buf = vec![0u8; entry.bytes_length as usize];
            pfile::read_exact_at(&mut self.file, entry.bytes_offset, &mut buf)?;
            if digest(&buf) != entry.checksum {
                tracing::warn!(segment_id = entry.segment_id, "segment checksum mismatch");
                return Err(StoreError::ChecksumMismatch {
                    context: "index segment",
                });
            }
        }
        Ok(())
    }
}
