//! Crash-safe, deterministic, single-file memory store for
//! retrieval-augmented workloads.
//!
//! A store is one `.mv2s` file with five regions in fixed order: two header
//! pages, a circular write-ahead log, an append-only data region, a
//! serialized table of contents, and a 64-byte footer pointing at the TOC.
//! Mutations are WAL records; `commit` folds them into a new TOC, writes a
//! new footer, and swaps the header pages, advancing the store by exactly
//! one generation. Killing the process at any instant leaves the previous
//! footer (plus the WAL) recoverable on the next open.
//!
//! ```no_run
//! use mnemo_core::{PutOptions, Store};
//!
//! # fn main() -> mnemo_core::Result<()> {
//! let mut store = Store::create("notes.mv2s")?;
//! let id = store.put(b"hello", PutOptions::default())?;
//! store.commit()?;
//! assert_eq!(store.frame_content(id)?, b"hello");
//! store.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Search engines, embedding providers, and context assembly are external
//! collaborators; the crate exposes the frame, index-staging, and pending
//! read surfaces they build on.

pub mod checksum;
pub mod codec;
pub mod compress;
pub mod constants;
mod error;
pub mod footer;
pub mod io;
mod lock;
mod store;
pub mod toc;
pub mod types;

pub use error::{Result, StoreError};
pub use footer::{CommitFooter, FOOTER_SIZE};
pub use io::wal::{Mutation, PutFrameRecord, WalStats};
pub use lock::{FileLock, LockMode};
pub use store::{CreateOptions, OpenOptions, Store};
pub use types::{
    FrameId, FrameMeta, FrameMetaSubset, FrameRole, FrameStatus, PayloadEncoding, PutOptions,
    SegmentCatalogEntry, SegmentKind, Stats, TimelineOrder, TimelineQuery, Toc, VecMetric,
    VerificationReport, VerificationStatus,
};
