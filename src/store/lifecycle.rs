//! Store creation, opening, and close.

use std::fs::{File, OpenOptions as FsOpenOptions};
use std::path::{Path, PathBuf};

use crate::checksum::Checksum;
use crate::constants::{DEFAULT_AUTO_COMMIT_PCT, DEFAULT_WAL_SIZE, WAL_OFFSET};
use crate::error::{Result, StoreError};
use crate::footer::{CommitFooter, FOOTER_SIZE};
use crate::io::{header, pfile, wal::WalRing};
use crate::lock::{FileLock, LockMode};
use crate::store::{PendingState, StagedIndex};
use crate::types::Toc;

/// Options for `Store::create_with_options`.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// WAL ring size in bytes. The ring is a fixed region of the file;
    /// sparse filesystems only materialise the bytes actually written.
    pub wal_size: u64,
    /// WAL occupancy percentage that triggers an internal commit; `None`
    /// disables pressure-triggered commits.
    pub auto_commit_threshold_pct: Option<u8>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            wal_size: DEFAULT_WAL_SIZE,
            auto_commit_threshold_pct: Some(DEFAULT_AUTO_COMMIT_PCT),
        }
    }
}

/// Options for `Store::open_with_options`.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Truncate trailing bytes beyond the last recoverable state.
    pub repair: bool,
    pub read_only: bool,
    pub auto_commit_threshold_pct: Option<u8>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            repair: false,
            read_only: false,
            auto_commit_threshold_pct: Some(DEFAULT_AUTO_COMMIT_PCT),
        }
    }
}

/// Single-file store handle. One writable handle owns the file exclusively;
/// read-only handles share it.
pub struct Store {
    pub(crate) path: PathBuf,
    pub(crate) file: File,
    pub(crate) lock: Option<FileLock>,
    pub(crate) read_only: bool,
    pub(crate) is_open: bool,
    /// Highest header page generation seen; commits bump it by one.
    pub(crate) header_page_generation: u64,
    pub(crate) file_generation: u64,
    pub(crate) footer_offset: u64,
    pub(crate) toc_checksum: Checksum,
    pub(crate) toc: Toc,
    pub(crate) wal: WalRing,
    pub(crate) wal_offset: u64,
    pub(crate) wal_size: u64,
    pub(crate) pending: PendingState,
    pub(crate) staged_lex: Option<StagedIndex>,
    pub(crate) staged_vec: Option<StagedIndex>,
    pub(crate) auto_commit_threshold_pct: Option<u8>,
}

impl Store {
    /// Creates a new store file with an empty TOC and a default-sized WAL.
    ///
    /// An existing file at `path` is truncated and re-initialised.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, CreateOptions::default())
    }

    pub fn create_with_options<P: AsRef<Path>>(path: P, options: CreateOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if options.wal_size == 0 {
            return Err(StoreError::InvalidHeader {
                reason: "wal_size must be non-zero".into(),
            });
        }
        let mut file = FsOpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|err| StoreError::io_at(err, &path))?;
        let lock = FileLock::acquire(&file, LockMode::Exclusive, true)?;

        let toc = Toc::default();
        let toc_bytes = toc.encode()?;
        let toc_checksum = Toc::checksum_of(&toc_bytes);
        let data_start = WAL_OFFSET + options.wal_size;
        let footer_offset = data_start + toc_bytes.len() as u64;
        let footer = CommitFooter {
            toc_len: toc_bytes.len() as u64,
            toc_hash: toc_checksum,
            generation: 0,
            wal_committed_seq: 0,
        };
        pfile::write_all_at(&mut file, data_start, &toc_bytes)?;
        pfile::write_all_at(&mut file, footer_offset, &footer.encode())?;

        let snapshot = header::ReplaySnapshot {
            file_generation: 0,
            wal_committed_seq: 0,
            footer_offset,
            wal_write_pos: 0,
            wal_checkpoint_pos: 0,
            wal_pending_bytes: 0,
            wal_last_sequence: 0,
        };
        let mut page = header::HeaderPage {
            header_page_generation: 1,
            file_generation: 0,
            footer_offset,
            wal_offset: WAL_OFFSET,
            wal_size: options.wal_size,
            wal_write_pos: 0,
            wal_checkpoint_pos: 0,
            wal_committed_seq: 0,
            toc_checksum,
            replay_snapshot: Some(snapshot),
        };
        header::write_page(&mut file, 0, &page)?;
        page.header_page_generation = 0;
        header::write_page(&mut file, 1, &page)?;
        pfile::sync(&file)?;

        tracing::debug!(path = %path.display(), wal_size = options.wal_size, "created store");

        Ok(Self {
            path,
            file,
            lock: Some(lock),
            read_only: false,
            is_open: true,
            header_page_generation: 1,
            file_generation: 0,
            footer_offset,
            toc_checksum,
            toc,
            wal: WalRing::new(WAL_OFFSET, options.wal_size, 0, 0, 0, 0, 0),
            wal_offset: WAL_OFFSET,
            wal_size: options.wal_size,
            pending: PendingState::default(),
            staged_lex: None,
            staged_vec: None,
            auto_commit_threshold_pct: options.auto_commit_threshold_pct,
        })
    }

    /// Opens an existing store for writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(path, OpenOptions::default())
    }

    /// Opens an existing store read-only; pending WAL mutations are visible
    /// through the `*_including_pending` read paths but never applied.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_options(
            path,
            OpenOptions {
                read_only: true,
                ..OpenOptions::default()
            },
        )
    }

    pub fn open_with_options<P: AsRef<Path>>(path: P, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = if options.read_only {
            FsOpenOptions::new()
                .read(true)
                .open(&path)
                .map_err(|err| StoreError::io_at(err, &path))?
        } else {
            FsOpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|err| StoreError::io_at(err, &path))?
        };
        let mode = if options.read_only {
            LockMode::Shared
        } else {
            LockMode::Exclusive
        };
        let lock = FileLock::acquire(&file, mode, !options.read_only)?;
        crate::store::recovery::open_existing(path, file, lock, options)
    }

    /// Commits any local mutations, releases locks, and invalidates the
    /// handle. Every later call on this handle fails with `Closed`.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.read_only && (!self.pending.is_empty() || self.has_staged_indexes()) {
            self.commit()?;
        }
        self.is_open = false;
        drop(self.lock.take());
        tracing::debug!(path = %self.path.display(), "closed store");
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if !self.is_open {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn has_staged_indexes(&self) -> bool {
        self.staged_lex.is_some() || self.staged_vec.is_some()
    }

    /// First byte of the data region.
    pub(crate) fn data_start(&self) -> u64 {
        self.wal_offset + self.wal_size
    }

    /// End of the committed tail (footer inclusive).
    pub(crate) fn footer_end(&self) -> u64 {
        self.footer_offset + FOOTER_SIZE as u64
    }

    /// Total frame count including pending puts.
    pub(crate) fn total_frame_count(&self) -> u64 {
        self.toc.frames.len() as u64 + self.pending.new_frames.len() as u64
    }
}
