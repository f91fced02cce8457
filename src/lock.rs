use std::fs::File;
use std::thread;
use std::time::Duration;

use fs2::FileExt;

use crate::error::{Result, StoreError};

/// Lock held on an open store file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Advisory file lock guard. The OS lock is released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    mode: LockMode,
}

impl FileLock {
    /// Acquires a lock on a clone of `file`, blocking with backoff while the
    /// lock is contended.
    ///
    /// Exclusive acquisition on a handle that is not writable is rejected
    /// up front: a reader must never be able to starve or fence the writer.
    pub fn acquire(file: &File, mode: LockMode, writable: bool) -> Result<Self> {
        if mode == LockMode::Exclusive && !writable {
            return Err(StoreError::Lock(
                "exclusive lock requires a writable file handle".to_string(),
            ));
        }
        let clone = file.try_clone()?;
        Self::lock_with_retry(&clone, mode)?;
        Ok(Self { file: clone, mode })
    }

    /// Attempts a non-blocking acquisition, returning `None` when contended.
    pub fn try_acquire(file: &File, mode: LockMode, writable: bool) -> Result<Option<Self>> {
        if mode == LockMode::Exclusive && !writable {
            return Err(StoreError::Lock(
                "exclusive lock requires a writable file handle".to_string(),
            ));
        }
        let clone = file.try_clone()?;
        loop {
            let result = match mode {
                LockMode::Exclusive => clone.try_lock_exclusive(),
                LockMode::Shared => FileExt::try_lock_shared(&clone),
            };
            match result {
                Ok(()) => return Ok(Some(Self { file: clone, mode })),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(StoreError::Lock(err.to_string())),
            }
        }
    }

    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn downgrade_to_shared(&mut self) -> Result<()> {
        if self.mode == LockMode::Shared {
            return Ok(());
        }
        self.file
            .unlock()
            .map_err(|err| StoreError::Lock(err.to_string()))?;
        Self::lock_with_retry(&self.file, LockMode::Shared)?;
        self.mode = LockMode::Shared;
        Ok(())
    }

    pub fn upgrade_to_exclusive(&mut self) -> Result<()> {
        if self.mode == LockMode::Exclusive {
            return Ok(());
        }
        self.file
            .unlock()
            .map_err(|err| StoreError::Lock(err.to_string()))?;
        Self::lock_with_retry(&self.file, LockMode::Exclusive)?;
        self.mode = LockMode::Exclusive;
        Ok(())
    }

    fn lock_with_retry(file: &File, mode: LockMode) -> Result<()> {
        const MAX_ATTEMPTS: u32 = 200; // ~10 seconds with 50ms backoff
        const BACKOFF: Duration = Duration::from_millis(50);
        let mut attempts = 0;
        loop {
            let result = match mode {
                LockMode::Exclusive => file.try_lock_exclusive(),
                LockMode::Shared => FileExt::try_lock_shared(file),
            };
            match result {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    if attempts >= MAX_ATTEMPTS {
                        return Err(StoreError::Lock(
                            "exclusive access unavailable; file is in use by another process"
                                .to_string(),
                        ));
                    }
                    attempts += 1;
                    thread::sleep(BACKOFF);
                    continue;
                }
                Err(err) => return Err(StoreError::Lock(err.to_string())),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
