//! Cross-process advisory locking.
//!
//! The lock file is the single serialization point for daemon-identity
//! decisions: every launch/restart decision for an identity happens while
//! holding this flock, whichever process the caller lives in.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{MetadataError, Result};

/// RAII guard over an identity's advisory lock file.
///
/// The flock is released when the guard drops; the kernel also releases it
/// if the holding process dies, so a crashed caller never wedges the lock.
#[derive(Debug)]
pub struct ProcessLockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl ProcessLockGuard {
    /// Acquires the lock at `path`, blocking until it is free.
    ///
    /// The flock syscall runs on a blocking task so contention never stalls
    /// the async runtime.
    ///
    /// # Errors
    /// Returns an error if the lock file cannot be opened or locked.
    pub async fn acquire(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<Self> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            tracing::debug!(path = %path.display(), "acquired process lock");
            Ok(Self { file, path })
        })
        .await
        .map_err(|e| MetadataError::Lock(format!("lock task failed: {e}")))?
    }

    /// Returns the path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release process lock");
        } else {
            tracing::debug!(path = %self.path.display(), "released process lock");
        }
    }
}
