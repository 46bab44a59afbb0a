//! Exclusive run lock.
//!
//! Only one run may rewrite the ledger at a time. The lock is an advisory
//! `flock`-style lock on a file next to the ledger and is released when the
//! guard is dropped or the process exits.

use crate::utils::errors::{MirrorError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug)]
pub struct RunLock {
    _file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock at `path` without waiting.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| MirrorError::local(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| MirrorError::local(path, e))?;
        file.try_lock_exclusive()
            .map_err(|_| MirrorError::Locked(path.to_path_buf()))?;

        debug!("Acquired run lock {}", path.display());
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
