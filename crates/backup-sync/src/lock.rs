//! Single instance lock.
//!

use std::{
    fs::{File, OpenOptions, TryLockError},
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

/// An exclusive advisory lock on a file, held until dropped.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    _file: File,
}

impl InstanceLock {
    /// Try to take the lock without waiting.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(LockError::Open)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(LockError::Held(path.to_path_buf())),
            Err(TryLockError::Error(error)) => return Err(LockError::Lock(error)),
        }

        info!("Acquired lock {path:?}");

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// The locked file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Failed to open the lock file:\n{0}")]
    Open(#[source] io::Error),

    #[error("Another run holds the lock {0:?}")]
    Held(PathBuf),

    #[error("Failed to lock the lock file:\n{0}")]
    Lock(#[source] io::Error),
}
