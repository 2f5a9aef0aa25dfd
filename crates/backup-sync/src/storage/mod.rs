//! Storage backends that hold backup artifacts.
//!

use core::fmt;
use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use thiserror::Error;

mod cloud;
mod ftp;
mod local;

pub use cloud::{CloudBackend, CreateCloudBackendError};
pub use ftp::FtpBackend;
pub use local::LocalBackend;

/// Identifies a container on a backend: a directory path, remote path or folder id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An artifact as listed by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The artifact's file name, identical on every backend.
    pub name: String,

    /// When the artifact was last modified, `None` if the backend could not say.
    pub modified: Option<DateTime<Utc>>,

    /// The backend specific identifier used to delete the entry.
    pub id: String,
}

/// A storage location that can contain, list and delete artifacts.
pub trait StorageBackend {
    /// A short name for logs.
    fn name(&self) -> &str;

    /// Open a session on the backend.
    ///
    /// Any connection the session holds is released when it is dropped.
    fn open(&self) -> Result<Box<dyn StorageSession + '_>, StorageError>;
}

/// The operations available on an open backend.
pub trait StorageSession {
    /// The container datasets live under.
    fn root(&self) -> ContainerId;

    /// The names of the containers directly under `parent`.
    fn list_containers(&mut self, parent: &ContainerId) -> Result<Vec<String>, StorageError>;

    /// The entries directly inside `container`. An empty container is not an error.
    fn list_entries(&mut self, container: &ContainerId) -> Result<Vec<Entry>, StorageError>;

    /// Find the container called `name` under `parent`, creating it if it does not exist.
    fn ensure_container(
        &mut self,
        name: &str,
        parent: &ContainerId,
    ) -> Result<ContainerId, StorageError>;

    /// Delete an entry. After a failure the entry must be assumed to still exist.
    fn delete(&mut self, entry: &Entry) -> Result<(), StorageError>;

    /// Store the local file at `local_path` in `container` as `name`.
    fn put(
        &mut self,
        local_path: &Path,
        container: &ContainerId,
        name: &str,
    ) -> Result<(), StorageError>;
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend is unavailable: {0}")]
    Unavailable(#[source] BackendFailure),

    #[error("Failed to list '{0}': {1}")]
    ListFailed(String, #[source] BackendFailure),

    #[error("Failed to ensure container '{0}': {1}")]
    EnsureContainerFailed(String, #[source] BackendFailure),

    #[error("Failed to delete '{0}': {1}")]
    DeleteFailed(String, #[source] BackendFailure),

    #[error("Failed to upload {0:?} as '{1}': {2}")]
    UploadFailed(PathBuf, String, #[source] BackendFailure),
}

impl StorageError {
    /// If the whole backend should be considered down for the rest of the pass.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// The underlying cause of a storage error.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum BackendFailure {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Unexpected(String),
}
