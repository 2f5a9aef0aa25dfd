use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use shared::Failure;
use tracing::warn;

use super::{BackendFailure, ContainerId, Entry, StorageBackend, StorageError, StorageSession};

/// Backups on the local filesystem, one directory per dataset.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// A backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    fn open(&self) -> Result<Box<dyn StorageSession + '_>, StorageError> {
        // Check the root exists and is a directory
        let metadata =
            fs::metadata(&self.root).map_err(|e| StorageError::Unavailable(e.into()))?;
        if !metadata.is_dir() {
            return Err(StorageError::Unavailable(BackendFailure::Unexpected(format!(
                "{:?} is not a directory",
                self.root
            ))));
        }

        Ok(Box::new(LocalSession { backend: self }))
    }
}

struct LocalSession<'a> {
    backend: &'a LocalBackend,
}

impl LocalSession<'_> {
    fn read_directory(
        &self,
        container: &ContainerId,
        want_directories: bool,
    ) -> Result<Vec<(String, fs::Metadata, PathBuf)>, StorageError> {
        let directory = fs::read_dir(&container.0)
            .map_err(|e| StorageError::ListFailed(container.0.clone(), e.into()))?;

        let entries = directory
            .filter_map(|entry| {
                let entry = entry
                    .or_log(&format!("Could not read an entry of '{container}'"))?;
                let path = entry.path();

                let metadata = entry
                    .metadata()
                    .or_log(&format!("Could not get entry {path:?} metadata"))?;

                let wanted = if want_directories {
                    metadata.is_dir()
                } else {
                    metadata.is_file()
                };
                if !wanted {
                    return None;
                }

                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    warn!("Skipping {path:?}, its name is not valid UTF-8");
                    return None;
                };

                Some((name, metadata, path))
            })
            .collect();

        Ok(entries)
    }
}

impl StorageSession for LocalSession<'_> {
    fn root(&self) -> ContainerId {
        ContainerId(self.backend.root.to_string_lossy().to_string())
    }

    fn list_containers(&mut self, parent: &ContainerId) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .read_directory(parent, true)?
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        names.sort();

        Ok(names)
    }

    fn list_entries(&mut self, container: &ContainerId) -> Result<Vec<Entry>, StorageError> {
        let entries = self
            .read_directory(container, false)?
            .into_iter()
            .map(|(name, metadata, path)| {
                let modified = metadata
                    .modified()
                    .or_log(&format!("Could not get {path:?} modification time"))
                    .map(DateTime::<Utc>::from);

                Entry {
                    name,
                    modified,
                    id: path.to_string_lossy().to_string(),
                }
            })
            .collect();

        Ok(entries)
    }

    fn ensure_container(
        &mut self,
        name: &str,
        parent: &ContainerId,
    ) -> Result<ContainerId, StorageError> {
        let directory = Path::new(&parent.0).join(name);
        let failed = |failure: BackendFailure| {
            StorageError::EnsureContainerFailed(name.to_string(), failure)
        };

        match fs::metadata(&directory) {
            // If the directory exists, ensure it is a directory
            Ok(metadata) => {
                if !metadata.is_dir() {
                    return Err(failed(BackendFailure::Unexpected(format!(
                        "{directory:?} is not a directory"
                    ))));
                }
            }

            // If it does not exist, create it.
            Err(error) if error.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&directory).map_err(|e| failed(e.into()))?;
            }

            Err(error) => return Err(failed(error.into())),
        }

        Ok(ContainerId(directory.to_string_lossy().to_string()))
    }

    fn delete(&mut self, entry: &Entry) -> Result<(), StorageError> {
        fs::remove_file(&entry.id)
            .map_err(|e| StorageError::DeleteFailed(entry.id.clone(), e.into()))
    }

    fn put(
        &mut self,
        local_path: &Path,
        container: &ContainerId,
        name: &str,
    ) -> Result<(), StorageError> {
        let destination = Path::new(&container.0).join(name);
        let failed = |failure: BackendFailure| {
            StorageError::UploadFailed(local_path.to_path_buf(), name.to_string(), failure)
        };

        // Already in place
        let same_file = match (fs::canonicalize(local_path), fs::canonicalize(&destination)) {
            (Ok(source), Ok(destination)) => source == destination,
            _ => false,
        };
        if same_file {
            return Ok(());
        }

        fs::copy(local_path, &destination).map_err(|e| failed(e.into()))?;

        Ok(())
    }
}
