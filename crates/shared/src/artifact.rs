use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::DatasetName;

/// The file extension of every dump artifact.
pub const ARTIFACT_EXTENSION: &str = "sql";

/// The file name for a dataset's dump taken at `at`: `<dataset>_<YYYYMMDD_HHMMSS>.sql`.
///
/// The name is the identity of an artifact on every backend, it must never be rewritten when the
/// artifact is copied.
pub fn artifact_file_name(dataset: &DatasetName, at: NaiveDateTime) -> String {
    format!(
        "{dataset}_{}.{ARTIFACT_EXTENSION}",
        at.format("%Y%m%d_%H%M%S")
    )
}

/// One dump output file for one dataset at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    /// The dataset this artifact belongs to.
    pub dataset: DatasetName,

    /// The file name, identical on every backend.
    pub name: String,

    /// Where the artifact lives on local disk.
    pub path: PathBuf,

    /// When the artifact was created.
    pub created_at: DateTime<Utc>,

    /// The artifact's size, if it could be read.
    pub size_bytes: Option<u64>,
}

impl BackupArtifact {
    /// Describe an artifact that already exists on local disk.
    pub fn from_file(dataset: DatasetName, path: &Path) -> io::Result<Self> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{path:?} has no valid UTF-8 file name"),
                )
            })?
            .to_string();

        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{path:?} is not a file"),
            ));
        }

        let created_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Self {
            dataset,
            name,
            path: path.to_path_buf(),
            created_at,
            size_bytes: Some(metadata.len()),
        })
    }
}
