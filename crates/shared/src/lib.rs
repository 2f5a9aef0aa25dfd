//! # Shared
//! Components shared between the backup pipeline and its tests.
//!

#![warn(missing_docs)]

mod artifact;
mod dataset;
mod failure;
mod logger;

pub use artifact::{ARTIFACT_EXTENSION, BackupArtifact, artifact_file_name};
pub use dataset::{DatasetName, DatasetNameError};
pub use failure::Failure;
pub use logger::{LoggerError, init_logger};
