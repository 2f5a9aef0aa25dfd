//! Dumping databases to artifacts.
//!

use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use chrono::Local;
use shared::{BackupArtifact, DatasetName, Failure, artifact_file_name};
use thiserror::Error;

use crate::config::DatabaseConfig;

/// Something that can dump a dataset to a file.
pub trait Dumper {
    /// Dump `dataset` into `directory`, returning the artifact produced.
    ///
    /// Any error means no artifact was produced for this dataset.
    fn dump(&self, dataset: &DatasetName, directory: &Path) -> Result<BackupArtifact, DumpError>;
}

/// Dumps MySQL databases with `mysqldump`.
#[derive(Debug, Clone)]
pub struct MysqlDump {
    config: DatabaseConfig,
}

impl MysqlDump {
    /// A dumper for the configured server.
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    /// The arguments for dumping `dataset` to `output`. The password is passed separately.
    pub fn arguments(&self, dataset: &DatasetName, output: &Path) -> Vec<String> {
        vec![
            format!("--host={}", self.config.host),
            format!("--port={}", self.config.port),
            format!("--user={}", self.config.user),
            format!("--result-file={}", output.to_string_lossy()),
            dataset.to_string(),
        ]
    }

    fn run(&self, dataset: &DatasetName, output: &Path) -> Result<DumpOutput, DumpError> {
        let result = Command::new(&self.config.dump_command)
            .args(self.arguments(dataset, output))
            .env("MYSQL_PWD", &self.config.password)
            .output()
            .map_err(DumpError::RunCommand)?;

        Ok(DumpOutput {
            path: output.to_path_buf(),
            status: result.status,
            stderr: String::from_utf8_lossy(&result.stderr).to_string(),
        })
    }
}

/// What the dump command left behind.
#[derive(Debug)]
pub struct DumpOutput {
    /// Where the dump was written.
    pub path: PathBuf,

    /// The dump command's exit status.
    pub status: ExitStatus,

    /// The dump command's error output.
    pub stderr: String,
}

impl Dumper for MysqlDump {
    fn dump(&self, dataset: &DatasetName, directory: &Path) -> Result<BackupArtifact, DumpError> {
        let dataset_directory = directory.join(dataset.as_str());
        fs::create_dir_all(&dataset_directory).map_err(DumpError::CreateDirectory)?;

        let name = artifact_file_name(dataset, Local::now().naive_local());
        let output = self.run(dataset, &dataset_directory.join(name))?;

        if !output.status.success() {
            // A failed dump may leave a partial file behind, it must not be mistaken for a backup.
            if output.path.exists() {
                fs::remove_file(&output.path).or_log("Could not remove partial dump");
            }

            return Err(DumpError::CommandErrored(output.status, output.stderr));
        }

        BackupArtifact::from_file(dataset.clone(), &output.path).map_err(DumpError::ReadArtifact)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Failed to create the dataset directory:\n{0}")]
    CreateDirectory(#[source] io::Error),

    #[error("Failed to run command:\n{0}")]
    RunCommand(#[source] io::Error),

    #[error("Command exited with {0}:\n{1}")]
    CommandErrored(ExitStatus, String),

    #[error("Failed to read the dumped artifact:\n{0}")]
    ReadArtifact(#[source] io::Error),
}
