//! Backup sync config
//!

use core::time::Duration;
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use shared::DatasetName;
use thiserror::Error;

/// The connection to the database server. Only the dump step reads this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// The database host.
    #[serde(default = "default_database_host")]
    pub host: String,

    /// The database port.
    #[serde(default = "default_database_port")]
    pub port: u16,

    /// The database user.
    pub user: String,

    /// The database user's password.
    #[serde(default)]
    pub password: String,

    /// The datasets to back up, one per database.
    pub datasets: Vec<DatasetName>,

    /// The dump utility to run.
    #[serde(default = "default_dump_command")]
    pub dump_command: String,
}

/// Where backups are kept locally and how many survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// The local backend's root directory.
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    /// How many of the most recent artifacts are kept per dataset.
    pub retention_count: usize,

    /// The file used to stop two runs from racing, defaults to a file in `local_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,
}

impl BackupConfig {
    /// The lock file path to use.
    pub fn lock_file(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| self.local_path.join(".backup-sync.lock"))
    }
}

/// The FTP remote backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpConfig {
    /// The FTP server's host name.
    pub server: String,

    /// The FTP server's port.
    #[serde(default = "default_ftp_port")]
    pub port: u16,

    /// The FTP user.
    pub user: String,

    /// The FTP user's password.
    #[serde(default)]
    pub password: String,

    /// The remote directory datasets are stored under.
    pub remote_path: String,

    /// Connect, read and write timeout for every FTP call.
    #[serde(default = "default_ftp_timeout")]
    pub timeout_seconds: u64,
}

impl FtpConfig {
    /// The timeout for every FTP call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// The cloud storage remote backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    /// A file containing an OAuth access token authorized for the drive.
    pub token_file: PathBuf,

    /// The id of the folder datasets are stored under.
    pub root_folder_id: String,

    /// The timeout for every cloud request.
    #[serde(default = "default_cloud_timeout")]
    pub timeout_seconds: u64,

    /// The base URL of the metadata API.
    #[serde(default = "default_cloud_api_url")]
    pub api_url: String,

    /// The base URL of the upload API.
    #[serde(default = "default_cloud_upload_url")]
    pub upload_url: String,
}

impl CloudConfig {
    /// The timeout for every cloud request.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// The backup sync config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The database to dump.
    pub database: DatabaseConfig,

    /// The local backend and retention.
    pub backup: BackupConfig,

    /// The FTP backend, enabled when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ftp: Option<FtpConfig>,

    /// The cloud backend, enabled when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudConfig>,
}

impl Config {
    /// Tries to load a config from a toml file.
    pub fn load_toml(file_path: &Path) -> Result<Self, LoadConfigError> {
        if !file_path.exists() {
            return Err(LoadConfigError::NoFile);
        }

        let contents = fs::read_to_string(file_path).map_err(LoadConfigError::Read)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks the values that deserialization alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.datasets.is_empty() {
            return Err(ConfigError::NoDatasets);
        }

        if let Some(duplicate) = self
            .database
            .datasets
            .iter()
            .enumerate()
            .find(|(index, dataset)| {
                self.database
                    .datasets
                    .iter()
                    .take(*index)
                    .any(|earlier| earlier == *dataset)
            })
            .map(|(_, dataset)| dataset)
        {
            return Err(ConfigError::DuplicateDataset(duplicate.clone()));
        }

        non_empty("database.user", &self.database.user)?;
        non_empty("database.dump_command", &self.database.dump_command)?;
        non_zero("database.port", self.database.port.into())?;

        if self.backup.local_path.as_os_str().is_empty() {
            return Err(ConfigError::Empty("backup.local_path"));
        }

        if let Some(ftp) = &self.ftp {
            non_empty("ftp.server", &ftp.server)?;
            non_empty("ftp.user", &ftp.user)?;
            non_empty("ftp.remote_path", &ftp.remote_path)?;
            non_zero("ftp.port", ftp.port.into())?;
            non_zero("ftp.timeout_seconds", ftp.timeout_seconds)?;
        }

        if let Some(cloud) = &self.cloud {
            non_empty("cloud.root_folder_id", &cloud.root_folder_id)?;
            non_empty("cloud.api_url", &cloud.api_url)?;
            non_empty("cloud.upload_url", &cloud.upload_url)?;
            non_zero("cloud.timeout_seconds", cloud.timeout_seconds)?;
            if cloud.token_file.as_os_str().is_empty() {
                return Err(ConfigError::Empty("cloud.token_file"));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: default_database_host(),
                port: default_database_port(),
                user: "backup".to_string(),
                password: String::new(),
                datasets: DatasetName::try_from("example").into_iter().collect(),
                dump_command: default_dump_command(),
            },
            backup: BackupConfig {
                local_path: default_local_path(),
                retention_count: 7,
                lock_file: None,
            },
            ftp: None,
            cloud: None,
        }
    }
}

fn non_empty(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty(key))
    } else {
        Ok(())
    }
}

fn non_zero(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(key))
    } else {
        Ok(())
    }
}

fn default_database_host() -> String {
    "localhost".to_string()
}

fn default_database_port() -> u16 {
    3306
}

fn default_dump_command() -> String {
    "mysqldump".to_string()
}

fn default_local_path() -> PathBuf {
    PathBuf::from("./backup")
}

fn default_ftp_port() -> u16 {
    21
}

fn default_ftp_timeout() -> u64 {
    30
}

fn default_cloud_timeout() -> u64 {
    120
}

fn default_cloud_api_url() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

fn default_cloud_upload_url() -> String {
    "https://www.googleapis.com/upload/drive/v3".to_string()
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("The file does not exist.")]
    NoFile,

    #[error("Failed to read the file:\n{0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to deserialize the file:\n{0}")]
    Deserialize(#[from] toml::de::Error),

    #[error("The config is invalid:\n{0}")]
    Invalid(#[from] ConfigError),
}

#[allow(missing_docs)]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No datasets are configured")]
    NoDatasets,

    #[error("Dataset '{0}' is configured more than once")]
    DuplicateDataset(DatasetName),

    #[error("'{0}' must not be empty")]
    Empty(&'static str),

    #[error("'{0}' must not be zero")]
    Zero(&'static str),
}
