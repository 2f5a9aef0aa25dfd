//! # backup-sync
//! Dumps databases, copies the dumps to remote storage and rotates old dumps everywhere.
//!

mod config;
mod context;
mod dump;
mod lock;
mod pipeline;
mod retention;
mod rotation;
mod storage;
mod sync;

pub use config::{
    BackupConfig, CloudConfig, Config, ConfigError, DatabaseConfig, FtpConfig, LoadConfigError,
};
pub use context::Context;
pub use dump::{DumpError, DumpOutput, Dumper, MysqlDump};
pub use lock::{InstanceLock, LockError};
pub use pipeline::{DumpFailure, Pipeline, PipelineReport};
pub use retention::{Partition, partition};
pub use rotation::{KeepSet, RotationCoordinator, RotationFailure, RotationReport};
pub use storage::{
    BackendFailure, CloudBackend, ContainerId, CreateCloudBackendError, Entry, FtpBackend,
    LocalBackend, StorageBackend, StorageError, StorageSession,
};
pub use sync::{SyncFailure, SyncOrchestrator, SyncReport};
