//! # Backup sync
//! Dumps the configured databases, uploads the dumps and rotates old dumps on every backend.
//!

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::{fs, path::Path, process::ExitCode};

use backup_sync::{
    CloudBackend, Config, FtpBackend, InstanceLock, LocalBackend, MysqlDump, Pipeline,
    StorageBackend,
};
use mimalloc::MiMalloc;
use shared::{Failure, init_logger};
use tracing::{error, info};

/// Configuration, logging, locking or backend construction failed.
const SETUP_FAILED: u8 = 2;

fn main() -> ExitCode {
    let _logger = match init_logger(Path::new("./logs"), "backup-sync") {
        Ok(guards) => guards,
        Err(error) => {
            eprintln!("Could not initialize logging: {error}");
            return ExitCode::from(SETUP_FAILED);
        }
    };

    // Initialize config if args include 'init'.
    if std::env::args().any(|arg| arg.eq("init")) {
        let config = Config::default();
        let contents =
            toml::to_string_pretty(&config).or_log_and_panic("Could not serialize config");
        fs::write("config.toml", contents).or_log_and_panic("Could not write config.toml");
        info!("Wrote default config.toml");
        return ExitCode::SUCCESS;
    }

    // Load config
    let config = match Config::load_toml(Path::new("./config.toml")) {
        Ok(config) => config,
        Err(error) => {
            error!("Could not load config: {error}");
            return ExitCode::from(SETUP_FAILED);
        }
    };

    if let Err(error) = fs::create_dir_all(&config.backup.local_path) {
        error!(
            "Could not create local backup directory {:?}: {error}",
            config.backup.local_path
        );
        return ExitCode::from(SETUP_FAILED);
    }

    // Stop a second run from racing this one
    let _lock = match InstanceLock::acquire(&config.backup.lock_file()) {
        Ok(lock) => lock,
        Err(error) => {
            error!("Could not acquire lock: {error}");
            return ExitCode::from(SETUP_FAILED);
        }
    };

    // Create backends
    let local = LocalBackend::new(config.backup.local_path.clone());
    let mut remotes: Vec<Box<dyn StorageBackend>> = Vec::new();

    if let Some(ftp) = config.ftp.clone() {
        remotes.push(Box::new(FtpBackend::new(ftp)));
    }

    if let Some(cloud) = config.cloud.clone() {
        match CloudBackend::new(cloud) {
            Ok(backend) => remotes.push(Box::new(backend)),
            Err(error) => {
                error!("Could not create cloud backend: {error}");
                return ExitCode::from(SETUP_FAILED);
            }
        }
    }

    if remotes.is_empty() {
        info!("No remote backends are configured, only local backups will be kept");
    }

    let dumper = MysqlDump::new(config.database.clone());
    let pipeline = Pipeline::new(
        &config.database.datasets,
        &dumper,
        &local,
        &remotes,
        config.backup.retention_count,
    );

    let report = pipeline.run();

    ExitCode::from(report.exit_code())
}
