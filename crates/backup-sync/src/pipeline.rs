//! One invocation: dump, then sync, then rotate.
//!

use std::collections::BTreeSet;

use shared::{BackupArtifact, DatasetName};
use tracing::{error, info};

use crate::{
    context::Context,
    dump::{DumpError, Dumper},
    rotation::{RotationCoordinator, RotationReport},
    storage::{LocalBackend, StorageBackend},
    sync::{SyncOrchestrator, SyncReport},
};

/// A dataset whose dump failed.
#[derive(Debug)]
pub struct DumpFailure {
    /// The dataset.
    pub dataset: DatasetName,

    /// What went wrong.
    pub error: DumpError,
}

/// The outcome of every stage.
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// The artifacts dumped this run.
    pub artifacts: Vec<BackupArtifact>,

    /// The datasets that produced no artifact.
    pub dump_failures: Vec<DumpFailure>,

    /// The sync stage.
    pub sync: SyncReport,

    /// The rotation stage.
    pub rotation: RotationReport,
}

impl PipelineReport {
    /// If every stage completed without failure.
    pub fn is_success(&self) -> bool {
        self.dump_failures.is_empty() && self.sync.is_success() && self.rotation.is_success()
    }

    /// The process exit code for this run, `0` on success and `1` on any partial failure.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// The configured stages of a run.
pub struct Pipeline<'a> {
    datasets: &'a [DatasetName],
    dumper: &'a dyn Dumper,
    local: &'a LocalBackend,
    remotes: &'a [Box<dyn StorageBackend>],
    retention_count: usize,
}

impl<'a> Pipeline<'a> {
    /// A pipeline over the given collaborators.
    pub fn new(
        datasets: &'a [DatasetName],
        dumper: &'a dyn Dumper,
        local: &'a LocalBackend,
        remotes: &'a [Box<dyn StorageBackend>],
        retention_count: usize,
    ) -> Self {
        Self {
            datasets,
            dumper,
            local,
            remotes,
            retention_count,
        }
    }

    /// Run every stage once. Failures are recorded, no stage stops a later one.
    pub fn run(&self) -> PipelineReport {
        let mut report = PipelineReport::default();

        // Dump
        for dataset in self.datasets {
            let mut context = Context::stage("Dump");
            context.dataset = Some(dataset.to_string());

            match self.dumper.dump(dataset, self.local.root()) {
                Ok(artifact) => {
                    info!("{context}Dumped {}", artifact.name);
                    report.artifacts.push(artifact);
                }
                Err(error) => {
                    error!("{context}{error}");
                    report.dump_failures.push(DumpFailure {
                        dataset: dataset.clone(),
                        error,
                    });
                }
            }
        }

        // Sync
        report.sync = SyncOrchestrator::new(self.remotes).upload(&report.artifacts);

        // Rotate, leaving failed datasets as they are
        let skip: BTreeSet<String> = report
            .dump_failures
            .iter()
            .map(|failure| failure.dataset.to_string())
            .collect();
        report.rotation =
            RotationCoordinator::new(self.local, self.remotes, self.retention_count).rotate(&skip);

        if report.is_success() {
            info!("Backup run completed");
        } else {
            error!(
                "Backup run completed with {} dump, {} sync and {} rotation failures",
                report.dump_failures.len(),
                report.sync.failures.len(),
                report.rotation.failures.len()
            );
        }

        report
    }
}
