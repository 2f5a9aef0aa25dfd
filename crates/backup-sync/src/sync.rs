//! Uploading new artifacts to the remote backends.
//!

use shared::BackupArtifact;
use tracing::{error, info, warn};

use crate::{
    context::Context,
    storage::{StorageBackend, StorageError, StorageSession},
};

/// A failed upload.
#[derive(Debug)]
pub struct SyncFailure {
    /// The backend the upload was for.
    pub backend: String,

    /// The artifact that was not uploaded, `None` if the backend could not be opened at all.
    pub artifact: Option<String>,

    /// What went wrong.
    pub error: StorageError,
}

/// The outcome of a sync pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// How many uploads succeeded across all backends.
    pub uploaded: usize,

    /// Every upload that failed. Uploads skipped once a backend became unavailable are not
    /// listed.
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    /// If every artifact reached every backend.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fans artifacts out to every remote backend.
pub struct SyncOrchestrator<'a> {
    remotes: &'a [Box<dyn StorageBackend>],
}

impl<'a> SyncOrchestrator<'a> {
    /// An orchestrator over the given remotes.
    pub fn new(remotes: &'a [Box<dyn StorageBackend>]) -> Self {
        Self { remotes }
    }

    /// Upload each artifact to each remote, one session per remote.
    pub fn upload(&self, artifacts: &[BackupArtifact]) -> SyncReport {
        let mut report = SyncReport::default();

        if artifacts.is_empty() {
            info!("[Sync] No artifacts to upload");
            return report;
        }

        for backend in self.remotes {
            upload_to(backend.as_ref(), artifacts, &mut report);
        }

        if report.is_success() {
            info!("[Sync] Uploaded {} files", report.uploaded);
        } else {
            warn!(
                "[Sync] Uploaded {} files with {} failures",
                report.uploaded,
                report.failures.len()
            );
        }

        report
    }
}

fn upload_to(backend: &dyn StorageBackend, artifacts: &[BackupArtifact], report: &mut SyncReport) {
    let mut context = Context::stage("Sync");
    context.backend = Some(backend.name().to_string());

    let mut session = match backend.open() {
        Ok(session) => session,
        Err(error) => {
            error!("{context}Could not open backend: {error}");
            report.failures.push(SyncFailure {
                backend: backend.name().to_string(),
                artifact: None,
                error,
            });
            return;
        }
    };

    for artifact in artifacts {
        context.dataset = Some(artifact.dataset.to_string());

        match put(session.as_mut(), artifact) {
            Ok(()) => {
                info!("{context}Uploaded {}", artifact.name);
                report.uploaded += 1;
            }
            Err(error) => {
                let unavailable = error.is_unavailable();
                error!("{context}{error}");
                report.failures.push(SyncFailure {
                    backend: backend.name().to_string(),
                    artifact: Some(artifact.name.clone()),
                    error,
                });

                if unavailable {
                    error!("{context}Backend unavailable, abandoning its remaining uploads");
                    return;
                }
            }
        }
    }
}

fn put(session: &mut dyn StorageSession, artifact: &BackupArtifact) -> Result<(), StorageError> {
    let root = session.root();
    let container = session.ensure_container(artifact.dataset.as_str(), &root)?;
    session.put(&artifact.path, &container, &artifact.name)
}
