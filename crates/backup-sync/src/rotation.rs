//! Rotation across every backend.
//!
//! The local backend decides which artifacts survive, every remote backend is then made to match
//! by name. Remote backends never count or sort their own listings.
//!

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info, warn};

use crate::{
    context::Context,
    retention,
    storage::{ContainerId, StorageBackend, StorageError, StorageSession},
};

/// The artifact names each dataset retains after a rotation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeepSet {
    datasets: BTreeMap<String, BTreeSet<String>>,
}

impl KeepSet {
    /// Record the names `dataset` keeps.
    pub fn insert(&mut self, dataset: String, names: BTreeSet<String>) {
        self.datasets.insert(dataset, names);
    }

    /// The names `dataset` keeps, `None` if the dataset was not rotated locally.
    pub fn get(&self, dataset: &str) -> Option<&BTreeSet<String>> {
        self.datasets.get(dataset)
    }

    /// Each rotated dataset with the names it keeps.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.datasets
            .iter()
            .map(|(dataset, names)| (dataset.as_str(), names))
    }

    /// If no dataset was rotated.
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// A failure during a rotation pass.
#[derive(Debug)]
pub struct RotationFailure {
    /// The backend it happened on.
    pub backend: String,

    /// The dataset being rotated, `None` if the whole backend failed.
    pub dataset: Option<String>,

    /// What went wrong.
    pub error: StorageError,
}

/// The outcome of a rotation pass.
#[derive(Debug, Default)]
pub struct RotationReport {
    /// The keep-set computed from the local backend.
    pub keep_set: KeepSet,

    /// How many entries were deleted across all backends.
    pub deleted: usize,

    /// Everything that went wrong. The pass carries on past each of these.
    pub failures: Vec<RotationFailure>,
}

impl RotationReport {
    /// If the pass completed without any failure.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, backend: &str, dataset: Option<String>, error: StorageError) {
        self.failures.push(RotationFailure {
            backend: backend.to_string(),
            dataset,
            error,
        });
    }
}

/// Applies the retention policy to the local backend and mirrors the result on the remotes.
pub struct RotationCoordinator<'a> {
    local: &'a dyn StorageBackend,
    remotes: &'a [Box<dyn StorageBackend>],
    retention_count: usize,
}

impl<'a> RotationCoordinator<'a> {
    /// A coordinator over the given backends.
    pub fn new(
        local: &'a dyn StorageBackend,
        remotes: &'a [Box<dyn StorageBackend>],
        retention_count: usize,
    ) -> Self {
        Self {
            local,
            remotes,
            retention_count,
        }
    }

    /// Run a full rotation pass, leaving the datasets in `skip` untouched on every backend.
    pub fn rotate(&self, skip: &BTreeSet<String>) -> RotationReport {
        let mut report = RotationReport::default();

        // Step 1: Rotate locally and gather the names to keep
        let keep_set = self.rotate_local(skip, &mut report);

        // Step 2: Propagate to every remote
        for remote in self.remotes {
            self.rotate_remote(remote.as_ref(), &keep_set, &mut report);
        }

        report.keep_set = keep_set;

        if report.is_success() {
            info!("Rotation completed, deleted {} files", report.deleted);
        } else {
            warn!(
                "Rotation completed with {} failures, deleted {} files",
                report.failures.len(),
                report.deleted
            );
        }

        report
    }

    fn rotate_local(&self, skip: &BTreeSet<String>, report: &mut RotationReport) -> KeepSet {
        let mut keep_set = KeepSet::default();
        let mut context = Context::stage("Rotate");
        context.backend = Some(self.local.name().to_string());

        let mut session = match self.local.open() {
            Ok(session) => session,
            Err(error) => {
                error!("{context}Could not open backend: {error}");
                report.fail(self.local.name(), None, error);
                return keep_set;
            }
        };
        let root = session.root();

        let datasets = match session.list_containers(&root) {
            Ok(datasets) => datasets,
            Err(error) => {
                error!("{context}Could not list datasets: {error}");
                report.fail(self.local.name(), None, error);
                return keep_set;
            }
        };

        if datasets.is_empty() {
            info!("{context}No dataset directories found");
        }

        for dataset in datasets {
            context.dataset = Some(dataset.clone());

            if skip.contains(&dataset) {
                warn!("{context}Skipped, no new artifact was produced");
                continue;
            }

            match self.rotate_local_dataset(&context, session.as_mut(), &root, &dataset, report) {
                Ok(Some(keep)) => keep_set.insert(dataset, keep),
                Ok(None) => {}
                Err(error) => {
                    error!("{context}Skipped: {error}");
                    report.fail(self.local.name(), Some(dataset), error);
                }
            }
        }

        keep_set
    }

    /// Returns the names kept, `None` if the dataset has no files.
    fn rotate_local_dataset(
        &self,
        context: &Context,
        session: &mut dyn StorageSession,
        root: &ContainerId,
        dataset: &str,
        report: &mut RotationReport,
    ) -> Result<Option<BTreeSet<String>>, StorageError> {
        let container = session.ensure_container(dataset, root)?;
        let entries = session.list_entries(&container)?;

        // An empty directory says nothing about what the remotes should hold.
        if entries.is_empty() {
            warn!("{context}No local files found");
            return Ok(None);
        }

        let partition = retention::partition(entries, self.retention_count);

        for entry in partition.purge {
            match session.delete(&entry) {
                Ok(()) => {
                    info!("{context}Deleted old backup {}", entry.name);
                    report.deleted += 1;
                }
                Err(error) => {
                    error!("{context}{error}");
                    report.fail(self.local.name(), Some(dataset.to_string()), error);
                }
            }
        }

        Ok(Some(
            partition.keep.into_iter().map(|entry| entry.name).collect(),
        ))
    }

    fn rotate_remote(
        &self,
        backend: &dyn StorageBackend,
        keep_set: &KeepSet,
        report: &mut RotationReport,
    ) {
        let mut context = Context::stage("Rotate");
        context.backend = Some(backend.name().to_string());

        if keep_set.is_empty() {
            info!("{context}Nothing to rotate");
            return;
        }

        let mut session = match backend.open() {
            Ok(session) => session,
            Err(error) => {
                error!("{context}Could not open backend: {error}");
                report.fail(backend.name(), None, error);
                return;
            }
        };
        let root = session.root();

        for (dataset, keep) in keep_set.iter() {
            context.dataset = Some(dataset.to_string());

            let result = self.rotate_remote_dataset(
                &context,
                backend,
                session.as_mut(),
                &root,
                dataset,
                keep,
                report,
            );

            if let Err(error) = result {
                let unavailable = error.is_unavailable();
                error!("{context}Skipped: {error}");
                report.fail(backend.name(), Some(dataset.to_string()), error);

                if unavailable {
                    error!("{context}Backend unavailable, abandoning its remaining datasets");
                    return;
                }
            }
        }

        info!("[{}] [Rotate] Rotation completed", backend.name());
    }

    /// Delete every entry whose name is not kept. Fails early only if the dataset cannot be
    /// listed or the backend becomes unavailable.
    #[allow(clippy::too_many_arguments)]
    fn rotate_remote_dataset(
        &self,
        context: &Context,
        backend: &dyn StorageBackend,
        session: &mut dyn StorageSession,
        root: &ContainerId,
        dataset: &str,
        keep: &BTreeSet<String>,
        report: &mut RotationReport,
    ) -> Result<(), StorageError> {
        let container = session.ensure_container(dataset, root)?;
        let entries = session.list_entries(&container)?;

        for entry in entries.iter().filter(|entry| !keep.contains(&entry.name)) {
            match session.delete(entry) {
                Ok(()) => {
                    info!("{context}Deleted old backup {}", entry.name);
                    report.deleted += 1;
                }
                Err(error) if error.is_unavailable() => return Err(error),
                Err(error) => {
                    error!("{context}{error}");
                    report.fail(backend.name(), Some(dataset.to_string()), error);
                }
            }
        }

        Ok(())
    }
}
