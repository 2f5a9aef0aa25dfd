//! # common
//!

#![allow(dead_code)]

use core::cell::RefCell;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    rc::Rc,
    time::SystemTime,
};

use backup_sync::{
    BackendFailure, ContainerId, DumpError, Dumper, Entry, StorageBackend, StorageError,
    StorageSession,
};
use chrono::{DateTime, Utc};
use shared::{BackupArtifact, DatasetName, test::write_backup_file};

const ROOT: &str = "root";

/// What a [`MemoryBackend`] holds and how it should misbehave.
#[derive(Debug, Default)]
pub struct MemoryState {
    /// Dataset name to its entries.
    pub datasets: BTreeMap<String, Vec<Entry>>,
    /// Entry names whose delete fails.
    pub failing_deletes: BTreeSet<String>,
    /// Opening a session fails.
    pub offline: bool,
    /// Every session call fails as unavailable.
    pub connection_lost: bool,
    /// Every deleted entry name, in order.
    pub deleted: Vec<String>,
    /// Every uploaded `(dataset, name)`, in order.
    pub uploaded: Vec<(String, String)>,
    /// Sessions opened.
    pub sessions: usize,
}

/// A backend kept in memory. Clones share state so a test can inspect it after handing a clone
/// to the code under test.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    pub state: Rc<RefCell<MemoryState>>,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Rc::default(),
        }
    }

    /// Add an entry to `dataset` modified at `seconds` after the epoch.
    pub fn insert(&self, dataset: &str, name: &str, seconds: Option<i64>) {
        let modified = seconds.map(|seconds| DateTime::<Utc>::from_timestamp(seconds, 0).unwrap());
        self.state
            .borrow_mut()
            .datasets
            .entry(dataset.to_string())
            .or_default()
            .push(Entry {
                name: name.to_string(),
                modified,
                id: format!("{dataset}/{name}"),
            });
    }

    /// The sorted names in `dataset`.
    pub fn names(&self, dataset: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .borrow()
            .datasets
            .get(dataset)
            .map(|entries| entries.iter().map(|entry| entry.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn boxed(&self) -> Box<dyn StorageBackend> {
        Box::new(self.clone())
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<Box<dyn StorageSession + '_>, StorageError> {
        let mut state = self.state.borrow_mut();
        if state.offline {
            return Err(StorageError::Unavailable(BackendFailure::Unexpected(
                "offline".to_string(),
            )));
        }
        state.sessions += 1;

        Ok(Box::new(MemorySession {
            state: Rc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    state: Rc<RefCell<MemoryState>>,
}

impl MemorySession {
    fn check_connection(&self) -> Result<(), StorageError> {
        if self.state.borrow().connection_lost {
            Err(StorageError::Unavailable(BackendFailure::Unexpected(
                "connection lost".to_string(),
            )))
        } else {
            Ok(())
        }
    }
}

impl StorageSession for MemorySession {
    fn root(&self) -> ContainerId {
        ContainerId(ROOT.to_string())
    }

    fn list_containers(&mut self, _parent: &ContainerId) -> Result<Vec<String>, StorageError> {
        self.check_connection()?;
        Ok(self.state.borrow().datasets.keys().cloned().collect())
    }

    fn list_entries(&mut self, container: &ContainerId) -> Result<Vec<Entry>, StorageError> {
        self.check_connection()?;
        Ok(self
            .state
            .borrow()
            .datasets
            .get(&container.0)
            .cloned()
            .unwrap_or_default())
    }

    fn ensure_container(
        &mut self,
        name: &str,
        _parent: &ContainerId,
    ) -> Result<ContainerId, StorageError> {
        self.check_connection()?;
        self.state
            .borrow_mut()
            .datasets
            .entry(name.to_string())
            .or_default();
        Ok(ContainerId(name.to_string()))
    }

    fn delete(&mut self, entry: &Entry) -> Result<(), StorageError> {
        self.check_connection()?;
        let mut state = self.state.borrow_mut();

        if state.failing_deletes.contains(&entry.name) {
            return Err(StorageError::DeleteFailed(
                entry.name.clone(),
                BackendFailure::Unexpected("permission denied".to_string()),
            ));
        }

        for entries in state.datasets.values_mut() {
            entries.retain(|existing| existing.id != entry.id);
        }
        state.deleted.push(entry.name.clone());

        Ok(())
    }

    fn put(
        &mut self,
        _local_path: &Path,
        container: &ContainerId,
        name: &str,
    ) -> Result<(), StorageError> {
        self.check_connection()?;
        let mut state = self.state.borrow_mut();

        state
            .datasets
            .entry(container.0.clone())
            .or_default()
            .push(Entry {
                name: name.to_string(),
                modified: Some(Utc::now()),
                id: format!("{}/{name}", container.0),
            });
        state.uploaded.push((container.0.clone(), name.to_string()));

        Ok(())
    }
}

/// A dumper that writes a small file per dataset, failing for the configured datasets.
#[derive(Debug, Default)]
pub struct TestDumper {
    pub failing: BTreeSet<String>,
    pub modified: Option<SystemTime>,
}

impl Dumper for TestDumper {
    fn dump(&self, dataset: &DatasetName, directory: &Path) -> Result<BackupArtifact, DumpError> {
        if self.failing.contains(dataset.as_str()) {
            return Err(DumpError::RunCommand(std::io::Error::other("mysqldump not found")));
        }

        let name = format!("{dataset}_20240309_070501.sql");
        let path = write_backup_file(
            &directory.join(dataset.as_str()),
            &name,
            self.modified.unwrap_or_else(SystemTime::now),
        );

        Ok(BackupArtifact::from_file(dataset.clone(), &path).unwrap())
    }
}

pub fn dataset(name: &str) -> DatasetName {
    DatasetName::try_from(name).unwrap()
}

pub fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|name| name.to_string()).collect()
}
