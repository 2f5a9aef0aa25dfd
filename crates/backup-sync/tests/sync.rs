//! Tests for uploading artifacts
//!

use backup_sync::{Dumper, SyncOrchestrator};
use common::{MemoryBackend, TestDumper, dataset};
use shared::test::init_test_logger;

mod common;

#[test]
fn uploads_every_artifact_to_every_remote() {
    let _logger = init_test_logger();
    let directory = tempfile::tempdir().unwrap();

    let dumper = TestDumper::default();
    let artifacts = vec![
        dumper.dump(&dataset("orders"), directory.path()).unwrap(),
        dumper.dump(&dataset("users"), directory.path()).unwrap(),
    ];

    let ftp = MemoryBackend::new("ftp");
    let cloud = MemoryBackend::new("cloud");
    let remotes = vec![ftp.boxed(), cloud.boxed()];

    let report = SyncOrchestrator::new(&remotes).upload(&artifacts);

    assert!(report.is_success());
    assert_eq!(report.uploaded, 4);
    for remote in [&ftp, &cloud] {
        assert_eq!(remote.names("orders"), ["orders_20240309_070501.sql"]);
        assert_eq!(remote.names("users"), ["users_20240309_070501.sql"]);
        assert_eq!(remote.state.borrow().sessions, 1);
    }
}

#[test]
fn failing_remote_does_not_stop_others() {
    let _logger = init_test_logger();
    let directory = tempfile::tempdir().unwrap();

    let artifacts = vec![
        TestDumper::default()
            .dump(&dataset("orders"), directory.path())
            .unwrap(),
    ];

    let offline = MemoryBackend::new("ftp");
    offline.state.borrow_mut().offline = true;
    let dropped = MemoryBackend::new("dropped");
    dropped.state.borrow_mut().connection_lost = true;
    let online = MemoryBackend::new("cloud");
    let remotes = vec![offline.boxed(), dropped.boxed(), online.boxed()];

    let report = SyncOrchestrator::new(&remotes).upload(&artifacts);

    assert!(!report.is_success());
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.failures.len(), 2);

    let offline_failure = report.failures.first().unwrap();
    assert_eq!(offline_failure.backend, "ftp");
    assert!(offline_failure.artifact.is_none());

    let dropped_failure = report.failures.get(1).unwrap();
    assert_eq!(dropped_failure.backend, "dropped");
    assert_eq!(
        dropped_failure.artifact.as_deref(),
        Some("orders_20240309_070501.sql")
    );

    assert_eq!(online.names("orders"), ["orders_20240309_070501.sql"]);
}

#[test]
fn unavailable_remote_is_abandoned() {
    let _logger = init_test_logger();
    let directory = tempfile::tempdir().unwrap();

    let dumper = TestDumper::default();
    let artifacts: Vec<_> = ["orders", "users", "invoices"]
        .iter()
        .map(|name| dumper.dump(&dataset(name), directory.path()).unwrap())
        .collect();

    let dropped = MemoryBackend::new("ftp");
    dropped.state.borrow_mut().connection_lost = true;
    let online = MemoryBackend::new("cloud");
    let remotes = vec![dropped.boxed(), online.boxed()];

    let report = SyncOrchestrator::new(&remotes).upload(&artifacts);

    // One failure for the dropped backend, the rest of its uploads are not attempted.
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures.first().unwrap().error.is_unavailable());
    assert!(dropped.state.borrow().uploaded.is_empty());

    assert_eq!(report.uploaded, 3);
    assert_eq!(online.state.borrow().uploaded.len(), 3);
}

#[test]
fn nothing_to_upload() {
    let _logger = init_test_logger();

    let remote = MemoryBackend::new("ftp");
    let remotes = vec![remote.boxed()];

    let report = SyncOrchestrator::new(&remotes).upload(&[]);

    assert!(report.is_success());
    assert_eq!(report.uploaded, 0);
    assert_eq!(remote.state.borrow().sessions, 0);
}
