//! Integration tests for ActivationManager
//!
//! These tests verify:
//! - Toggling renames the file and persists the new path
//! - The store and the disk agree after many concurrent toggles
//! - Occupied targets and vanished files are refused
//! - A toggle survives a re-scan without changing identity

use camino::Utf8PathBuf;
use modledger::ModError;
use modledger::models::ScanConfig;
use modledger::services::{ActivationManager, JsonModStore, ModScanner, ModStore};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn setup(files: &[&str]) -> (TempDir, Utf8PathBuf, Arc<JsonModStore>, ModScanner) {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    for name in files {
        fs::write(root.join(name), name.as_bytes()).unwrap();
    }
    let store = Arc::new(JsonModStore::open(root.join(".mod-manager/mods.json"), ".disabled").unwrap());
    let scanner = ModScanner::new(ScanConfig::for_root(root.clone()));
    scanner.scan(store.as_ref()).unwrap();
    (dir, root, store, scanner)
}

fn id_of(store: &JsonModStore, file_name: &str) -> String {
    store
        .list()
        .unwrap()
        .into_iter()
        .find(|r| r.file_name == file_name)
        .unwrap()
        .id
}

#[tokio::test]
async fn test_toggle_round_trip_on_disk_and_store() {
    let (_dir, root, store, _) = setup(&["Hair.package"]);
    let activation = ActivationManager::new(store.clone(), ".disabled");
    let id = id_of(&store, "Hair.package");

    assert!(!activation.toggle(&id).await.unwrap());
    assert!(root.join("Hair.package.disabled").exists());
    assert!(!root.join("Hair.package").exists());

    let reopened = JsonModStore::open(root.join(".mod-manager/mods.json"), ".disabled").unwrap();
    let record = reopened.get(&id).unwrap().unwrap();
    assert!(!record.enabled);
    assert_eq!(record.absolute_path, root.join("Hair.package.disabled"));

    assert!(activation.toggle(&id).await.unwrap());
    assert!(root.join("Hair.package").exists());
    assert!(store.get(&id).unwrap().unwrap().last_enabled_at.is_some());
}

#[tokio::test]
async fn test_concurrent_toggles_leave_disk_and_store_in_agreement() {
    let (_dir, root, store, _) = setup(&["A.package", "B.package"]);
    let activation = Arc::new(ActivationManager::new(store.clone(), ".disabled"));
    let a = id_of(&store, "A.package");
    let b = id_of(&store, "B.package");

    let mut tasks = Vec::new();
    for i in 0..10 {
        let activation = activation.clone();
        let id = if i % 2 == 0 { a.clone() } else { b.clone() };
        tasks.push(tokio::spawn(async move { activation.toggle(&id).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // Five flips each: both end disabled.
    for (id, name) in [(&a, "A.package"), (&b, "B.package")] {
        let record = store.get(id).unwrap().unwrap();
        assert!(!record.enabled);
        assert!(record.absolute_path.exists());
        assert!(!root.join(name).exists());
        record.check_consistency(".disabled").unwrap();
    }
}

#[tokio::test]
async fn test_refuses_occupied_target() {
    let (_dir, root, store, _) = setup(&["Tree.package"]);
    fs::write(root.join("Tree.package.disabled"), b"stale copy").unwrap();
    let activation = ActivationManager::new(store.clone(), ".disabled");
    let id = id_of(&store, "Tree.package");

    let err = activation.set_enabled(&id, false).await.unwrap_err();
    assert!(matches!(err, ModError::FilesystemOperationFailed { .. }));
    assert!(root.join("Tree.package").exists());
    assert!(store.get(&id).unwrap().unwrap().enabled);
}

#[tokio::test]
async fn test_vanished_file_is_not_found() {
    let (_dir, root, store, _) = setup(&["Gone.package"]);
    let activation = ActivationManager::new(store.clone(), ".disabled");
    let id = id_of(&store, "Gone.package");
    fs::remove_file(root.join("Gone.package")).unwrap();

    let err = activation.toggle(&id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_toggle_then_rescan_keeps_identity() {
    let (_dir, _root, store, scanner) = setup(&["Sim.package"]);
    let activation = ActivationManager::new(store.clone(), ".disabled");
    let id = id_of(&store, "Sim.package");

    activation.set_enabled(&id, false).await.unwrap();
    let report = scanner.scan(store.as_ref()).unwrap();

    assert_eq!(report.added, 0);
    assert_eq!(report.removed, 0);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].id, id);
    assert!(!report.records[0].enabled);
}

#[tokio::test]
async fn test_remove_deletes_file_and_record() {
    let (_dir, root, store, _) = setup(&["Bin.package"]);
    let activation = ActivationManager::new(store.clone(), ".disabled");
    let id = id_of(&store, "Bin.package");

    let removed = activation.remove(&id).await.unwrap();
    assert_eq!(removed.id, id);
    assert!(!root.join("Bin.package").exists());
    assert!(store.get(&id).unwrap().is_none());
}
