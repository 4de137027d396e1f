//! Integration tests for VcsOrchestrator against a real `git`
//!
//! Every test returns early when `git` is not installed.
//!
//! These tests verify:
//! - Rollback restores the tree and keeps the old tip on a backup branch
//! - Uncommitted work is saved before a rollback
//! - Concurrent snapshots on one root are serialized, never failing
//! - Separate roots get separate queues

use camino::Utf8PathBuf;
use modledger::ModError;
use modledger::models::{RepositoryConfig, RepositoryStatus, SnapshotOutcome};
use modledger::services::{GitCli, VcsOrchestrator};
use std::collections::HashSet;
use std::fs;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn repository(files: &[&str]) -> (TempDir, Utf8PathBuf, Arc<VcsOrchestrator>) {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    for name in files {
        fs::write(root.join(name), name.as_bytes()).unwrap();
    }
    let vcs = Arc::new(VcsOrchestrator::new(RepositoryConfig::default()));
    assert_eq!(
        vcs.ensure_repository(&root).await.unwrap(),
        RepositoryStatus::Initialized
    );
    (dir, root, vcs)
}

fn rev_parse(root: &Utf8PathBuf, rev: &str) -> String {
    GitCli::new(root.clone())
        .run(&["rev-parse", rev])
        .unwrap()
        .trim()
        .to_string()
}

#[tokio::test]
async fn test_rollback_restores_tree_and_keeps_backup() {
    if !git_available() {
        return;
    }
    let (_dir, root, vcs) = repository(&["A.package"]).await;
    let initial = vcs.history(&root, 1).await.unwrap()[0].id.clone();

    fs::write(root.join("A.package"), b"patched").unwrap();
    fs::write(root.join("B.package"), b"b").unwrap();
    let added = vcs.snapshot(&root, "Added mod: B").await.unwrap();
    let tip = added.id().unwrap().to_string();

    let backup = vcs.rollback(&root, &initial).await.unwrap();

    assert!(backup.starts_with("backup-"));
    assert_eq!(rev_parse(&root, &backup), tip);
    assert_eq!(rev_parse(&root, "HEAD"), initial);
    assert_eq!(fs::read(root.join("A.package")).unwrap(), b"A.package");
    assert!(!root.join("B.package").exists());
    assert_eq!(vcs.current_branch(&root).await.unwrap(), "main");

    let branches = vcs.branches(&root).await.unwrap();
    assert!(branches.contains(&backup));
    assert!(branches.contains(&"main".to_string()));
}

#[tokio::test]
async fn test_rollback_saves_uncommitted_work_first() {
    if !git_available() {
        return;
    }
    let (_dir, root, vcs) = repository(&["A.package"]).await;
    let initial = vcs.history(&root, 1).await.unwrap()[0].id.clone();

    fs::write(root.join("Unsaved.package"), b"work in progress").unwrap();
    let backup = vcs.rollback(&root, &initial).await.unwrap();

    assert!(!root.join("Unsaved.package").exists());
    let saved = GitCli::new(root.clone())
        .run(&["show", &format!("{}:Unsaved.package", backup)])
        .unwrap();
    assert_eq!(saved, "work in progress");
}

#[tokio::test]
async fn test_rollback_to_short_id() {
    if !git_available() {
        return;
    }
    let (_dir, root, vcs) = repository(&["A.package"]).await;
    let initial = vcs.history(&root, 1).await.unwrap()[0].clone();

    fs::remove_file(root.join("A.package")).unwrap();
    vcs.snapshot(&root, "Removed mod: A").await.unwrap();

    vcs.rollback(&root, initial.short_id()).await.unwrap();
    assert!(root.join("A.package").exists());
}

#[tokio::test]
async fn test_concurrent_snapshots_never_fail() {
    if !git_available() {
        return;
    }
    let (_dir, root, vcs) = repository(&[]).await;

    let mut tasks = Vec::new();
    for i in 0..6 {
        let vcs = vcs.clone();
        let root = root.clone();
        tasks.push(tokio::spawn(async move {
            fs::write(root.join(format!("Mod{}.package", i)), i.to_string()).unwrap();
            vcs.snapshot(&root, &format!("Added mod: Mod{}", i)).await
        }));
    }

    let mut created = Vec::new();
    for task in tasks {
        if let SnapshotOutcome::Created(id) = task.await.unwrap().unwrap() {
            created.push(id);
        }
    }

    assert!(!created.is_empty());
    let history = vcs.history(&root, 50).await.unwrap();
    assert_eq!(history.len(), created.len() + 1);
    assert!(!GitCli::new(root.clone()).run(&["status", "--porcelain"]).unwrap().contains("Mod"));

    // Each file lands in exactly one of the snapshots that were created
    let mut covered = HashSet::new();
    for id in &created {
        let snapshot = history.iter().find(|s| &s.id == id).unwrap();
        assert!(!snapshot.changed_paths.is_empty());
        for path in &snapshot.changed_paths {
            assert!(covered.insert(path.clone()), "{} appears in two snapshots", path);
        }
    }
    let expected: HashSet<String> = (0..6).map(|i| format!("Mod{}.package", i)).collect();
    assert_eq!(covered, expected);
}

#[tokio::test]
async fn test_roots_are_independent() {
    if !git_available() {
        return;
    }
    let vcs = VcsOrchestrator::new(RepositoryConfig::default());
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let first_root = Utf8PathBuf::try_from(first.path().to_path_buf()).unwrap();
    let second_root = Utf8PathBuf::try_from(second.path().to_path_buf()).unwrap();

    vcs.ensure_repository(&first_root).await.unwrap();
    let err = vcs.snapshot(&second_root, "nope").await.unwrap_err();
    assert!(matches!(err, ModError::RepositoryNotInitialized(_)));

    fs::write(first_root.join("X.package"), b"x").unwrap();
    assert!(matches!(
        vcs.snapshot(&first_root, "Added mod: X").await.unwrap(),
        SnapshotOutcome::Created(_)
    ));
}

#[tokio::test]
async fn test_existing_ignore_file_is_kept() {
    if !git_available() {
        return;
    }
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    fs::write(root.join(".gitignore"), "custom/\n").unwrap();

    let vcs = VcsOrchestrator::new(RepositoryConfig::default());
    vcs.ensure_repository(&root).await.unwrap();

    assert_eq!(fs::read_to_string(root.join(".gitignore")).unwrap(), "custom/\n");
}
