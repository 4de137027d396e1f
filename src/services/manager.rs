//! Command facade: the single entry point a front end calls.
//!
//! `ModManager` owns the record store, scanner, activation manager and git
//! orchestrator for one mods root. It applies the auto-snapshot policy after
//! successful mutations, keeps the [`StateManager`] view current, and counts what
//! it does in [`Metrics`].
//!
//! Whole-library operations (scan, rollback, branch switch, profile activation)
//! hold the library lock exclusively. Single-mod mutations share it, so they
//! never interleave with a reconciliation pass.

use crate::config::ConfigManager;
use crate::error::{ModError, ModResult};
use crate::metrics::Metrics;
use crate::models::{
    ConflictReport, ConflictRules, ManagerSettings, ModRecord, Profile, RepositoryStatus,
    ScanConfig, Snapshot, SnapshotOutcome, UserConfig, WatchConfig,
};
use crate::services::activation::{ActivationManager, ToggleOutcome};
use crate::services::conflicts::{build_report, detect_conflicts};
use crate::services::profiles::JsonProfileStore;
use crate::services::scanner::{ModScanner, ScanReport};
use crate::services::store::{JsonModStore, ModStore};
use crate::services::vcs::{GitCli, PRIMARY_BRANCH, VcsOrchestrator};
use crate::services::watcher::ModWatcher;
use crate::state::StateManager;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// What a rollback did
#[derive(Debug, Clone)]
pub struct RollbackReport {
    /// Branch that keeps the pre-rollback tip reachable
    pub backup_branch: String,
    /// Re-scan of the restored tree
    pub scan: ScanReport,
}

/// What activating a profile changed
#[derive(Debug, Clone)]
pub struct ProfileActivation {
    pub profile: Profile,
    /// Display names of mods enabled and disabled by the activation
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
    /// Profile entries with no matching record
    pub missing: Vec<String>,
    /// Set when the activation checked out the profile's branch
    pub switched_branch: Option<String>,
}

impl ProfileActivation {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "Profile {}: {} enabled, {} disabled",
            self.profile.name,
            self.enabled.len(),
            self.disabled.len()
        );
        if !self.missing.is_empty() {
            summary.push_str(&format!(", {} missing", self.missing.len()));
        }
        if let Some(branch) = &self.switched_branch {
            summary.push_str(&format!(", on branch {}", branch));
        }
        summary
    }
}

pub struct ModManager {
    settings: ManagerSettings,
    rules: ConflictRules,
    watch_config: WatchConfig,
    store: Arc<dyn ModStore>,
    scanner: ModScanner,
    activation: ActivationManager,
    vcs: VcsOrchestrator,
    profiles: JsonProfileStore,
    library: RwLock<()>,
    state: StateManager,
    metrics: Arc<Metrics>,
}

impl ModManager {
    pub fn new(settings: ManagerSettings, mods_root: Utf8PathBuf, store: Arc<dyn ModStore>) -> Self {
        let scan_config: ScanConfig = settings.scan_config(mods_root);
        let activation = ActivationManager::new(store.clone(), scan_config.disabled_suffix.clone());
        let state = StateManager::new();
        state.update(|s| {
            s.mods_root = Some(scan_config.mods_root.clone());
            s.is_mods_root_configured = true;
            s.auto_snapshot = settings.auto_snapshot;
            s.history_limit = settings.history_limit;
            s.script_warning_threshold = settings.script_warning_threshold;
            s.is_repository_initialized = GitCli::new(scan_config.mods_root.clone()).is_repository();
        });

        Self {
            rules: settings.conflict_rules(),
            watch_config: settings.watch_config(),
            vcs: VcsOrchestrator::new(settings.repository_config()),
            scanner: ModScanner::new(scan_config),
            activation,
            store,
            profiles: JsonProfileStore::in_memory(),
            library: RwLock::new(()),
            state,
            metrics: Arc::new(Metrics::new()),
            settings,
        }
    }

    /// Build a manager from the user configuration, opening the JSON record store.
    pub fn from_config(config_manager: &ConfigManager, config: &UserConfig) -> ModResult<Self> {
        let settings = config.manager_settings.clone();
        let mods_root = settings
            .mods_root()
            .ok_or_else(|| ModError::NotFound("configured mods folder".to_string()))?;
        let store = JsonModStore::open(config_manager.store_path(config), &settings.disabled_suffix)?;
        let profiles = JsonProfileStore::open(config_manager.profiles_path(config))?;
        Ok(Self::new(settings, mods_root, Arc::new(store)).with_profile_store(profiles))
    }

    /// Replace the in-memory profile list with a persistent one.
    pub fn with_profile_store(mut self, profiles: JsonProfileStore) -> Self {
        let active = profiles.active().map(|p| p.id);
        self.state.set_active_profile(active);
        self.profiles = profiles;
        self
    }

    pub fn mods_root(&self) -> &Utf8Path {
        &self.scanner.config().mods_root
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Run `op` with the operation shown as busy in the state view.
    async fn tracked<T, Fut>(&self, operation: &str, op: Fut) -> ModResult<T>
    where
        Fut: Future<Output = ModResult<T>>,
    {
        self.state.begin_operation(operation);
        let result = op.await;
        match &result {
            Ok(_) => {
                self.state.finish_operation(None);
            }
            Err(e) => {
                if matches!(e, ModError::SubordinateProcessFailed { .. }) {
                    self.metrics.record_git_failure();
                }
                tracing::error!("{} failed: {}", operation, e);
                self.state.finish_operation(Some(e.to_string()));
            }
        }
        result
    }

    fn current_conflicts(&self) -> ModResult<ConflictReport> {
        let records = self.store.list()?;
        Ok(build_report(detect_conflicts(&records, &self.rules)))
    }

    /// Snapshot after a successful mutation when the policy allows it. The
    /// mutation already happened, so a failing snapshot is not returned; it is
    /// recorded as the state's `snapshot_error` for the front end to report.
    async fn auto_snapshot(&self, message: String) {
        if !self.settings.auto_snapshot {
            return;
        }
        if !GitCli::new(self.mods_root()).is_repository() {
            tracing::debug!("Skipping auto snapshot, {} is not a repository", self.mods_root());
            return;
        }

        match self.vcs.snapshot(self.mods_root(), &message).await {
            Ok(outcome) => {
                self.metrics.record_snapshot(matches!(outcome, SnapshotOutcome::Created(_)));
                self.state.set_snapshot_error(None);
                self.refresh_history().await;
            }
            Err(e) => {
                if matches!(e, ModError::SubordinateProcessFailed { .. }) {
                    self.metrics.record_git_failure();
                }
                tracing::warn!("Auto snapshot '{}' failed: {}", message, e);
                self.state.set_snapshot_error(Some(e.to_string()));
            }
        }
    }

    async fn refresh_history(&self) {
        match self.vcs.history(self.mods_root(), self.settings.history_limit).await {
            Ok(history) => {
                self.state.set_history(history);
            }
            Err(e) => tracing::warn!("Could not refresh history: {}", e),
        }
    }

    async fn scan_inner(&self) -> ModResult<ScanReport> {
        let scanner = self.scanner.clone();
        let store = self.store.clone();
        let started = Instant::now();

        let report = tokio::task::spawn_blocking(move || scanner.scan(store.as_ref()))
            .await
            .map_err(|e| ModError::fs("scan", self.mods_root(), std::io::Error::other(e)))??;

        self.metrics.record_scan(started.elapsed(), report.hashed);
        let conflicts = build_report(detect_conflicts(&report.records, &self.rules));
        self.state.set_mods(report.records.clone(), conflicts);
        Ok(report)
    }

    /// Reconcile the store with the mods folder.
    pub async fn scan(&self) -> ModResult<ScanReport> {
        self.tracked("Scanning mods", async {
            let _library = self.library.write().await;
            self.scan_inner().await
        })
        .await
    }

    pub fn list(&self) -> ModResult<Vec<ModRecord>> {
        self.store.list()
    }

    pub fn get(&self, mod_id: &str) -> ModResult<ModRecord> {
        self.store
            .get(mod_id)?
            .ok_or_else(|| ModError::NotFound(format!("mod {}", mod_id)))
    }

    async fn after_toggle(&self, outcome: &ToggleOutcome) -> ModResult<()> {
        if !outcome.changed {
            return Ok(());
        }
        self.metrics.record_toggle();
        self.state
            .apply_mod(outcome.record.clone(), self.current_conflicts()?);

        let verb = if outcome.enabled { "Enabled" } else { "Disabled" };
        self.auto_snapshot(format!("{} mod: {}", verb, outcome.record.display_name))
            .await;
        Ok(())
    }

    /// Flip a mod, returning its new `enabled` value.
    pub async fn toggle(&self, mod_id: &str) -> ModResult<bool> {
        self.tracked("Toggling mod", async {
            let _library = self.library.read().await;
            let outcome = self.activation.flip(mod_id).await?;
            self.after_toggle(&outcome).await?;
            Ok(outcome.enabled)
        })
        .await
    }

    pub async fn set_enabled(&self, mod_id: &str, enabled: bool) -> ModResult<ToggleOutcome> {
        self.tracked("Changing mod state", async {
            let _library = self.library.read().await;
            let outcome = self.activation.set_enabled(mod_id, enabled).await?;
            self.after_toggle(&outcome).await?;
            Ok(outcome)
        })
        .await
    }

    /// Delete a mod's file and record.
    pub async fn delete(&self, mod_id: &str) -> ModResult<ModRecord> {
        self.tracked("Removing mod", async {
            let _library = self.library.read().await;
            let removed = self.activation.remove(mod_id).await?;
            self.state.remove_mod(&removed.id, self.current_conflicts()?);
            self.auto_snapshot(format!("Removed mod: {}", removed.display_name))
                .await;
            Ok(removed)
        })
        .await
    }

    async fn import_inner(&self, source: &Utf8Path) -> ModResult<ModRecord> {
        let metadata = tokio::fs::metadata(source)
            .await
            .map_err(|_| ModError::NotFound(format!("file {}", source)))?;
        if !metadata.is_file() {
            return Err(ModError::NotFound(format!("file {}", source)));
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| ModError::NotFound(format!("file {}", source)))?;
        if self.scanner.classify(file_name).is_none() {
            return Err(ModError::fs(
                "import",
                source,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a recognized mod file type",
                ),
            ));
        }

        let target = self.mods_root().join(file_name);
        let occupied = tokio::fs::try_exists(&target)
            .await
            .map_err(|e| ModError::fs("stat", &target, e))?;
        if occupied {
            return Err(ModError::fs(
                "import onto existing",
                &target,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target already exists"),
            ));
        }

        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| ModError::fs("copy", source, e))?;

        let stored = self
            .scanner
            .synthesize(&target)
            .and_then(|record| self.store.upsert(record.clone()).map(|()| record));
        let record = match stored {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&target).await {
                    tracing::error!("Could not remove partially imported {}: {}", target, cleanup);
                }
                return Err(e);
            }
        };

        tracing::info!("Imported {} as mod {}", source, record.id);
        self.state.apply_mod(record.clone(), self.current_conflicts()?);
        self.auto_snapshot(format!("Added mod: {}", record.display_name))
            .await;
        Ok(record)
    }

    /// Copy a file into the mods root and register it.
    pub async fn import(&self, source: &Utf8Path) -> ModResult<ModRecord> {
        self.tracked("Importing mod", async {
            let _library = self.library.read().await;
            self.import_inner(source).await
        })
        .await
    }

    pub fn conflicts(&self) -> ModResult<ConflictReport> {
        self.current_conflicts()
    }

    pub async fn ensure_repository(&self) -> ModResult<RepositoryStatus> {
        self.tracked("Preparing repository", async {
            let status = self.vcs.ensure_repository(self.mods_root()).await?;
            let branch = self.vcs.current_branch(self.mods_root()).await?;
            self.state.set_repository(true, Some(branch));
            if status == RepositoryStatus::Initialized {
                self.metrics.record_snapshot(true);
                self.refresh_history().await;
            }
            Ok(status)
        })
        .await
    }

    pub async fn snapshot(&self, message: &str) -> ModResult<SnapshotOutcome> {
        self.tracked("Creating snapshot", async {
            let outcome = self.vcs.snapshot(self.mods_root(), message).await?;
            self.metrics
                .record_snapshot(matches!(outcome, SnapshotOutcome::Created(_)));
            if outcome != SnapshotOutcome::NoChanges {
                self.refresh_history().await;
            }
            Ok(outcome)
        })
        .await
    }

    /// Newest-first history, `limit` defaulting to the configured history limit
    pub async fn history(&self, limit: Option<usize>) -> ModResult<Vec<Snapshot>> {
        let limit = limit.unwrap_or(self.settings.history_limit);
        let history = self.vcs.history(self.mods_root(), limit).await?;
        self.state.set_history(history.clone());
        Ok(history)
    }

    /// Restore the mods folder to `snapshot_id` and re-scan it.
    pub async fn rollback(&self, snapshot_id: &str) -> ModResult<RollbackReport> {
        self.tracked("Rolling back", async {
            let _library = self.library.write().await;
            let backup_branch = self.vcs.rollback(self.mods_root(), snapshot_id).await?;
            self.metrics.record_rollback();

            let scan = self.scan_inner().await?;
            let branch = self.vcs.current_branch(self.mods_root()).await?;
            self.state.set_repository(true, Some(branch));
            self.refresh_history().await;

            Ok(RollbackReport {
                backup_branch,
                scan,
            })
        })
        .await
    }

    pub async fn branches(&self) -> ModResult<Vec<String>> {
        self.vcs.branches(self.mods_root()).await
    }

    pub async fn current_branch(&self) -> ModResult<String> {
        self.vcs.current_branch(self.mods_root()).await
    }

    /// Create a branch at the current snapshot and check it out. The tree is
    /// unchanged, so no re-scan is needed.
    pub async fn create_branch(&self, name: &str) -> ModResult<()> {
        self.tracked("Creating branch", async {
            self.vcs.create_branch(self.mods_root(), name).await?;
            self.state.set_repository(true, Some(name.to_string()));
            Ok(())
        })
        .await
    }

    async fn switch_branch_inner(&self, name: &str) -> ModResult<ScanReport> {
        self.vcs.switch_branch(self.mods_root(), name).await?;
        let scan = self.scan_inner().await?;
        let branch = self.vcs.current_branch(self.mods_root()).await?;
        self.state.set_repository(true, Some(branch));
        self.refresh_history().await;
        Ok(scan)
    }

    /// Check out another branch and re-scan the tree it brings.
    pub async fn switch_branch(&self, name: &str) -> ModResult<ScanReport> {
        self.tracked("Switching branch", async {
            let _library = self.library.write().await;
            self.switch_branch_inner(name).await
        })
        .await
    }

    /// Profiles ordered by name
    pub fn profiles(&self) -> Vec<Profile> {
        self.profiles.list()
    }

    pub fn active_profile(&self) -> Option<Profile> {
        self.profiles.active()
    }

    /// Capture the enabled set and current branch under `name`.
    pub async fn create_profile(
        &self,
        name: &str,
        description: Option<String>,
    ) -> ModResult<Profile> {
        self.tracked("Creating profile", async {
            let _library = self.library.read().await;
            let mod_ids = self
                .store
                .list()?
                .into_iter()
                .filter(|record| record.enabled)
                .map(|record| record.id)
                .collect();
            let git_branch = if GitCli::new(self.mods_root()).is_repository() {
                self.vcs.current_branch(self.mods_root()).await?
            } else {
                PRIMARY_BRANCH.to_string()
            };

            let profile = Profile::new(name.trim(), description, mod_ids, git_branch);
            self.profiles.save(profile.clone())?;
            tracing::info!(
                "Created profile {} with {} enabled mods",
                profile.name,
                profile.mod_ids.len()
            );
            Ok(profile)
        })
        .await
    }

    /// Delete a profile by id or name.
    pub fn delete_profile(&self, key: &str) -> ModResult<Profile> {
        let profile = self
            .profiles
            .find(key)
            .ok_or_else(|| ModError::NotFound(format!("profile {}", key)))?;
        self.profiles.delete(&profile.id)?;
        if profile.is_active {
            self.state.set_active_profile(None);
        }
        tracing::info!("Deleted profile {}", profile.name);
        Ok(profile)
    }

    /// Make the library match a profile: check out its branch when it exists
    /// and differs, then enable exactly its mods.
    pub async fn activate_profile(&self, key: &str) -> ModResult<ProfileActivation> {
        self.tracked("Activating profile", async {
            let _library = self.library.write().await;
            let profile = self
                .profiles
                .find(key)
                .ok_or_else(|| ModError::NotFound(format!("profile {}", key)))?;

            let mut switched_branch = None;
            if GitCli::new(self.mods_root()).is_repository() {
                let current = self.vcs.current_branch(self.mods_root()).await?;
                if current != profile.git_branch {
                    let branches = self.vcs.branches(self.mods_root()).await?;
                    if branches.contains(&profile.git_branch) {
                        self.switch_branch_inner(&profile.git_branch).await?;
                        switched_branch = Some(profile.git_branch.clone());
                    } else {
                        tracing::warn!(
                            "Branch {} of profile {} no longer exists, staying on {}",
                            profile.git_branch,
                            profile.name,
                            current
                        );
                    }
                }
            }

            let records = self.store.list()?;
            let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
            let missing: Vec<String> = profile
                .mod_ids
                .iter()
                .filter(|id| !known.contains(id.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                tracing::warn!(
                    "Profile {} lists {} mods that are no longer installed",
                    profile.name,
                    missing.len()
                );
            }

            let mut enabled = Vec::new();
            let mut disabled = Vec::new();
            for record in &records {
                let wanted = profile.includes(&record.id);
                if record.enabled == wanted {
                    continue;
                }
                let outcome = self.activation.set_enabled(&record.id, wanted).await?;
                if !outcome.changed {
                    continue;
                }
                self.metrics.record_toggle();
                self.state
                    .apply_mod(outcome.record.clone(), self.current_conflicts()?);
                let name = outcome.record.display_name;
                if wanted {
                    enabled.push(name);
                } else {
                    disabled.push(name);
                }
            }

            if !enabled.is_empty() || !disabled.is_empty() {
                let mut message = format!("Activated profile: {}\n", profile.name);
                for name in &enabled {
                    message.push_str(&format!("\nEnabled mod: {}", name));
                }
                for name in &disabled {
                    message.push_str(&format!("\nDisabled mod: {}", name));
                }
                self.auto_snapshot(message).await;
            }

            let profile = self.profiles.set_active(&profile.id)?;
            self.state.set_active_profile(Some(profile.id.clone()));
            tracing::info!("Activated profile {}", profile.name);

            Ok(ProfileActivation {
                profile,
                enabled,
                disabled,
                missing,
                switched_branch,
            })
        })
        .await
    }

    /// Re-scan after every settled burst of filesystem events under the mods root.
    pub fn watch(self: &Arc<Self>) -> ModResult<ModWatcher> {
        let manager = Arc::clone(self);
        ModWatcher::start(self.mods_root(), self.watch_config, move |paths| {
            let manager = manager.clone();
            async move {
                tracing::info!("{} paths changed, re-scanning", paths.len());
                if let Err(e) = manager.scan().await {
                    tracing::warn!("Re-scan after filesystem change failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MockModStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// In-memory store whose first `list` after arming parks the scanning
    /// thread, leaving a window for another operation to run.
    struct PausingStore {
        inner: JsonModStore,
        armed: AtomicBool,
        listing: Notify,
    }

    impl ModStore for PausingStore {
        fn get(&self, id: &str) -> ModResult<Option<ModRecord>> {
            self.inner.get(id)
        }

        fn list(&self) -> ModResult<Vec<ModRecord>> {
            let records = self.inner.list()?;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.listing.notify_one();
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            Ok(records)
        }

        fn find_by_path(&self, path: &Utf8Path) -> ModResult<Option<ModRecord>> {
            self.inner.find_by_path(path)
        }

        fn upsert(&self, record: ModRecord) -> ModResult<()> {
            self.inner.upsert(record)
        }

        fn delete(&self, id: &str) -> ModResult<Option<ModRecord>> {
            self.inner.delete(id)
        }

        fn replace_all(&self, records: Vec<ModRecord>) -> ModResult<()> {
            self.inner.replace_all(records)
        }
    }

    fn manager_with_files(files: &[(&str, &[u8])]) -> (TempDir, ModManager) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        for (name, bytes) in files {
            std::fs::write(root.join(name), bytes).unwrap();
        }
        let store = Arc::new(JsonModStore::in_memory(".disabled"));
        let manager = ModManager::new(ManagerSettings::default(), root, store);
        (dir, manager)
    }

    #[tokio::test]
    async fn test_scan_updates_state_and_metrics() {
        let (_dir, manager) =
            manager_with_files(&[("A.package", b"a"), ("a.package.disabled", b"b")]);

        let report = manager.scan().await.unwrap();
        assert_eq!(report.added, 2);

        let state = manager.state().snapshot();
        assert_eq!(state.mod_stats(), (2, 1, 1));
        assert!(!state.is_busy);
        assert_eq!(manager.metrics().scans.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_toggle_without_repository_skips_snapshot() {
        let (_dir, manager) = manager_with_files(&[("A.package", b"a")]);
        let id = manager.scan().await.unwrap().records[0].id.clone();

        assert!(!manager.toggle(&id).await.unwrap());
        assert!(!manager.get(&id).unwrap().enabled);
        assert_eq!(
            manager
                .metrics()
                .snapshots_created
                .load(std::sync::atomic::Ordering::Relaxed),
            0
        );
    }

    #[tokio::test]
    async fn test_failed_operation_is_recorded_in_state() {
        let (_dir, manager) = manager_with_files(&[]);
        let err = manager.toggle("nope").await.unwrap_err();
        assert!(matches!(err, ModError::NotFound(_)));

        let state = manager.state().snapshot();
        assert!(!state.is_busy);
        assert!(state.last_error.unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_store_errors_surface_from_list() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let mut store = MockModStore::new();
        store.expect_list().returning(|| {
            Err(ModError::Store {
                path: "/state/mods.json".into(),
                message: "unreadable".to_string(),
            })
        });

        let manager = ModManager::new(ManagerSettings::default(), root, Arc::new(store));
        assert!(matches!(manager.list(), Err(ModError::Store { .. })));
        assert!(matches!(manager.conflicts(), Err(ModError::Store { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_toggle_waits_for_running_scan() {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        std::fs::write(root.join("Desk.package"), b"desk").unwrap();
        let store = Arc::new(PausingStore {
            inner: JsonModStore::in_memory(".disabled"),
            armed: AtomicBool::new(false),
            listing: Notify::new(),
        });
        let manager = Arc::new(ModManager::new(
            ManagerSettings::default(),
            root.clone(),
            store.clone(),
        ));
        let id = manager.scan().await.unwrap().records[0].id.clone();

        store.armed.store(true, Ordering::SeqCst);
        let scan = tokio::spawn({
            let manager = manager.clone();
            async move { manager.scan().await }
        });
        store.listing.notified().await;
        manager.set_enabled(&id, false).await.unwrap();
        scan.await.unwrap().unwrap();

        // The scan's stale view of the mod must not overwrite the toggle
        let record = manager.get(&id).unwrap();
        assert!(!record.enabled);
        assert_eq!(record.absolute_path, root.join("Desk.package.disabled"));
        assert!(record.absolute_path.exists());
        assert_eq!(manager.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_round_trip_without_repository() {
        let (_dir, manager) =
            manager_with_files(&[("Sofa.package", b"s"), ("Lamp.package", b"l")]);
        let records = manager.scan().await.unwrap().records;
        let sofa = records.iter().find(|r| r.file_name == "Sofa.package").unwrap();
        let lamp = records.iter().find(|r| r.file_name == "Lamp.package").unwrap();

        manager.set_enabled(&lamp.id, false).await.unwrap();
        let profile = manager.create_profile("Living Room", None).await.unwrap();
        assert_eq!(profile.mod_ids, vec![sofa.id.clone()]);
        assert_eq!(profile.git_branch, PRIMARY_BRANCH);

        manager.set_enabled(&lamp.id, true).await.unwrap();
        manager.set_enabled(&sofa.id, false).await.unwrap();

        let activation = manager.activate_profile("living room").await.unwrap();
        assert_eq!(activation.enabled, vec![sofa.display_name.clone()]);
        assert_eq!(activation.disabled, vec![lamp.display_name.clone()]);
        assert!(activation.switched_branch.is_none());
        assert!(manager.get(&sofa.id).unwrap().enabled);
        assert!(!manager.get(&lamp.id).unwrap().enabled);

        assert!(manager.active_profile().unwrap().is_active);
        let state = manager.state().snapshot();
        assert_eq!(state.active_profile, Some(profile.id.clone()));

        let err = manager.create_profile("LIVING ROOM", None).await.unwrap_err();
        assert!(matches!(err, ModError::AlreadyExists(_)));

        manager.delete_profile(&profile.id).unwrap();
        assert!(manager.profiles().is_empty());
        assert!(manager.state().snapshot().active_profile.is_none());
    }

    #[tokio::test]
    async fn test_profile_with_uninstalled_mod_reports_it_missing() {
        let (_dir, manager) = manager_with_files(&[("Sofa.package", b"s")]);
        manager.scan().await.unwrap();
        let profile = manager.create_profile("All", None).await.unwrap();

        let mut stale = profile.clone();
        stale.mod_ids.push("gone".to_string());
        manager.profiles.save(stale).unwrap();

        let activation = manager.activate_profile(&profile.id).await.unwrap();
        assert_eq!(activation.missing, vec!["gone".to_string()]);
        assert!(activation.enabled.is_empty() && activation.disabled.is_empty());
        assert!(matches!(
            manager.activate_profile("nobody").await,
            Err(ModError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_import_rejects_unknown_extensions() {
        let (dir, manager) = manager_with_files(&[]);
        let outside = Utf8PathBuf::try_from(dir.path().join("notes.txt")).unwrap();
        std::fs::write(&outside, b"hi").unwrap();

        let err = manager.import(&outside).await.unwrap_err();
        assert!(matches!(err, ModError::FilesystemOperationFailed { .. }));
    }
}
