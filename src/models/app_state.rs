use crate::models::{ConflictReport, ModCategory, ModRecord, Snapshot};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// View of the mod library for whatever front end is attached.
///
/// `AppState` is wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Never mutate it directly; go through
/// [`update()`](crate::state::StateManager::update) so change events are emitted.
/// It is a cache of the record store and repository, never the source of truth.
#[derive(Clone, Debug)]
pub struct AppState {
    // Configuration
    pub mods_root: Option<Utf8PathBuf>,
    pub is_mods_root_configured: bool,

    // Repository
    pub is_repository_initialized: bool,
    pub current_branch: Option<String>,
    /// Why the automatic snapshot after the last mutation failed, if it did
    pub snapshot_error: Option<String>,

    // Library
    pub mods: Vec<ModRecord>,
    pub conflicts: ConflictReport,
    pub history: Vec<Snapshot>,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub active_profile: Option<String>,

    // Runtime
    pub is_busy: bool,
    pub current_operation: String,
    pub last_error: Option<String>,

    // Settings
    pub auto_snapshot: bool,
    pub history_limit: usize,
    pub script_warning_threshold: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            mods_root: None,
            is_mods_root_configured: false,

            is_repository_initialized: false,
            current_branch: None,
            snapshot_error: None,

            mods: Vec::new(),
            conflicts: ConflictReport::default(),
            history: Vec::new(),
            last_scan_at: None,
            active_profile: None,

            is_busy: false,
            current_operation: String::new(),
            last_error: None,

            auto_snapshot: true,
            history_limit: 50,
            script_warning_threshold: 10,
        }
    }
}

impl AppState {
    pub fn find_mod(&self, id: &str) -> Option<&ModRecord> {
        self.mods.iter().find(|m| m.id == id)
    }

    /// Returns (total, enabled, disabled).
    pub fn mod_stats(&self) -> (usize, usize, usize) {
        let enabled = self.mods.iter().filter(|m| m.enabled).count();
        (self.mods.len(), enabled, self.mods.len() - enabled)
    }

    pub fn enabled_script_count(&self) -> usize {
        self.mods
            .iter()
            .filter(|m| m.enabled && m.is_script())
            .count()
    }

    /// Number of mods per category, in category order
    pub fn category_counts(&self) -> BTreeMap<ModCategory, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.mods {
            *counts.entry(record.category).or_insert(0) += 1;
        }
        counts
    }

    /// Replace a single record in place, or append it if it is new.
    pub fn replace_mod(&mut self, record: ModRecord) {
        match self.mods.iter_mut().find(|m| m.id == record.id) {
            Some(existing) => *existing = record,
            None => self.mods.push(record),
        }
    }

    pub fn remove_mod(&mut self, id: &str) -> Option<ModRecord> {
        let index = self.mods.iter().position(|m| m.id == id)?;
        Some(self.mods.remove(index))
    }

    /// Drop everything learned from the current mods root.
    pub fn reset_library(&mut self) {
        self.mods.clear();
        self.conflicts = ConflictReport::default();
        self.history.clear();
        self.last_scan_at = None;
        self.is_repository_initialized = false;
        self.current_branch = None;
        self.snapshot_error = None;
        self.active_profile = None;
        self.is_busy = false;
        self.current_operation.clear();
        self.last_error = None;
    }

    /// One-line summary for logs and the CLI
    pub fn library_summary(&self) -> String {
        let (total, enabled, disabled) = self.mod_stats();
        let mut summary = format!("{} mods ({} enabled, {} disabled)", total, enabled, disabled);
        if self.conflicts.has_conflicts {
            summary.push_str(&format!(", {} conflicts", self.conflicts.conflicts.len()));
        }
        summary
    }
}
