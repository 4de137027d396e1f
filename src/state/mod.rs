// State management module
//
// StateManager wraps AppState in Arc<RwLock<T>> and broadcasts change events so a
// front end can follow the mod library without polling.

use crate::models::{AppState, ConflictReport, ModRecord, Snapshot};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The mods root was set or cleared
    ConfigurationChanged { is_configured: bool },

    /// The set of known mods changed (scan, import, delete)
    ModsChanged { total: usize, enabled: usize },

    /// A known mod flipped between enabled and disabled
    ModToggled { mod_id: String, enabled: bool },

    ConflictsChanged { count: usize },

    /// A new snapshot became the newest entry in history
    HistoryChanged { latest: Option<String> },

    RepositoryChanged {
        initialized: bool,
        branch: Option<String>,
    },

    /// A mutation succeeded but its automatic snapshot did not
    SnapshotFailed { error: String },

    /// The active profile changed (`None` when it was cleared)
    ProfileActivated { profile_id: Option<String> },

    OperationStarted { operation: String },

    OperationFinished { error: Option<String> },

    SettingsChanged,

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - [`read()`](Self::read) and [`snapshot()`](Self::snapshot) for reading
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to changes
///
/// [`ModManager`](crate::services::manager::ModManager) is the main producer of
/// updates; the CLI and any GUI are consumers.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 100-event buffer
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the current state, safe to use without holding locks
    pub fn snapshot(&self) -> AppState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let enabled = state_manager.read(|state| state.mod_stats().1);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs the two and broadcasts
    /// one event per detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);
        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(&self, old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_mods_root_configured != new.is_mods_root_configured
            || old.mods_root != new.mods_root
        {
            changes.push(StateChange::ConfigurationChanged {
                is_configured: new.is_mods_root_configured,
            });
        }

        if old.is_busy != new.is_busy {
            if new.is_busy {
                changes.push(StateChange::OperationStarted {
                    operation: new.current_operation.clone(),
                });
            } else {
                changes.push(StateChange::OperationFinished {
                    error: new.last_error.clone(),
                });
            }
        }

        // Membership changes first, then per-mod toggles among mods present in both.
        let old_by_id: HashMap<&str, &ModRecord> =
            old.mods.iter().map(|m| (m.id.as_str(), m)).collect();
        let membership_changed = old.mods.len() != new.mods.len()
            || new.mods.iter().any(|m| !old_by_id.contains_key(m.id.as_str()));
        if membership_changed {
            let (total, enabled, _) = new.mod_stats();
            changes.push(StateChange::ModsChanged { total, enabled });
        }
        for record in &new.mods {
            if let Some(previous) = old_by_id.get(record.id.as_str()) {
                if previous.enabled != record.enabled {
                    changes.push(StateChange::ModToggled {
                        mod_id: record.id.clone(),
                        enabled: record.enabled,
                    });
                }
            }
        }

        if old.conflicts != new.conflicts {
            changes.push(StateChange::ConflictsChanged {
                count: new.conflicts.conflicts.len(),
            });
        }

        let old_latest = old.history.first().map(|s| s.id.as_str());
        let new_latest = new.history.first().map(|s| s.id.as_str());
        if old_latest != new_latest {
            changes.push(StateChange::HistoryChanged {
                latest: new_latest.map(str::to_string),
            });
        }

        if old.is_repository_initialized != new.is_repository_initialized
            || old.current_branch != new.current_branch
        {
            changes.push(StateChange::RepositoryChanged {
                initialized: new.is_repository_initialized,
                branch: new.current_branch.clone(),
            });
        }

        if old.snapshot_error != new.snapshot_error {
            if let Some(error) = &new.snapshot_error {
                changes.push(StateChange::SnapshotFailed {
                    error: error.clone(),
                });
            }
        }

        if old.active_profile != new.active_profile {
            changes.push(StateChange::ProfileActivated {
                profile_id: new.active_profile.clone(),
            });
        }

        if old.auto_snapshot != new.auto_snapshot
            || old.history_limit != new.history_limit
            || old.script_warning_threshold != new.script_warning_threshold
        {
            changes.push(StateChange::SettingsChanged);
        }

        changes
    }

    // Convenience methods for common state updates

    /// Mark an operation as running
    pub fn begin_operation(&self, operation: impl Into<String>) -> Vec<StateChange> {
        let operation = operation.into();
        self.update(|state| {
            state.current_operation = operation;
            state.last_error = None;
            state.snapshot_error = None;
            state.is_busy = true;
        })
    }

    /// Mark the running operation as done, recording its error if it failed
    pub fn finish_operation(&self, error: Option<String>) -> Vec<StateChange> {
        self.update(|state| {
            state.is_busy = false;
            state.current_operation.clear();
            state.last_error = error;
        })
    }

    /// Replace the whole library after a scan
    pub fn set_mods(&self, mods: Vec<ModRecord>, conflicts: ConflictReport) -> Vec<StateChange> {
        self.update(|state| {
            state.mods = mods;
            state.conflicts = conflicts;
            state.last_scan_at = Some(Utc::now());
        })
    }

    /// Apply a single-record change (toggle or import)
    pub fn apply_mod(&self, record: ModRecord, conflicts: ConflictReport) -> Vec<StateChange> {
        self.update(|state| {
            state.replace_mod(record);
            state.conflicts = conflicts;
        })
    }

    pub fn remove_mod(&self, mod_id: &str, conflicts: ConflictReport) -> Vec<StateChange> {
        self.update(|state| {
            state.remove_mod(mod_id);
            state.conflicts = conflicts;
        })
    }

    pub fn set_history(&self, history: Vec<Snapshot>) -> Vec<StateChange> {
        self.update(|state| state.history = history)
    }

    pub fn set_repository(&self, initialized: bool, branch: Option<String>) -> Vec<StateChange> {
        self.update(|state| {
            state.is_repository_initialized = initialized;
            state.current_branch = branch;
        })
    }

    /// Record the outcome of an automatic snapshot; `None` clears a previous failure
    pub fn set_snapshot_error(&self, error: Option<String>) -> Vec<StateChange> {
        self.update(|state| state.snapshot_error = error)
    }

    pub fn set_active_profile(&self, profile_id: Option<String>) -> Vec<StateChange> {
        self.update(|state| state.active_profile = profile_id)
    }

    /// Forget everything learned from the current mods root
    pub fn reset_library(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_library());

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }

    /// Populate paths and settings from the user configuration
    pub fn load_from_user_config(&self, user_config: &crate::models::UserConfig) -> Vec<StateChange> {
        self.update(|state| {
            let settings = &user_config.manager_settings;

            state.mods_root = settings.mods_root();
            state.is_mods_root_configured = state.mods_root.is_some();
            state.auto_snapshot = settings.auto_snapshot;
            state.history_limit = settings.history_limit;
            state.script_warning_threshold = settings.script_warning_threshold;

            tracing::info!(
                "Loaded user config: mods_root={:?}, auto_snapshot={}, history_limit={}",
                state.mods_root,
                state.auto_snapshot,
                state.history_limit
            );
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
