use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One commit in the mods repository, newest first when listed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub message: String,
    pub authored_at: DateTime<Utc>,
    /// `Name <email>`
    pub author: String,
    pub changed_paths: Vec<String>,
    /// Best-effort reading of the commit message ("Enabled mod: Foo")
    pub mod_changes: Vec<ModChange>,
}

impl Snapshot {
    /// Abbreviated revision id for display
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(7)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModChangeAction {
    Added,
    Removed,
    Enabled,
    Disabled,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModChange {
    pub mod_name: String,
    pub action: ModChangeAction,
}

/// Result of asking for a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Created(String),
    /// Nothing was staged, so no commit was made
    NoChanges,
}

impl SnapshotOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            SnapshotOutcome::Created(id) => Some(id),
            SnapshotOutcome::NoChanges => None,
        }
    }
}

/// Result of `ensure_repository`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryStatus {
    Initialized,
    AlreadyInitialized,
}

/// Lifecycle of one repository root.
///
/// Every operation that leaves `Initialized` returns to it (or to `Uninitialized`
/// if initialization failed) before the queue runs the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepositoryState {
    Uninitialized,
    Initialized,
    Snapshotting,
    RollingBack,
}
