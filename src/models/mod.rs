//! Data models for the mod synchronization engine.
//!
//! - [`ModRecord`]: everything known about one mod file; its path and `enabled` flag move together
//! - [`ConflictFinding`] / [`ConflictReport`]: advisory issues among enabled mods, never persisted
//! - [`Snapshot`]: one commit of the mods repository, plus the mod changes read from its message
//! - [`Profile`]: a named enabled set, persisted next to the record store
//! - [`UserConfig`]: settings loaded from `ModLedger Config.yaml`, and the per-component configs derived from it
//! - [`AppState`]: the front-end view held by [`StateManager`](crate::state::StateManager)

pub mod app_state;
pub mod config;
pub mod conflict;
pub mod mod_record;
pub mod profile;
pub mod snapshot;

pub use app_state::AppState;
pub use config::{
    ConflictRules, ManagerSettings, RepositoryConfig, ScanConfig, UserConfig, WatchConfig,
};
pub use conflict::{ConflictFinding, ConflictKind, ConflictReport, Severity};
pub use mod_record::{DEFAULT_DISABLED_SUFFIX, ModCategory, ModRecord, is_disabled_path};
pub use profile::Profile;
pub use snapshot::{
    ModChange, ModChangeAction, RepositoryState, RepositoryStatus, Snapshot, SnapshotOutcome,
};
