//! Services module - the mod state synchronization and versioning engine.
//!
//! Leaf-first:
//!
//! - [`naming`]: content hashes, display names, categories derived from file names
//! - [`store`]: the [`ModStore`] seam and its JSON-backed implementation
//! - [`scanner`]: walks the mods root and reconciles what it finds into the store
//! - [`activation`]: enables and disables one mod by renaming it
//! - [`profiles`]: named enabled sets applied through the activation manager
//! - [`conflicts`]: advisory findings over the enabled set
//! - [`vcs`]: serialized `git` queues per repository root (snapshot, history, rollback)
//! - [`watcher`]: debounced re-scans on filesystem events
//! - [`manager`]: [`ModManager`], the facade that ties the rest together
//!
//! Nothing here depends on a front end. State flows out through
//! [`StateManager`](crate::state::StateManager) events and plain return values.

pub mod activation;
pub mod conflicts;
pub mod manager;
pub mod naming;
pub mod profiles;
pub mod scanner;
pub mod store;
pub mod vcs;
pub mod watcher;

pub use activation::{ActivationManager, ToggleOutcome};
pub use conflicts::{build_report, detect_conflicts};
pub use manager::{ModManager, ProfileActivation, RollbackReport};
pub use profiles::JsonProfileStore;
pub use scanner::{ModScanner, ScanReport};
pub use store::{JsonModStore, ModStore};
pub use vcs::{GitCli, VcsOrchestrator};
pub use watcher::ModWatcher;
