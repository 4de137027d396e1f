// ModLedger - versioned mod state synchronization for The Sims 4 Mods folder
//
// Library crate with the engine: scanning, activation, conflict detection and
// git-backed snapshots. The binary crate (main.rs) is a command line front end.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::{ModError, ModResult};
pub use models::{AppState, ModRecord, UserConfig};
pub use services::ModManager;
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
