//! CLI argument parsing using clap derive

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// ModLedger - enable, disable and version The Sims 4 mods
#[derive(Parser, Debug)]
#[command(name = "modledger")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding `ModLedger Config.yaml`, the record store and logs
    #[arg(long, global = true, default_value = "ModLedger Data")]
    pub config_dir: Utf8PathBuf,

    /// Use this mods folder instead of the configured one
    #[arg(long, global = true)]
    pub mods_path: Option<Utf8PathBuf>,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Remember a mods folder in the configuration file
    SetModsPath { path: Utf8PathBuf },

    /// Reconcile the record store with the mods folder
    Scan,

    /// List known mods
    List {
        #[arg(long, conflicts_with = "disabled")]
        enabled: bool,

        #[arg(long)]
        disabled: bool,
    },

    /// Flip a mod between enabled and disabled
    Toggle { id: String },

    Enable { id: String },

    Disable { id: String },

    /// Delete a mod file and its record
    Delete { id: String },

    /// Copy a mod file into the mods folder
    Import { path: Utf8PathBuf },

    /// Report duplicate and script-count conflicts among enabled mods
    Conflicts,

    /// Put the mods folder under version control
    Init,

    /// Commit the current state of the mods folder
    Snapshot {
        #[arg(short, long, default_value = "Manual snapshot")]
        message: String,
    },

    /// Show recent snapshots
    History {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Restore the mods folder to a snapshot, keeping a backup branch
    Rollback { id: String },

    /// List branches, marking the current one
    Branches,

    /// Create a branch at the current snapshot and switch to it
    CreateBranch { name: String },

    /// Check out another branch and re-scan the mods folder
    SwitchBranch { name: String },

    /// Manage named sets of enabled mods
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Re-scan whenever the mods folder changes, until Ctrl+C
    Watch,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProfileCommands {
    /// List profiles, marking the active one
    List,

    /// Save the currently enabled mods as a profile
    Create {
        name: String,

        #[arg(short = 'D', long)]
        description: Option<String>,
    },

    /// Enable exactly the mods of a profile (by id or name)
    Activate { profile: String },

    Delete { profile: String },
}
