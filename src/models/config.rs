use crate::models::mod_record::DEFAULT_DISABLED_SUFFIX;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User configuration from `ModLedger Config.yaml`
///
/// Contains the managed paths and the behaviour switches of the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "Manager_Settings")]
    pub manager_settings: ManagerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerSettings {
    #[serde(rename = "Mods Path", default)]
    pub mods_path: String,

    #[serde(rename = "Store Path", default)]
    pub store_path: String,

    #[serde(rename = "Auto Snapshot", default = "default_true")]
    pub auto_snapshot: bool,

    #[serde(rename = "Snapshot Before Rollback", default = "default_true")]
    pub snapshot_before_rollback: bool,

    #[serde(rename = "Watch Debounce Ms", default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    #[serde(rename = "Script Warning Threshold", default = "default_script_threshold")]
    pub script_warning_threshold: usize,

    #[serde(rename = "Disabled Suffix", default = "default_disabled_suffix")]
    pub disabled_suffix: String,

    #[serde(rename = "Mod Extensions", default = "default_mod_extensions")]
    pub mod_extensions: Vec<String>,

    #[serde(rename = "Author Name", default = "default_author_name")]
    pub author_name: String,

    #[serde(rename = "Author Email", default = "default_author_email")]
    pub author_email: String,

    #[serde(rename = "History Limit", default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            mods_path: String::new(),
            store_path: String::new(),
            auto_snapshot: true,
            snapshot_before_rollback: true,
            watch_debounce_ms: default_watch_debounce_ms(),
            script_warning_threshold: default_script_threshold(),
            disabled_suffix: default_disabled_suffix(),
            mod_extensions: default_mod_extensions(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            history_limit: default_history_limit(),
            debug_mode: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_watch_debounce_ms() -> u64 {
    750
}

fn default_script_threshold() -> usize {
    10
}

fn default_disabled_suffix() -> String {
    DEFAULT_DISABLED_SUFFIX.to_string()
}

fn default_mod_extensions() -> Vec<String> {
    vec![
        "package".to_string(),
        "ts4script".to_string(),
        "cfg".to_string(),
    ]
}

fn default_author_name() -> String {
    "Sims 4 Mod Manager".to_string()
}

fn default_author_email() -> String {
    "sims4-mod-manager@local".to_string()
}

fn default_history_limit() -> usize {
    50
}

impl ManagerSettings {
    /// Configured mods root, if one has been chosen, resolved against the
    /// working directory when relative
    pub fn mods_root(&self) -> Option<Utf8PathBuf> {
        (!self.mods_path.is_empty()).then(|| absolute_root(Utf8PathBuf::from(&self.mods_path)))
    }

    /// Profile list location, next to the record store
    pub fn profiles_file(&self, config_dir: &Utf8Path) -> Utf8PathBuf {
        let store = self.store_file(config_dir);
        match store.parent() {
            Some(parent) => parent.join("profiles.json"),
            None => config_dir.join("profiles.json"),
        }
    }

    /// Record store location; defaults to `<config_dir>/mods.json`
    pub fn store_file(&self, config_dir: &Utf8Path) -> Utf8PathBuf {
        if self.store_path.is_empty() {
            config_dir.join("mods.json")
        } else {
            Utf8PathBuf::from(&self.store_path)
        }
    }

    pub fn scan_config(&self, mods_root: Utf8PathBuf) -> ScanConfig {
        ScanConfig {
            mods_root: absolute_root(mods_root),
            extensions: self
                .mod_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            disabled_suffix: self.disabled_suffix.clone(),
        }
    }

    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            author_name: self.author_name.clone(),
            author_email: self.author_email.clone(),
            snapshot_before_rollback: self.snapshot_before_rollback,
        }
    }

    pub fn conflict_rules(&self) -> ConflictRules {
        ConflictRules {
            script_threshold: self.script_warning_threshold,
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            debounce: Duration::from_millis(self.watch_debounce_ms),
        }
    }
}

/// Stored record paths must be absolute, so a relative root is anchored to the
/// current directory. Absolute roots are returned untouched.
fn absolute_root(root: Utf8PathBuf) -> Utf8PathBuf {
    if root.is_absolute() {
        return root;
    }
    match std::path::absolute(&root).map(Utf8PathBuf::try_from) {
        Ok(Ok(absolute)) => absolute,
        Ok(Err(e)) => {
            tracing::warn!("Mods root {} resolves to a non UTF-8 path: {}", root, e);
            root
        }
        Err(e) => {
            tracing::warn!("Could not resolve mods root {}: {}", root, e);
            root
        }
    }
}

/// What the scanner and activation manager need to know about the mods folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub mods_root: Utf8PathBuf,
    /// Lowercase extensions without the leading dot
    pub extensions: Vec<String>,
    pub disabled_suffix: String,
}

impl ScanConfig {
    /// Config with the default extension set and suffix
    pub fn for_root(mods_root: impl Into<Utf8PathBuf>) -> Self {
        ManagerSettings::default().scan_config(mods_root.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub author_name: String,
    pub author_email: String,
    /// Commit dirty work before a rollback so the backup branch preserves it
    pub snapshot_before_rollback: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        ManagerSettings::default().repository_config()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRules {
    /// More enabled script mods than this raises a finding
    pub script_threshold: usize,
}

impl Default for ConflictRules {
    fn default() -> Self {
        Self {
            script_threshold: default_script_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        ManagerSettings::default().watch_config()
    }
}
