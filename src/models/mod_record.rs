use crate::error::{ModError, ModResult};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Filename suffix that marks a mod as disabled (`Foo.package` -> `Foo.package.disabled`).
pub const DEFAULT_DISABLED_SUFFIX: &str = ".disabled";

/// Broad grouping of a mod, inferred from its file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModCategory {
    Gameplay,
    Appearance,
    Build,
    Script,
    Override,
    Other,
}

impl ModCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModCategory::Gameplay => "gameplay",
            ModCategory::Appearance => "appearance",
            ModCategory::Build => "build",
            ModCategory::Script => "script",
            ModCategory::Override => "override",
            ModCategory::Other => "other",
        }
    }
}

impl fmt::Display for ModCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gameplay" => Ok(ModCategory::Gameplay),
            "appearance" => Ok(ModCategory::Appearance),
            "build" => Ok(ModCategory::Build),
            "script" => Ok(ModCategory::Script),
            "override" => Ok(ModCategory::Override),
            "other" => Ok(ModCategory::Other),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Everything the tool believes about one mod file.
///
/// `absolute_path` is authoritative and moves on every toggle; `display_name` is
/// cosmetic and must never be used to identify a mod. The path and `enabled` flag
/// are kept in lockstep, see [`ModRecord::check_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModRecord {
    pub id: String,
    pub display_name: String,
    /// Canonical file name with any disabled suffix stripped
    pub file_name: String,
    pub absolute_path: Utf8PathBuf,
    pub category: ModCategory,
    pub enabled: bool,
    pub file_size_bytes: u64,
    /// Lowercase hex SHA-256 over the file bytes
    pub content_hash: String,
    pub modified_at: DateTime<Utc>,
    pub installed_at: DateTime<Utc>,
    pub last_enabled_at: Option<DateTime<Utc>>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub conflicts: Vec<String>,
    pub dependencies: Vec<String>,
}

impl ModRecord {
    /// Verify that the on-disk path and the enabled flag agree.
    pub fn check_consistency(&self, disabled_suffix: &str) -> ModResult<()> {
        if self.enabled == is_disabled_path(&self.absolute_path, disabled_suffix) {
            return Err(ModError::InconsistentRecord {
                id: self.id.clone(),
                path: self.absolute_path.clone(),
                enabled: self.enabled,
            });
        }
        Ok(())
    }

    /// Path this record would occupy in the requested state.
    pub fn path_for_state(&self, enabled: bool, disabled_suffix: &str) -> Utf8PathBuf {
        let currently_disabled = is_disabled_path(&self.absolute_path, disabled_suffix);
        match (enabled, currently_disabled) {
            (true, true) => {
                let path = self.absolute_path.as_str();
                Utf8PathBuf::from(&path[..path.len() - disabled_suffix.len()])
            }
            (false, false) => Utf8PathBuf::from(format!("{}{}", self.absolute_path, disabled_suffix)),
            _ => self.absolute_path.clone(),
        }
    }

    pub fn is_script(&self) -> bool {
        self.category == ModCategory::Script
    }
}

/// True when the file name of `path` carries the disabled suffix.
pub fn is_disabled_path(path: &Utf8Path, disabled_suffix: &str) -> bool {
    path.file_name()
        .map(|name| name.ends_with(disabled_suffix))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, enabled: bool) -> ModRecord {
        let now = Utc::now();
        ModRecord {
            id: "mod-1".to_string(),
            display_name: "Foo".to_string(),
            file_name: "Foo.package".to_string(),
            absolute_path: Utf8PathBuf::from(path),
            category: ModCategory::Other,
            enabled,
            file_size_bytes: 3,
            content_hash: String::new(),
            modified_at: now,
            installed_at: now,
            last_enabled_at: None,
            version: None,
            author: None,
            conflicts: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    #[test]
    fn test_consistency_accepts_matching_state() {
        assert!(record("/mods/Foo.package", true).check_consistency(".disabled").is_ok());
        assert!(record("/mods/Foo.package.disabled", false).check_consistency(".disabled").is_ok());
    }

    #[test]
    fn test_consistency_rejects_divergence() {
        let err = record("/mods/Foo.package.disabled", true)
            .check_consistency(".disabled")
            .unwrap_err();
        assert!(matches!(err, ModError::InconsistentRecord { enabled: true, .. }));
        assert!(record("/mods/Foo.package", false).check_consistency(".disabled").is_err());
    }

    #[test]
    fn test_path_for_state() {
        let enabled = record("/mods/sub/Foo.package", true);
        assert_eq!(
            enabled.path_for_state(false, ".disabled"),
            Utf8PathBuf::from("/mods/sub/Foo.package.disabled")
        );
        assert_eq!(enabled.path_for_state(true, ".disabled"), enabled.absolute_path);

        let disabled = record("/mods/sub/Foo.package.disabled", false);
        assert_eq!(
            disabled.path_for_state(true, ".disabled"),
            Utf8PathBuf::from("/mods/sub/Foo.package")
        );
    }

    #[test]
    fn test_category_round_trip_through_str() {
        for category in [
            ModCategory::Gameplay,
            ModCategory::Appearance,
            ModCategory::Build,
            ModCategory::Script,
            ModCategory::Override,
            ModCategory::Other,
        ] {
            assert_eq!(category.as_str().parse::<ModCategory>(), Ok(category));
        }
        assert!("cas".parse::<ModCategory>().is_err());
    }
}
