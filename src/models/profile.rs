use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named set of enabled mods, tied to the branch it was captured on.
///
/// Activating a profile enables exactly the mods in `mod_ids` and disables the
/// rest. Ids that no longer match a record are reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub mod_ids: Vec<String>,
    pub git_branch: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
}

impl Profile {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        mod_ids: Vec<String>,
        git_branch: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.filter(|d| !d.trim().is_empty()),
            mod_ids,
            git_branch: git_branch.into(),
            created_at: Utc::now(),
            last_used_at: None,
            is_active: false,
        }
    }

    pub fn includes(&self, mod_id: &str) -> bool {
        self.mod_ids.iter().any(|id| id == mod_id)
    }

    /// True if `key` is this profile's id or, ignoring case, its name
    pub fn matches(&self, key: &str) -> bool {
        self.id == key || self.name.eq_ignore_ascii_case(key.trim())
    }
}
