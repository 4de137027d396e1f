use serde::{Deserialize, Serialize};

/// Kind of structural issue among enabled mods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    DuplicateFilename,
    ExcessiveScriptCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A reported issue among the currently enabled mods. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictFinding {
    pub kind: ConflictKind,
    /// Sorted ids of every mod involved
    pub affected_mod_ids: Vec<String>,
    pub severity: Severity,
    /// Always false: resolving a conflict needs the user's judgment
    pub auto_resolvable: bool,
    pub description: String,
}

/// Findings plus one suggestion per distinct kind of finding
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictFinding>,
    pub suggestions: Vec<String>,
}
