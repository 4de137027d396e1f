//! Conflict detection over the enabled mod set.
//!
//! Two rules, both advisory: mods whose canonical file names collide when
//! compared case-insensitively, and too many enabled script mods.

use crate::models::{
    ConflictFinding, ConflictKind, ConflictReport, ConflictRules, ModRecord, Severity,
};
use std::collections::BTreeMap;

const DUPLICATE_SUGGESTION: &str = "Consider keeping only one version of duplicate mods";
const SCRIPT_SUGGESTION: &str = "Try disabling some script mods to improve performance";

/// Findings for the enabled records in `records`, in a stable order: duplicate
/// groups sorted by lowercase file name, then the script-count finding.
pub fn detect_conflicts(records: &[ModRecord], rules: &ConflictRules) -> Vec<ConflictFinding> {
    let enabled: Vec<&ModRecord> = records.iter().filter(|r| r.enabled).collect();
    let mut findings = Vec::new();

    let mut by_name: BTreeMap<String, Vec<&ModRecord>> = BTreeMap::new();
    for record in &enabled {
        by_name
            .entry(record.file_name.to_lowercase())
            .or_default()
            .push(record);
    }

    for (name, group) in by_name.into_iter().filter(|(_, group)| group.len() > 1) {
        let mut ids: Vec<String> = group.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        findings.push(ConflictFinding {
            kind: ConflictKind::DuplicateFilename,
            description: format!("{} enabled copies of {}", ids.len(), name),
            affected_mod_ids: ids,
            severity: Severity::Medium,
            auto_resolvable: false,
        });
    }

    let mut script_ids: Vec<String> = enabled
        .iter()
        .filter(|r| r.is_script())
        .map(|r| r.id.clone())
        .collect();
    if script_ids.len() > rules.script_threshold {
        script_ids.sort();
        findings.push(ConflictFinding {
            kind: ConflictKind::ExcessiveScriptCount,
            description: format!(
                "{} script mods are enabled (more than {})",
                script_ids.len(),
                rules.script_threshold
            ),
            affected_mod_ids: script_ids,
            severity: Severity::Low,
            auto_resolvable: false,
        });
    }

    if !findings.is_empty() {
        tracing::debug!("Detected {} conflict findings", findings.len());
    }
    findings
}

/// Wrap findings with one suggestion per distinct kind.
pub fn build_report(findings: Vec<ConflictFinding>) -> ConflictReport {
    let mut suggestions = Vec::new();
    for kind in [ConflictKind::DuplicateFilename, ConflictKind::ExcessiveScriptCount] {
        if findings.iter().any(|f| f.kind == kind) {
            suggestions.push(
                match kind {
                    ConflictKind::DuplicateFilename => DUPLICATE_SUGGESTION,
                    ConflictKind::ExcessiveScriptCount => SCRIPT_SUGGESTION,
                }
                .to_string(),
            );
        }
    }

    ConflictReport {
        has_conflicts: !findings.is_empty(),
        conflicts: findings,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModCategory;
    use camino::Utf8PathBuf;
    use chrono::Utc;
    use proptest::prelude::*;

    fn record(id: &str, file_name: &str, category: ModCategory, enabled: bool) -> ModRecord {
        let now = Utc::now();
        let suffix = if enabled { "" } else { ".disabled" };
        ModRecord {
            id: id.to_string(),
            display_name: file_name.to_string(),
            file_name: file_name.to_string(),
            absolute_path: Utf8PathBuf::from(format!("/mods/{}/{}{}", id, file_name, suffix)),
            category,
            enabled,
            file_size_bytes: 1,
            content_hash: "0".repeat(64),
            modified_at: now,
            installed_at: now,
            last_enabled_at: None,
            version: None,
            author: None,
            conflicts: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    fn scripts(count: usize) -> Vec<ModRecord> {
        (0..count)
            .map(|i| record(&format!("s{:02}", i), &format!("s{}.ts4script", i), ModCategory::Script, true))
            .collect()
    }

    #[test]
    fn test_case_insensitive_duplicates() {
        let records = vec![
            record("b", "foo.package", ModCategory::Other, true),
            record("a", "Foo.package", ModCategory::Other, true),
        ];
        let findings = detect_conflicts(&records, &ConflictRules::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ConflictKind::DuplicateFilename);
        assert_eq!(findings[0].affected_mod_ids, vec!["a", "b"]);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert!(!findings[0].auto_resolvable);
    }

    #[test]
    fn test_disabled_mods_are_ignored() {
        let records = vec![
            record("a", "Foo.package", ModCategory::Other, true),
            record("b", "Foo.package", ModCategory::Other, false),
        ];
        assert!(detect_conflicts(&records, &ConflictRules::default()).is_empty());
    }

    #[test]
    fn test_script_threshold_boundary() {
        let rules = ConflictRules::default();
        assert!(detect_conflicts(&scripts(10), &rules).is_empty());

        let findings = detect_conflicts(&scripts(11), &rules);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, ConflictKind::ExcessiveScriptCount);
        assert_eq!(findings[0].severity, Severity::Low);
        assert_eq!(findings[0].affected_mod_ids.len(), 11);
    }

    #[test]
    fn test_findings_order_and_report() {
        let mut records = scripts(3);
        records.push(record("z1", "Zed.package", ModCategory::Other, true));
        records.push(record("z2", "zed.package", ModCategory::Other, true));
        records.push(record("a1", "Alpha.package", ModCategory::Other, true));
        records.push(record("a2", "ALPHA.package", ModCategory::Other, true));

        let findings = detect_conflicts(&records, &ConflictRules { script_threshold: 2 });
        let kinds: Vec<ConflictKind> = findings.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ConflictKind::DuplicateFilename,
                ConflictKind::DuplicateFilename,
                ConflictKind::ExcessiveScriptCount
            ]
        );
        assert_eq!(findings[0].affected_mod_ids, vec!["a1", "a2"]);

        let report = build_report(findings);
        assert!(report.has_conflicts);
        assert_eq!(report.suggestions, vec![DUPLICATE_SUGGESTION, SCRIPT_SUGGESTION]);
    }

    #[test]
    fn test_empty_report() {
        let report = build_report(Vec::new());
        assert!(!report.has_conflicts);
        assert!(report.suggestions.is_empty());
    }

    proptest! {
        #[test]
        fn prop_findings_independent_of_input_order(seed in any::<u64>()) {
            let mut records = scripts(12);
            records.push(record("d1", "Dup.package", ModCategory::Other, true));
            records.push(record("d2", "dup.PACKAGE", ModCategory::Other, true));

            let expected = detect_conflicts(&records, &ConflictRules::default());
            let len = records.len();
            records.rotate_left((seed as usize) % len);
            records.reverse();
            prop_assert_eq!(detect_conflicts(&records, &ConflictRules::default()), expected);
        }
    }
}
