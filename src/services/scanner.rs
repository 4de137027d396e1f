//! Filesystem scanner: discovers mod files under the mods root and reconciles them
//! into the record store.
//!
//! # Identity across re-scans
//!
//! A record keeps its id when the same absolute path is seen again. A file at a new
//! path whose content hash matches a stored record whose own path has vanished is
//! treated as the same mod moved or renamed outside the tool. Anything else gets a
//! fresh UUID, and stored records no file claimed are removed.

use crate::error::{ModError, ModResult};
use crate::models::{ModRecord, ScanConfig};
use crate::services::naming;
use crate::services::store::ModStore;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs;
use walkdir::WalkDir;

/// Filesystem facts about one candidate mod file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub path: Utf8PathBuf,
    /// File name with the disabled suffix stripped
    pub file_name: String,
    pub enabled: bool,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of reconciling the disk with the store
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub records: Vec<ModRecord>,
    pub added: usize,
    pub updated: usize,
    pub relocated: usize,
    pub removed: usize,
    /// Candidate files that could not be read
    pub skipped: usize,
    /// Files whose content hash had to be computed
    pub hashed: usize,
}

impl ScanReport {
    pub fn summary(&self) -> String {
        format!(
            "{} mods ({} added, {} updated, {} relocated, {} removed, {} skipped)",
            self.records.len(),
            self.added,
            self.updated,
            self.relocated,
            self.removed,
            self.skipped
        )
    }
}

/// Walks the mods root and synthesizes [`ModRecord`]s from what it finds.
#[derive(Debug, Clone)]
pub struct ModScanner {
    config: ScanConfig,
}

impl ModScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Classify a file name: `Some((canonical_name, enabled))` for mod candidates.
    pub fn classify(&self, file_name: &str) -> Option<(String, bool)> {
        let (canonical, disabled) =
            naming::strip_disabled_suffix(file_name, &self.config.disabled_suffix);
        let extension = naming::extension_of(canonical)?;
        self.config
            .extensions
            .iter()
            .any(|known| *known == extension)
            .then(|| (canonical.to_string(), !disabled))
    }

    /// Stat a single path, returning `None` if it is not a readable mod candidate.
    pub fn observe(&self, path: &Utf8Path) -> Option<Observation> {
        let (file_name, enabled) = self.classify(path.file_name()?)?;
        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!("Skipping unreadable mod file {}: {}", path, e);
                return None;
            }
        };

        let modified_at: DateTime<Utc> = match metadata.modified() {
            Ok(time) => time.into(),
            Err(e) => {
                tracing::warn!("Skipping {}: no modification time ({})", path, e);
                return None;
            }
        };
        let created_at = metadata
            .created()
            .map(DateTime::<Utc>::from)
            .unwrap_or(modified_at);

        Some(Observation {
            path: path.to_path_buf(),
            file_name,
            enabled,
            size: metadata.len(),
            modified_at,
            created_at,
        })
    }

    /// Recursively collect every mod candidate under the root, sorted by path.
    ///
    /// Unreadable directories and files are logged and skipped.
    pub fn discover(&self) -> ModResult<Vec<Observation>> {
        let root = &self.config.mods_root;
        if !root.is_dir() {
            return Err(ModError::NotFound(format!("mods folder {}", root)));
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(path) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
                tracing::warn!("Skipping file with non UTF-8 path under {}", root);
                continue;
            };

            if let Some(observation) = self.observe(&path) {
                found.push(observation);
            }
        }

        tracing::debug!("Discovered {} mod candidates under {}", found.len(), root);
        Ok(found)
    }

    /// Build a record for `observation`, reusing identity and the stored hash from
    /// `previous` when size and modification time are unchanged.
    fn build_record(
        &self,
        observation: &Observation,
        content_hash: String,
        previous: Option<&ModRecord>,
    ) -> ModRecord {
        let now = Utc::now();
        let (id, installed_at, last_enabled_at, conflicts, dependencies) = match previous {
            Some(prev) => {
                let last_enabled_at = if observation.enabled && !prev.enabled {
                    Some(now)
                } else {
                    prev.last_enabled_at
                };
                (
                    prev.id.clone(),
                    prev.installed_at,
                    last_enabled_at,
                    prev.conflicts.clone(),
                    prev.dependencies.clone(),
                )
            }
            None => (
                uuid::Uuid::new_v4().to_string(),
                observation.created_at,
                None,
                Vec::new(),
                Vec::new(),
            ),
        };

        ModRecord {
            id,
            display_name: naming::derive_display_name(&observation.file_name),
            file_name: observation.file_name.clone(),
            absolute_path: observation.path.clone(),
            category: naming::categorize(&observation.file_name),
            enabled: observation.enabled,
            file_size_bytes: observation.size,
            content_hash,
            modified_at: observation.modified_at,
            installed_at,
            last_enabled_at,
            version: naming::extract_version(&observation.file_name),
            author: naming::extract_author(&observation.file_name),
            conflicts,
            dependencies,
        }
    }

    /// Build a fresh record for one file that is not in the store yet.
    pub fn synthesize(&self, path: &Utf8Path) -> ModResult<ModRecord> {
        let observation = self
            .observe(path)
            .ok_or_else(|| ModError::NotFound(format!("mod file {}", path)))?;
        let content_hash = naming::hash_file(path.as_std_path())
            .map_err(|e| ModError::fs("hash", path, e))?;
        Ok(self.build_record(&observation, content_hash, None))
    }

    /// Walk the root and make the store match it.
    pub fn scan(&self, store: &dyn ModStore) -> ModResult<ScanReport> {
        let observations = self.discover()?;
        let existing = store.list()?;
        let mut report = ScanReport::default();

        let by_path: HashMap<&Utf8Path, &ModRecord> = existing
            .iter()
            .map(|record| (record.absolute_path.as_path(), record))
            .collect();
        let mut claimed: HashSet<String> = HashSet::new();
        let mut records = Vec::with_capacity(observations.len());
        let mut unmatched = Vec::new();

        // Same path, same mod.
        for observation in &observations {
            let Some(prev) = by_path.get(observation.path.as_path()).copied() else {
                unmatched.push(observation);
                continue;
            };
            claimed.insert(prev.id.clone());

            let unchanged =
                prev.file_size_bytes == observation.size && prev.modified_at == observation.modified_at;
            let content_hash = if unchanged {
                prev.content_hash.clone()
            } else {
                match naming::hash_file(observation.path.as_std_path()) {
                    Ok(hash) => {
                        report.hashed += 1;
                        hash
                    }
                    Err(e) => {
                        tracing::warn!("Keeping stale record for unreadable {}: {}", observation.path, e);
                        report.skipped += 1;
                        records.push(prev.clone());
                        continue;
                    }
                }
            };

            let record = self.build_record(observation, content_hash, Some(prev));
            if record != *prev {
                report.updated += 1;
            }
            records.push(record);
        }

        // New paths: either a relocated mod or a brand new one.
        for observation in unmatched {
            let content_hash = match naming::hash_file(observation.path.as_std_path()) {
                Ok(hash) => {
                    report.hashed += 1;
                    hash
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable mod file {}: {}", observation.path, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let relocated = existing.iter().find(|candidate| {
                !claimed.contains(&candidate.id)
                    && candidate.content_hash == content_hash
                    && !candidate.absolute_path.exists()
            });

            match relocated {
                Some(prev) => {
                    tracing::info!(
                        "Mod {} moved from {} to {}",
                        prev.id,
                        prev.absolute_path,
                        observation.path
                    );
                    claimed.insert(prev.id.clone());
                    report.relocated += 1;
                    records.push(self.build_record(observation, content_hash, Some(prev)));
                }
                None => {
                    report.added += 1;
                    records.push(self.build_record(observation, content_hash, None));
                }
            }
        }

        report.removed = existing
            .iter()
            .filter(|record| !claimed.contains(&record.id))
            .inspect(|record| tracing::info!("Mod {} vanished from {}", record.id, record.absolute_path))
            .count();

        records.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));
        store.replace_all(records.clone())?;
        report.records = records;

        tracing::info!("Scan of {} complete: {}", self.config.mods_root, report.summary());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::JsonModStore;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ModScanner) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, ModScanner::new(ScanConfig::for_root(root)))
    }

    fn root(scanner: &ModScanner) -> &Utf8Path {
        &scanner.config().mods_root
    }

    #[test]
    fn test_classify() {
        let (_dir, scanner) = setup();
        assert_eq!(
            scanner.classify("Foo.package"),
            Some(("Foo.package".to_string(), true))
        );
        assert_eq!(
            scanner.classify("Foo.TS4SCRIPT.disabled"),
            Some(("Foo.TS4SCRIPT".to_string(), false))
        );
        assert_eq!(scanner.classify("notes.txt"), None);
        assert_eq!(scanner.classify("notes.txt.disabled"), None);
        assert_eq!(scanner.classify("Foo.disabled"), None);
    }

    #[test]
    fn test_discover_walks_subdirectories_and_skips_git() {
        let (_dir, scanner) = setup();
        let root = root(&scanner);
        fs::create_dir_all(root.join("Creator/Hair")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::write(root.join("Top.package"), b"a").unwrap();
        fs::write(root.join("Creator/Hair/Long.package.disabled"), b"b").unwrap();
        fs::write(root.join("Creator/readme.txt"), b"c").unwrap();
        fs::write(root.join(".git/objects/x.package"), b"d").unwrap();

        let found = scanner.discover().unwrap();
        let names: Vec<&str> = found.iter().map(|o| o.file_name.as_str()).collect();
        assert_eq!(names, vec!["Long.package", "Top.package"]);
        assert!(!found[0].enabled);
        assert!(found[1].enabled);
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let scanner = ModScanner::new(ScanConfig::for_root("/definitely/not/here"));
        assert!(matches!(scanner.discover(), Err(ModError::NotFound(_))));
    }

    #[test]
    fn test_scan_populates_store() {
        let (_dir, scanner) = setup();
        let root = root(&scanner);
        fs::write(root.join("[Zero]Cool_Traits_v1.2.package"), b"traits").unwrap();
        fs::write(root.join("helper.ts4script.disabled"), b"script").unwrap();

        let store = JsonModStore::in_memory(".disabled");
        let report = scanner.scan(&store).unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.hashed, 2);
        let stored = store.list().unwrap();
        assert_eq!(stored.len(), 2);

        let traits = stored.iter().find(|r| r.file_name.starts_with("[Zero]")).unwrap();
        assert_eq!(traits.display_name, "Cool Traits");
        assert_eq!(traits.version.as_deref(), Some("1.2"));
        assert_eq!(traits.author.as_deref(), Some("Zero"));
        assert_eq!(traits.content_hash, naming::hash_bytes(b"traits"));

        let script = stored.iter().find(|r| r.file_name == "helper.ts4script").unwrap();
        assert!(!script.enabled);
        assert!(script.is_script());
    }

    #[test]
    fn test_rescan_is_idempotent() {
        let (_dir, scanner) = setup();
        let root = root(&scanner);
        fs::write(root.join("A.package"), b"a").unwrap();
        fs::write(root.join("B.package.disabled"), b"b").unwrap();

        let store = JsonModStore::in_memory(".disabled");
        let first = scanner.scan(&store).unwrap();
        let second = scanner.scan(&store).unwrap();

        assert_eq!(first.records, second.records);
        assert_eq!(second.added, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.hashed, 0);
    }

    #[test]
    fn test_external_rename_keeps_identity() {
        let (_dir, scanner) = setup();
        let root = root(&scanner);
        fs::write(root.join("Old.package"), b"same bytes").unwrap();

        let store = JsonModStore::in_memory(".disabled");
        let first = scanner.scan(&store).unwrap();
        let id = first.records[0].id.clone();

        fs::rename(root.join("Old.package"), root.join("New.package")).unwrap();
        let second = scanner.scan(&store).unwrap();

        assert_eq!(second.relocated, 1);
        assert_eq!(second.removed, 0);
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].id, id);
        assert_eq!(second.records[0].file_name, "New.package");
    }

    #[test]
    fn test_deleted_files_are_removed() {
        let (_dir, scanner) = setup();
        let root = root(&scanner);
        fs::write(root.join("A.package"), b"a").unwrap();
        fs::write(root.join("B.package"), b"b").unwrap();

        let store = JsonModStore::in_memory(".disabled");
        scanner.scan(&store).unwrap();
        fs::remove_file(root.join("B.package")).unwrap();

        let report = scanner.scan(&store).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_changed_content_is_rehashed() {
        let (_dir, scanner) = setup();
        let root = root(&scanner);
        let path = root.join("A.package");
        fs::write(&path, b"a").unwrap();

        let store = JsonModStore::in_memory(".disabled");
        let first = scanner.scan(&store).unwrap();
        fs::write(&path, b"longer contents").unwrap();

        let second = scanner.scan(&store).unwrap();
        assert_eq!(second.records[0].id, first.records[0].id);
        assert_eq!(second.records[0].content_hash, naming::hash_bytes(b"longer contents"));
        assert_eq!(second.updated, 1);
    }
}
