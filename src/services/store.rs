//! Mod record store: the durable table of mods the tool believes exist.
//!
//! [`ModStore`] is the seam the scanner and activation manager write through.
//! [`JsonModStore`] keeps the table in memory and persists it as one JSON document,
//! one row per mod. Rows are mapped to [`ModRecord`]s field by field at load time so
//! that malformed data is rejected before it reaches the rest of the engine.

use crate::error::{ModError, ModResult};
use crate::models::{ModCategory, ModRecord};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::{PoisonError, RwLock};

const SCHEMA_VERSION: u32 = 1;

/// CRUD access to mod records, keyed by record id
#[cfg_attr(test, mockall::automock)]
pub trait ModStore: Send + Sync {
    fn get(&self, id: &str) -> ModResult<Option<ModRecord>>;

    /// All records in insertion order
    fn list(&self) -> ModResult<Vec<ModRecord>>;

    fn find_by_path(&self, path: &Utf8Path) -> ModResult<Option<ModRecord>>;

    fn upsert(&self, record: ModRecord) -> ModResult<()>;

    /// Remove a record, returning it if it existed
    fn delete(&self, id: &str) -> ModResult<Option<ModRecord>>;

    /// Replace the whole table in one write (used by reconciliation)
    fn replace_all(&self, records: Vec<ModRecord>) -> ModResult<()>;
}

/// One persisted row. Timestamps are RFC 3339 strings and the auxiliary id lists
/// are JSON-encoded arrays, as the storage schema requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredModRow {
    pub id: String,
    pub name: String,
    pub file_name: String,
    pub path: String,
    pub category: String,
    pub enabled: bool,
    pub file_size: u64,
    pub content_hash: String,
    pub date_modified: String,
    pub date_added: String,
    pub last_enabled: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub conflicts: Option<String>,
    pub dependencies: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    version: u32,
    mods: Vec<StoredModRow>,
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn encode_ids(ids: &[String]) -> Option<String> {
    if ids.is_empty() {
        None
    } else {
        serde_json::to_string(ids).ok()
    }
}

impl From<&ModRecord> for StoredModRow {
    fn from(record: &ModRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.display_name.clone(),
            file_name: record.file_name.clone(),
            path: record.absolute_path.to_string(),
            category: record.category.as_str().to_string(),
            enabled: record.enabled,
            file_size: record.file_size_bytes,
            content_hash: record.content_hash.clone(),
            date_modified: timestamp(&record.modified_at),
            date_added: timestamp(&record.installed_at),
            last_enabled: record.last_enabled_at.as_ref().map(timestamp),
            version: record.version.clone(),
            author: record.author.clone(),
            conflicts: encode_ids(&record.conflicts),
            dependencies: encode_ids(&record.dependencies),
        }
    }
}

impl TryFrom<StoredModRow> for ModRecord {
    type Error = ModError;

    fn try_from(row: StoredModRow) -> ModResult<Self> {
        let id = row.id;
        let malformed = |field: &'static str, reason: String| ModError::MalformedRecord {
            id: id.clone(),
            field,
            reason,
        };

        if id.trim().is_empty() {
            return Err(malformed("id", "empty".to_string()));
        }
        if row.file_name.is_empty() {
            return Err(malformed("fileName", "empty".to_string()));
        }

        let absolute_path = Utf8PathBuf::from(row.path);
        if !absolute_path.is_absolute() {
            return Err(malformed(
                "path",
                format!("'{}' is not absolute", absolute_path),
            ));
        }

        let category = row
            .category
            .parse::<ModCategory>()
            .map_err(|reason| malformed("category", reason))?;

        if row.content_hash.len() != 64 || !row.content_hash.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(malformed(
                "contentHash",
                format!("'{}' is not a SHA-256 hex digest", row.content_hash),
            ));
        }

        let parse_time = |field: &'static str, value: &str| {
            DateTime::parse_from_rfc3339(value)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| malformed(field, format!("'{}': {}", value, e)))
        };
        let modified_at = parse_time("dateModified", &row.date_modified)?;
        let installed_at = parse_time("dateAdded", &row.date_added)?;
        let last_enabled_at = row
            .last_enabled
            .as_deref()
            .map(|value| parse_time("lastEnabled", value))
            .transpose()?;

        let parse_ids = |field: &'static str, value: Option<String>| -> ModResult<Vec<String>> {
            match value {
                None => Ok(Vec::new()),
                Some(json) => serde_json::from_str::<Vec<String>>(&json)
                    .map_err(|e| malformed(field, e.to_string())),
            }
        };
        let conflicts = parse_ids("conflicts", row.conflicts)?;
        let dependencies = parse_ids("dependencies", row.dependencies)?;

        Ok(ModRecord {
            id,
            display_name: row.name,
            file_name: row.file_name,
            absolute_path,
            category,
            enabled: row.enabled,
            file_size_bytes: row.file_size,
            content_hash: row.content_hash.to_ascii_lowercase(),
            modified_at,
            installed_at,
            last_enabled_at,
            version: row.version,
            author: row.author,
            conflicts,
            dependencies,
        })
    }
}

/// Write `contents` next to `path` and rename it into place, creating the
/// parent directory first.
pub(crate) fn replace_file(path: &Utf8Path, contents: &str) -> ModResult<()> {
    let store_error = |message: String| ModError::Store {
        path: path.to_path_buf(),
        message,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| store_error(format!("create directory failed: {}", e)))?;
    }

    let tmp = Utf8PathBuf::from(format!("{}.tmp", path));
    fs::write(&tmp, contents).map_err(|e| store_error(format!("write failed: {}", e)))?;
    fs::rename(&tmp, path).map_err(|e| store_error(format!("replace failed: {}", e)))
}

/// In-memory record table, optionally persisted to a JSON file on every write.
///
/// Writes are applied to a copy, persisted, and only then made visible, so a
/// failed write leaves both the file and the in-memory table unchanged.
#[derive(Debug)]
pub struct JsonModStore {
    path: Option<Utf8PathBuf>,
    disabled_suffix: String,
    records: RwLock<IndexMap<String, ModRecord>>,
}

impl JsonModStore {
    /// Open (or create on first write) the store at `path`.
    pub fn open(path: impl Into<Utf8PathBuf>, disabled_suffix: &str) -> ModResult<Self> {
        let path = path.into();
        let records = if path.exists() {
            Self::load(&path, disabled_suffix)?
        } else {
            tracing::info!("Record store {} does not exist yet, starting empty", path);
            IndexMap::new()
        };

        Ok(Self {
            path: Some(path),
            disabled_suffix: disabled_suffix.to_string(),
            records: RwLock::new(records),
        })
    }

    /// Store that never touches the disk
    pub fn in_memory(disabled_suffix: &str) -> Self {
        Self {
            path: None,
            disabled_suffix: disabled_suffix.to_string(),
            records: RwLock::new(IndexMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    fn load(path: &Utf8Path, disabled_suffix: &str) -> ModResult<IndexMap<String, ModRecord>> {
        let contents = fs::read_to_string(path).map_err(|e| ModError::Store {
            path: path.to_path_buf(),
            message: format!("read failed: {}", e),
        })?;
        let document: StoredDocument =
            serde_json::from_str(&contents).map_err(|e| ModError::Store {
                path: path.to_path_buf(),
                message: format!("parse failed: {}", e),
            })?;

        if document.version != SCHEMA_VERSION {
            return Err(ModError::Store {
                path: path.to_path_buf(),
                message: format!("unsupported schema version {}", document.version),
            });
        }

        let mut records = IndexMap::with_capacity(document.mods.len());
        for row in document.mods {
            let record = ModRecord::try_from(row)?;
            record.check_consistency(disabled_suffix)?;
            records.insert(record.id.clone(), record);
        }

        tracing::info!("Loaded {} mod records from {}", records.len(), path);
        Ok(records)
    }

    fn persist(&self, records: &IndexMap<String, ModRecord>) -> ModResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let store_error = |message: String| ModError::Store {
            path: path.clone(),
            message,
        };

        let document = StoredDocument {
            version: SCHEMA_VERSION,
            mods: records.values().map(StoredModRow::from).collect(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| store_error(format!("serialize failed: {}", e)))?;

        replace_file(path, &json)?;

        tracing::debug!("Persisted {} mod records to {}", records.len(), path);
        Ok(())
    }

    /// Apply `f` to a copy of the table, persist it, then publish it.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut IndexMap<String, ModRecord>) -> ModResult<R>,
    ) -> ModResult<R> {
        let mut guard = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let result = f(&mut next)?;
        // Unchanged tables are not rewritten, so a watcher on the store's folder
        // does not see a write for every idle re-scan.
        if next != *guard {
            self.persist(&next)?;
            *guard = next;
        }
        Ok(result)
    }
}

impl ModStore for JsonModStore {
    fn get(&self, id: &str) -> ModResult<Option<ModRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    fn list(&self) -> ModResult<Vec<ModRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }

    fn find_by_path(&self, path: &Utf8Path) -> ModResult<Option<ModRecord>> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .values()
            .find(|record| record.absolute_path == path)
            .cloned())
    }

    fn upsert(&self, record: ModRecord) -> ModResult<()> {
        record.check_consistency(&self.disabled_suffix)?;
        self.mutate(|records| {
            records.insert(record.id.clone(), record);
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> ModResult<Option<ModRecord>> {
        self.mutate(|records| Ok(records.shift_remove(id)))
    }

    fn replace_all(&self, records: Vec<ModRecord>) -> ModResult<()> {
        for record in &records {
            record.check_consistency(&self.disabled_suffix)?;
        }
        self.mutate(|table| {
            *table = records
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect();
            Ok(())
        })
    }
}
