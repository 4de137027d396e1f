//! Activation manager: flips a mod between enabled and disabled by renaming it.
//!
//! The rename is the commit point. The store is only written after the rename
//! succeeds, and a failed store write puts the file back where it was.

use crate::error::{ModError, ModResult};
use crate::models::ModRecord;
use crate::services::store::ModStore;
use camino::Utf8PathBuf;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Appended to a file while its removal is in flight. Not a mod extension, so
/// scans ignore it.
const REMOVING_SUFFIX: &str = ".removing";

/// Result of [`ActivationManager::set_enabled`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub enabled: bool,
    /// False when the mod was already in the requested state
    pub changed: bool,
    pub record: ModRecord,
}

/// Serializes state changes per mod id while letting different mods proceed
/// concurrently.
pub struct ActivationManager {
    store: Arc<dyn ModStore>,
    disabled_suffix: String,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ActivationManager {
    pub fn new(store: Arc<dyn ModStore>, disabled_suffix: impl Into<String>) -> Self {
        Self {
            store,
            disabled_suffix: disabled_suffix.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled_suffix(&self) -> &str {
        &self.disabled_suffix
    }

    fn lock_for(&self, mod_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop locks nobody is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(mod_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Load a record and confirm its file is still where the store says it is.
    async fn existing_record(&self, mod_id: &str) -> ModResult<ModRecord> {
        let record = self
            .store
            .get(mod_id)?
            .ok_or_else(|| ModError::NotFound(format!("mod {}", mod_id)))?;

        let present = tokio::fs::try_exists(&record.absolute_path)
            .await
            .map_err(|e| ModError::fs("stat", &record.absolute_path, e))?;
        if !present {
            return Err(ModError::NotFound(format!(
                "mod file {}",
                record.absolute_path
            )));
        }
        Ok(record)
    }

    /// Flip the state of `mod_id`, returning the new `enabled` value.
    pub async fn toggle(&self, mod_id: &str) -> ModResult<bool> {
        Ok(self.flip(mod_id).await?.enabled)
    }

    /// Like [`toggle`](Self::toggle) but returns the full outcome. The current
    /// state is read under the per-mod lock, so concurrent flips never collapse
    /// into a no-op.
    pub async fn flip(&self, mod_id: &str) -> ModResult<ToggleOutcome> {
        let lock = self.lock_for(mod_id);
        let _guard = lock.lock().await;

        let record = self.existing_record(mod_id).await?;
        self.apply(record, None).await
    }

    /// Put `mod_id` into the requested state. Asking for the current state succeeds
    /// without touching the disk.
    pub async fn set_enabled(&self, mod_id: &str, enabled: bool) -> ModResult<ToggleOutcome> {
        let lock = self.lock_for(mod_id);
        let _guard = lock.lock().await;

        let record = self.existing_record(mod_id).await?;
        self.apply(record, Some(enabled)).await
    }

    async fn apply(&self, record: ModRecord, requested: Option<bool>) -> ModResult<ToggleOutcome> {
        let enabled = requested.unwrap_or(!record.enabled);
        if enabled == record.enabled {
            tracing::debug!(
                "Mod {} already {}",
                record.id,
                if enabled { "enabled" } else { "disabled" }
            );
            return Ok(ToggleOutcome {
                enabled,
                changed: false,
                record,
            });
        }

        let source = record.absolute_path.clone();
        let target = record.path_for_state(enabled, &self.disabled_suffix);

        let occupied = tokio::fs::try_exists(&target)
            .await
            .map_err(|e| ModError::fs("stat", &target, e))?;
        if occupied {
            return Err(ModError::fs(
                "rename onto existing",
                &target,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target already exists"),
            ));
        }

        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| ModError::fs("rename", &source, e))?;

        let mut updated = record;
        updated.enabled = enabled;
        updated.absolute_path = target.clone();
        if enabled {
            updated.last_enabled_at = Some(Utc::now());
        }

        if let Err(store_error) = self.store.upsert(updated.clone()) {
            tracing::error!(
                "Store update for mod {} failed after rename, reverting: {}",
                updated.id,
                store_error
            );
            if let Err(revert_error) = tokio::fs::rename(&target, &source).await {
                tracing::error!(
                    "Could not move {} back to {}: {}",
                    target,
                    source,
                    revert_error
                );
            }
            return Err(store_error);
        }

        tracing::info!(
            "{} mod {} ({})",
            if enabled { "Enabled" } else { "Disabled" },
            updated.display_name,
            updated.id
        );

        Ok(ToggleOutcome {
            enabled,
            changed: true,
            record: updated,
        })
    }

    /// Delete the mod's file and its record.
    ///
    /// The file is first moved aside, so a failing store delete can put it back
    /// and the record never outlives its file or the other way round.
    pub async fn remove(&self, mod_id: &str) -> ModResult<ModRecord> {
        let lock = self.lock_for(mod_id);
        let _guard = lock.lock().await;

        let record = self
            .store
            .get(mod_id)?
            .ok_or_else(|| ModError::NotFound(format!("mod {}", mod_id)))?;

        let source = &record.absolute_path;
        let staged = Utf8PathBuf::from(format!("{}{}", source, REMOVING_SUFFIX));
        let moved_aside = match tokio::fs::rename(source, &staged).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("File for mod {} was already gone: {}", record.id, source);
                false
            }
            Err(e) => return Err(ModError::fs("rename", source, e)),
        };

        if let Err(store_error) = self.store.delete(mod_id) {
            if moved_aside {
                tracing::error!(
                    "Store delete for mod {} failed, restoring {}: {}",
                    record.id,
                    source,
                    store_error
                );
                if let Err(revert_error) = tokio::fs::rename(&staged, source).await {
                    tracing::error!("Could not move {} back to {}: {}", staged, source, revert_error);
                }
            }
            return Err(store_error);
        }

        if moved_aside {
            if let Err(e) = tokio::fs::remove_file(&staged).await {
                tracing::warn!("Record of mod {} removed but {} is left behind: {}", record.id, staged, e);
            }
        }
        tracing::info!("Removed mod {} ({})", record.display_name, record.id);
        Ok(record)
    }
}
