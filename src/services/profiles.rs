//! Profile store: named enabled sets kept in `profiles.json` beside the record store.
//!
//! At most one profile is active. Names are unique ignoring case.

use crate::error::{ModError, ModResult};
use crate::models::Profile;
use crate::services::store::replace_file;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::{PoisonError, RwLock};

const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ProfileDocument {
    version: u32,
    profiles: Vec<Profile>,
}

#[derive(Debug)]
pub struct JsonProfileStore {
    path: Option<Utf8PathBuf>,
    profiles: RwLock<Vec<Profile>>,
}

impl JsonProfileStore {
    /// Open (or create on first write) the profile list at `path`.
    pub fn open(path: impl Into<Utf8PathBuf>) -> ModResult<Self> {
        let path = path.into();
        let profiles = if path.exists() {
            Self::load(&path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path),
            profiles: RwLock::new(profiles),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            profiles: RwLock::new(Vec::new()),
        }
    }

    fn load(path: &Utf8Path) -> ModResult<Vec<Profile>> {
        let store_error = |message: String| ModError::Store {
            path: path.to_path_buf(),
            message,
        };
        let contents =
            fs::read_to_string(path).map_err(|e| store_error(format!("read failed: {}", e)))?;
        let document: ProfileDocument = serde_json::from_str(&contents)
            .map_err(|e| store_error(format!("parse failed: {}", e)))?;
        if document.version != SCHEMA_VERSION {
            return Err(store_error(format!(
                "unsupported schema version {}",
                document.version
            )));
        }

        let mut profiles = document.profiles;
        let mut seen_active = false;
        for profile in &mut profiles {
            if profile.is_active && seen_active {
                tracing::warn!("Profile {} was also marked active, clearing it", profile.name);
                profile.is_active = false;
            }
            seen_active |= profile.is_active;
        }
        tracing::info!("Loaded {} profiles from {}", profiles.len(), path);
        Ok(profiles)
    }

    fn persist(&self, profiles: &[Profile]) -> ModResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let document = ProfileDocument {
            version: SCHEMA_VERSION,
            profiles: profiles.to_vec(),
        };
        let json = serde_json::to_string_pretty(&document).map_err(|e| ModError::Store {
            path: path.clone(),
            message: format!("serialize failed: {}", e),
        })?;
        replace_file(path, &json)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Profile>) -> ModResult<R>) -> ModResult<R> {
        let mut guard = self.profiles.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let result = f(&mut next)?;
        if next != *guard {
            self.persist(&next)?;
            *guard = next;
        }
        Ok(result)
    }

    /// All profiles ordered by name
    pub fn list(&self) -> Vec<Profile> {
        let mut profiles = self
            .profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        profiles.sort_by_key(|p| p.name.to_lowercase());
        profiles
    }

    /// Profile whose id or name is `key`
    pub fn find(&self, key: &str) -> Option<Profile> {
        let profiles = self.profiles.read().unwrap_or_else(PoisonError::into_inner);
        profiles
            .iter()
            .find(|p| p.id == key)
            .or_else(|| profiles.iter().find(|p| p.matches(key)))
            .cloned()
    }

    pub fn active(&self) -> Option<Profile> {
        self.profiles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.is_active)
            .cloned()
    }

    /// Insert or replace a profile by id.
    pub fn save(&self, profile: Profile) -> ModResult<()> {
        if profile.name.trim().is_empty() {
            return Err(ModError::InvalidName {
                kind: "profile",
                name: profile.name,
            });
        }
        self.mutate(|profiles| {
            let taken = profiles
                .iter()
                .any(|p| p.id != profile.id && p.name.eq_ignore_ascii_case(profile.name.trim()));
            if taken {
                return Err(ModError::AlreadyExists(format!("profile {}", profile.name)));
            }
            match profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => profiles.push(profile),
            }
            Ok(())
        })
    }

    /// Make `id` the only active profile and stamp its last use.
    pub fn set_active(&self, id: &str) -> ModResult<Profile> {
        self.mutate(|profiles| {
            if !profiles.iter().any(|p| p.id == id) {
                return Err(ModError::NotFound(format!("profile {}", id)));
            }
            let mut activated = None;
            for profile in profiles.iter_mut() {
                profile.is_active = profile.id == id;
                if profile.is_active {
                    profile.last_used_at = Some(Utc::now());
                    activated = Some(profile.clone());
                }
            }
            activated.ok_or_else(|| ModError::NotFound(format!("profile {}", id)))
        })
    }

    pub fn delete(&self, id: &str) -> ModResult<Option<Profile>> {
        self.mutate(|profiles| {
            let index = profiles.iter().position(|p| p.id == id);
            Ok(index.map(|i| profiles.remove(i)))
        })
    }
}
