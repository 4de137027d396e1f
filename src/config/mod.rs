use crate::models::UserConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the user configuration inside the config directory
pub const USER_CONFIG_FILE: &str = "ModLedger Config.yaml";

/// Loads and saves the YAML user configuration.
///
/// The configuration directory also holds the record store (`mods.json`) unless
/// the user points `Store Path` elsewhere.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager for `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join(USER_CONFIG_FILE),
            config_dir,
        })
    }

    /// Load the user configuration, or defaults if the file doesn't exist.
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
            return Ok(UserConfig::default());
        }

        let file_contents = fs::read_to_string(&self.user_config_path)
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        tracing::info!("Loaded user config from {}", self.user_config_path);
        Ok(config)
    }

    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Load, apply `edit`, and save in one step.
    pub fn update_user_config<F>(&self, edit: F) -> Result<UserConfig>
    where
        F: FnOnce(&mut UserConfig),
    {
        let mut config = self.load_user_config()?;
        edit(&mut config);
        self.save_user_config(&config)?;
        Ok(config)
    }

    /// Where the record store lives for `config`
    pub fn store_path(&self, config: &UserConfig) -> Utf8PathBuf {
        config.manager_settings.store_file(&self.config_dir)
    }

    pub fn profiles_path(&self, config: &UserConfig) -> Utf8PathBuf {
        config.manager_settings.profiles_file(&self.config_dir)
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn user_config_path(&self) -> &Utf8Path {
        &self.user_config_path
    }
}
