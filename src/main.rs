//! ModLedger - command line front end for the mod synchronization engine.
//!
//! # Execution Flow
//!
//! 1. Parse arguments
//! 2. Load `ModLedger Config.yaml` from the config directory
//! 3. Initialize logging → `<config dir>/logs/modledger.<date>`
//! 4. Create a tokio runtime and a [`ModManager`] for the mods folder
//! 5. Run one command, print its result, log the metrics summary

mod cli;

use anyhow::{Context, Result, anyhow, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use cli::{Cli, Commands, ProfileCommands};
use modledger::logging::{FileFormat, setup_logging_with_console};
use modledger::models::{RepositoryStatus, SnapshotOutcome};
use modledger::{APP_NAME, ConfigManager, ModManager, ModRecord, VERSION};
use serde::Serialize;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut user_config = config_manager.load_user_config()?;

    let debug = cli.debug || user_config.manager_settings.debug_mode;
    let _log_guard = setup_logging_with_console(
        &config_manager.config_dir().join("logs"),
        APP_NAME,
        debug,
        debug,
        FileFormat::Text,
    )?;
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    if let Commands::SetModsPath { path } = &cli.command {
        let absolute = std::path::absolute(path)
            .ok()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .with_context(|| format!("Failed to resolve mods folder {}", path))?;
        let saved = config_manager.update_user_config(|config| {
            config.manager_settings.mods_path = absolute.to_string();
        })?;
        println!("Mods folder set to {}", saved.manager_settings.mods_path);
        return Ok(());
    }

    if let Some(path) = &cli.mods_path {
        user_config.manager_settings.mods_path = path.to_string();
    }
    if user_config.manager_settings.mods_root().is_none() {
        bail!(
            "No mods folder configured. Run `{} set-mods-path <PATH>` or pass --mods-path.",
            APP_NAME
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("modledger-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let manager = Arc::new(
        ModManager::from_config(&config_manager, &user_config)
            .context("Failed to open the mod library")?,
    );

    let result = runtime
        .block_on(run(&manager, cli.command, cli.json))
        .and_then(|()| match manager.state().read(|s| s.snapshot_error.clone()) {
            Some(error) => Err(anyhow!(
                "The change was applied, but recording its snapshot failed: {}",
                error
            )),
            None => Ok(()),
        });

    manager.metrics().log_summary();
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// First eight characters of a record id, for listings
fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn print_mod(record: &ModRecord) {
    println!(
        "{} {:<8} {:<10} {}",
        short_id(&record.id),
        if record.enabled { "enabled" } else { "disabled" },
        record.category,
        record.display_name
    );
}

async fn set_enabled(manager: &ModManager, id: &str, enabled: bool) -> Result<()> {
    let outcome = manager.set_enabled(id, enabled).await?;
    if outcome.changed {
        print_mod(&outcome.record);
    } else {
        let word = if outcome.enabled { "enabled" } else { "disabled" };
        println!("{} was already {}", id, word);
    }
    Ok(())
}

async fn run_profile(manager: &ModManager, action: ProfileCommands, json: bool) -> Result<()> {
    match action {
        ProfileCommands::List => {
            let profiles = manager.profiles();
            if json {
                print_json(&profiles)?;
            } else {
                for profile in &profiles {
                    let marker = if profile.is_active { "*" } else { " " };
                    println!(
                        "{} {} ({} mods, branch {})",
                        marker,
                        profile.name,
                        profile.mod_ids.len(),
                        profile.git_branch
                    );
                }
            }
        }
        ProfileCommands::Create { name, description } => {
            let profile = manager.create_profile(&name, description).await?;
            println!(
                "Saved profile {} with {} enabled mods",
                profile.name,
                profile.mod_ids.len()
            );
        }
        ProfileCommands::Activate { profile } => {
            let activation = manager.activate_profile(&profile).await?;
            println!("{}", activation.summary());
        }
        ProfileCommands::Delete { profile } => {
            let removed = manager.delete_profile(&profile)?;
            println!("Deleted profile {}", removed.name);
        }
    }
    Ok(())
}

async fn run(manager: &Arc<ModManager>, command: Commands, json: bool) -> Result<()> {
    match command {
        // Handled in main before the manager exists
        Commands::SetModsPath { .. } => {}
        Commands::Scan => {
            let report = manager.scan().await?;
            if json {
                print_json(&report.records)?;
            } else {
                println!("{}", report.summary());
                println!("{}", manager.state().read(|s| s.library_summary()));
            }
        }
        Commands::List { enabled, disabled } => {
            let mods: Vec<ModRecord> = manager
                .list()?
                .into_iter()
                .filter(|m| (!enabled || m.enabled) && (!disabled || !m.enabled))
                .collect();
            if json {
                print_json(&mods)?;
            } else {
                mods.iter().for_each(print_mod);
                println!("{} mods", mods.len());
            }
        }
        Commands::Toggle { id } => {
            let enabled = manager.toggle(&id).await?;
            println!("{} is now {}", id, if enabled { "enabled" } else { "disabled" });
        }
        Commands::Enable { id } => set_enabled(manager, &id, true).await?,
        Commands::Disable { id } => set_enabled(manager, &id, false).await?,
        Commands::Delete { id } => {
            let removed = manager.delete(&id).await?;
            println!("Removed {}", removed.display_name);
        }
        Commands::Import { path } => {
            let record = manager.import(&path).await?;
            print_mod(&record);
        }
        Commands::Conflicts => {
            let report = manager.conflicts()?;
            if json {
                print_json(&report)?;
            } else if !report.has_conflicts {
                println!("No conflicts");
            } else {
                for finding in &report.conflicts {
                    println!("[{:?}] {}", finding.severity, finding.description);
                }
                for suggestion in &report.suggestions {
                    println!("  - {}", suggestion);
                }
            }
        }
        Commands::Init => match manager.ensure_repository().await? {
            RepositoryStatus::Initialized => println!("Repository created in {}", manager.mods_root()),
            RepositoryStatus::AlreadyInitialized => println!("Repository already exists"),
        },
        Commands::Snapshot { message } => match manager.snapshot(&message).await? {
            SnapshotOutcome::Created(id) => println!("Created snapshot {}", id),
            SnapshotOutcome::NoChanges => println!("Nothing to snapshot"),
        },
        Commands::History { limit } => {
            let history = manager.history(limit).await?;
            if json {
                print_json(&history)?;
            } else {
                for snapshot in &history {
                    println!(
                        "{} {} {}",
                        snapshot.short_id(),
                        snapshot.authored_at.format("%Y-%m-%d %H:%M"),
                        snapshot.message.lines().next().unwrap_or_default()
                    );
                }
            }
        }
        Commands::Rollback { id } => {
            let report = manager.rollback(&id).await?;
            println!("Rolled back to {} (backup branch {})", id, report.backup_branch);
            println!("{}", report.scan.summary());
        }
        Commands::Branches => {
            let current = manager.current_branch().await?;
            for branch in manager.branches().await? {
                let marker = if branch == current { "*" } else { " " };
                println!("{} {}", marker, branch);
            }
        }
        Commands::CreateBranch { name } => {
            manager.create_branch(&name).await?;
            println!("Created and switched to branch {}", name);
        }
        Commands::SwitchBranch { name } => {
            let scan = manager.switch_branch(&name).await?;
            println!("Switched to branch {}", name);
            println!("{}", scan.summary());
        }
        Commands::Profile(action) => run_profile(manager, action, json).await?,
        Commands::Watch => {
            manager.scan().await?;
            let watcher = manager.watch()?;
            println!("Watching {} (Ctrl+C to stop)", manager.mods_root());
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            let rescans = watcher.stop().await;
            println!("Stopped after {} re-scans", rescans);
        }
    }
    Ok(())
}
