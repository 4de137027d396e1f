//! Version control orchestration over the `git` executable.
//!
//! Every repository root gets its own [`RepositoryHandle`]: a dedicated worker
//! thread draining a FIFO job queue. Jobs run `git` synchronously, one at a time,
//! so two operations on the same root can never interleave. Callers await a
//! `oneshot` handle instead of blocking the runtime. A job whose caller has gone
//! away before it starts is skipped; once started, it runs to completion.

use crate::error::{ModError, ModResult};
use crate::models::{
    ModChange, ModChangeAction, RepositoryConfig, RepositoryState, RepositoryStatus, Snapshot,
    SnapshotOutcome,
};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::process::{Command, Output};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// Branch the repository is created on and rolled back onto
pub const PRIMARY_BRANCH: &str = "main";

const FALLBACK_BRANCH: &str = "unknown";

const INITIAL_SNAPSHOT_MESSAGE: &str = "Initial mod repository snapshot";

/// Files The Sims 4 writes into its user folder that must never be versioned
pub const IGNORE_PATTERNS: &[&str] = &[
    "# Game caches",
    "cachestr/",
    "onlinethumbnailcache/",
    "localsimtexturecache.package",
    "localthumbcache.package",
    "avatarcache.package",
    "",
    "# Logs and exception reports",
    "*.log",
    "Config.log",
    "ReticulatedSplinesView",
    "lastException*.txt",
    "mc_lastexception.html",
    "BE-ExceptionReport*.html",
    "",
    "# Account databases",
    "clientDB.package",
    "accountDataDB.package",
    "",
    "# Saves and personal data",
    "saves/",
    "*.save",
    "*.backup",
    "Screenshots/",
    "Tray/",
    "Options.ini",
    "UserSetting.ini",
    "",
    "# Operating system files",
    "Thumbs.db",
    ".DS_Store",
    "",
    "# Tool state",
    ".mod-manager/",
    "*.tmp",
];

static MOD_CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(enabled|disabled|added|removed|installed|deleted|updated)\s+mod:?\s+(.+?)\s*$")
        .expect("Invalid mod change regex")
});

/// Read mod changes out of a commit message, one per matching line.
pub fn parse_mod_changes(message: &str) -> Vec<ModChange> {
    message
        .lines()
        .filter_map(|line| MOD_CHANGE.captures(line))
        .filter_map(|caps| {
            let action = match caps[1].to_ascii_lowercase().as_str() {
                "enabled" => ModChangeAction::Enabled,
                "disabled" => ModChangeAction::Disabled,
                "added" | "installed" => ModChangeAction::Added,
                "removed" | "deleted" => ModChangeAction::Removed,
                "updated" => ModChangeAction::Updated,
                _ => return None,
            };
            Some(ModChange {
                mod_name: caps[2].to_string(),
                action,
            })
        })
        .collect()
}

fn ignore_file_contents() -> String {
    let mut contents = IGNORE_PATTERNS.join("\n");
    contents.push('\n');
    contents
}

/// Synchronous `git` runner bound to one working directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: Utf8PathBuf,
}

impl GitCli {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// True once `root/.git` exists
    pub fn is_repository(&self) -> bool {
        self.root.join(".git").exists()
    }

    fn require_repository(&self) -> ModResult<()> {
        if self.is_repository() {
            Ok(())
        } else {
            Err(ModError::RepositoryNotInitialized(self.root.clone()))
        }
    }

    fn output(&self, args: &[&str]) -> ModResult<Output> {
        tracing::debug!("git {} (in {})", args.join(" "), self.root);
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| ModError::SubordinateProcessFailed {
                command: args.join(" "),
                code: None,
                stderr: e.to_string(),
            })
    }

    /// Run `git <args>` and return its stdout, failing on a non-zero exit.
    pub fn run(&self, args: &[&str]) -> ModResult<String> {
        let output = self.output(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(ModError::SubordinateProcessFailed {
                command: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run `git <args>` for its exit status only
    pub fn succeeds(&self, args: &[&str]) -> ModResult<bool> {
        Ok(self.output(args)?.status.success())
    }

    fn commit(&self, message: &str, allow_empty: bool) -> ModResult<String> {
        let mut args = vec!["-c", "commit.gpgsign=false", "commit", "-q", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.run(&args)?;
        self.head()
    }

    fn head(&self) -> ModResult<String> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// Full id of `rev` if it names a commit
    pub fn resolve(&self, rev: &str) -> ModResult<Option<String>> {
        if rev.is_empty() || rev.starts_with('-') {
            return Ok(None);
        }
        let spec = format!("{}^{{commit}}", rev);
        match self.run(&["rev-parse", "--verify", "--quiet", &spec]) {
            Ok(id) => Ok(Some(id.trim().to_string())),
            Err(ModError::SubordinateProcessFailed { code: Some(_), .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn branch_exists(&self, name: &str) -> ModResult<bool> {
        self.succeeds(&[
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/heads/{}", name),
        ])
    }

    fn is_dirty(&self) -> ModResult<bool> {
        Ok(!self.run(&["status", "--porcelain"])?.trim().is_empty())
    }

    fn ensure_identity(&self, config: &RepositoryConfig) -> ModResult<()> {
        for (key, value) in [
            ("user.name", config.author_name.as_str()),
            ("user.email", config.author_email.as_str()),
        ] {
            if !self.succeeds(&["config", "--get", key])? {
                self.run(&["config", key, value])?;
            }
        }
        Ok(())
    }

    /// Create the repository if `root/.git` does not exist yet. An existing
    /// repository still gets a commit identity when git has none.
    pub fn init_repository(&self, config: &RepositoryConfig) -> ModResult<RepositoryStatus> {
        if self.is_repository() {
            self.ensure_identity(config)?;
            return Ok(RepositoryStatus::AlreadyInitialized);
        }
        if !self.root.is_dir() {
            return Err(ModError::NotFound(format!("mods folder {}", self.root)));
        }

        tracing::info!("Initializing mod repository in {}", self.root);
        self.run(&["init", "-q"])?;
        self.run(&[
            "symbolic-ref",
            "HEAD",
            &format!("refs/heads/{}", PRIMARY_BRANCH),
        ])?;
        self.ensure_identity(config)?;

        let ignore_path = self.root.join(".gitignore");
        if ignore_path.exists() {
            tracing::debug!("Keeping existing {}", ignore_path);
        } else {
            fs::write(&ignore_path, ignore_file_contents())
                .map_err(|e| ModError::fs("write", &ignore_path, e))?;
        }

        self.run(&["add", "-A"])?;
        let id = self.commit(INITIAL_SNAPSHOT_MESSAGE, true)?;
        tracing::info!("Created initial snapshot {}", id);
        Ok(RepositoryStatus::Initialized)
    }

    /// Stage everything and commit it, unless nothing changed.
    pub fn snapshot(&self, message: &str) -> ModResult<SnapshotOutcome> {
        self.require_repository()?;
        self.run(&["add", "-A"])?;

        if self.succeeds(&["diff", "--cached", "--quiet"])? {
            tracing::debug!("Nothing to snapshot in {}", self.root);
            return Ok(SnapshotOutcome::NoChanges);
        }

        let id = self.commit(message, false)?;
        tracing::info!("Snapshot {} created: {}", id, message);
        Ok(SnapshotOutcome::Created(id))
    }

    /// Paths touched by one commit. Best effort: failures yield an empty list.
    pub fn changed_paths(&self, id: &str) -> Vec<String> {
        match self.run(&[
            "-c",
            "core.quotepath=false",
            "show",
            "--name-only",
            "--pretty=format:",
            id,
        ]) {
            Ok(out) => out
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::warn!("Could not list files changed by {}: {}", id, e);
                Vec::new()
            }
        }
    }

    /// Newest-first snapshots. A failing `git log` (for example on an empty
    /// repository) degrades to an empty list.
    pub fn history(&self, limit: usize) -> ModResult<Vec<Snapshot>> {
        self.require_repository()?;
        let count = limit.to_string();
        let log = match self.run(&[
            "log",
            "-n",
            &count,
            "--format=%H%x1f%an <%ae>%x1f%aI%x1f%B%x1e",
        ]) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!("Could not read history of {}: {}", self.root, e);
                return Ok(Vec::new());
            }
        };

        let mut snapshots = Vec::new();
        for entry in log.split('\x1e') {
            let entry = entry.trim_start_matches(['\n', '\r']);
            if entry.is_empty() {
                continue;
            }
            let fields: Vec<&str> = entry.splitn(4, '\x1f').collect();
            let [id, author, date, message] = fields[..] else {
                tracing::warn!("Skipping unparseable log entry in {}", self.root);
                continue;
            };
            let authored_at = match DateTime::parse_from_rfc3339(date) {
                Ok(time) => time.with_timezone(&Utc),
                Err(e) => {
                    tracing::warn!("Skipping snapshot {} with bad date '{}': {}", id, date, e);
                    continue;
                }
            };
            let message = message.trim().to_string();
            snapshots.push(Snapshot {
                id: id.to_string(),
                author: author.to_string(),
                authored_at,
                changed_paths: self.changed_paths(id),
                mod_changes: parse_mod_changes(&message),
                message,
            });
        }
        Ok(snapshots)
    }

    /// Name of the checked-out branch, or `"unknown"` if git cannot say
    pub fn current_branch(&self) -> String {
        match self.run(&["rev-parse", "--abbrev-ref", "HEAD"]) {
            Ok(out) => out.trim().to_string(),
            Err(e) => {
                tracing::warn!("Could not read current branch of {}: {}", self.root, e);
                FALLBACK_BRANCH.to_string()
            }
        }
    }

    /// Local branch names, empty if git cannot list them
    pub fn branches(&self) -> Vec<String> {
        match self.run(&["branch", "--format=%(refname:short)"]) {
            Ok(out) => out
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) => {
                tracing::warn!("Could not list branches of {}: {}", self.root, e);
                Vec::new()
            }
        }
    }

    fn check_branch_name(&self, name: &str) -> ModResult<()> {
        if name.is_empty()
            || name.starts_with('-')
            || !self.succeeds(&["check-ref-format", "--branch", name])?
        {
            return Err(ModError::InvalidName {
                kind: "branch",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Create `name` at the current tip and check it out.
    pub fn create_branch(&self, name: &str) -> ModResult<()> {
        self.require_repository()?;
        self.check_branch_name(name)?;
        if self.branch_exists(name)? {
            return Err(ModError::AlreadyExists(format!("branch {}", name)));
        }
        self.run(&["checkout", "-q", "-b", name])?;
        tracing::info!("Created and switched to branch {} in {}", name, self.root);
        Ok(())
    }

    /// Check out an existing local branch.
    pub fn switch_branch(&self, name: &str) -> ModResult<()> {
        self.require_repository()?;
        self.check_branch_name(name)?;
        if !self.branch_exists(name)? {
            return Err(ModError::NotFound(format!("branch {}", name)));
        }
        self.run(&["checkout", "-q", name])?;
        tracing::info!("Switched {} to branch {}", self.root, name);
        Ok(())
    }

    fn primary_branch(&self) -> ModResult<String> {
        for candidate in [PRIMARY_BRANCH, "master"] {
            if self.branch_exists(candidate)? {
                return Ok(candidate.to_string());
            }
        }
        Ok(self.current_branch())
    }

    fn unique_backup_name(&self) -> ModResult<String> {
        let base = Utc::now().format("backup-%Y%m%d-%H%M%S").to_string();
        if !self.branch_exists(&base)? {
            return Ok(base);
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{}-{}", base, counter);
            if !self.branch_exists(&candidate)? {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Restore the working tree to `snapshot_id`, keeping the current tip reachable
    /// from a fresh backup branch. Returns the backup branch name.
    pub fn rollback(&self, snapshot_id: &str, snapshot_dirty_work: bool) -> ModResult<String> {
        self.require_repository()?;
        let target = self
            .resolve(snapshot_id)?
            .ok_or_else(|| ModError::SnapshotNotFound(snapshot_id.to_string()))?;

        if snapshot_dirty_work && self.is_dirty()? {
            let short = &target[..target.len().min(7)];
            self.snapshot(&format!("Saved work before rollback to {}", short))?;
        }

        let tip = self.head()?;
        let backup = self.unique_backup_name()?;
        self.run(&["branch", "--", &backup, &tip])?;
        tracing::info!("Created backup branch {} at {}", backup, tip);

        let primary = self.primary_branch()?;
        if primary != FALLBACK_BRANCH {
            self.run(&["checkout", "-q", "-f", &primary])?;
        }
        self.run(&["reset", "-q", "--hard", &target])?;
        self.run(&["clean", "-fdq"])?;

        tracing::info!("Rolled back {} to {}", self.root, target);
        Ok(backup)
    }
}

type Job = Box<dyn FnOnce(&GitCli) + Send>;

/// One working directory bound to one serialized job queue.
pub struct RepositoryHandle {
    root: Utf8PathBuf,
    jobs: mpsc::UnboundedSender<Job>,
    state: Arc<Mutex<RepositoryState>>,
}

impl RepositoryHandle {
    fn spawn(root: Utf8PathBuf) -> ModResult<Self> {
        let git = GitCli::new(root.clone());
        let initial = if git.is_repository() {
            RepositoryState::Initialized
        } else {
            RepositoryState::Uninitialized
        };
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();

        std::thread::Builder::new()
            .name(format!("git-worker:{}", root))
            .spawn(move || {
                while let Some(job) = queue.blocking_recv() {
                    job(&git);
                }
                tracing::debug!("Git worker for {} stopped", git.root());
            })
            .map_err(|e| ModError::fs("spawn git worker for", &root, e))?;

        Ok(Self {
            root,
            jobs,
            state: Arc::new(Mutex::new(initial)),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn state(&self) -> RepositoryState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `op` behind every job already submitted for this root and await its
    /// result.
    async fn submit<T, F>(&self, op: F) -> ModResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&GitCli, &Mutex<RepositoryState>) -> ModResult<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let state = self.state.clone();
        let job: Job = Box::new(move |git| {
            if tx.is_closed() {
                tracing::warn!("Skipping abandoned git job for {}", git.root());
                return;
            }
            let _ = tx.send(op(git, &state));
        });

        self.jobs
            .send(job)
            .map_err(|_| ModError::QueueClosed(self.root.clone()))?;
        rx.await
            .map_err(|_| ModError::QueueClosed(self.root.clone()))?
    }
}

fn set_state(state: &Mutex<RepositoryState>, next: RepositoryState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

/// Run `op` with the root in the transient `during` state, then return it to
/// `Initialized`.
fn transition<T>(
    state: &Mutex<RepositoryState>,
    during: RepositoryState,
    op: impl FnOnce() -> ModResult<T>,
) -> ModResult<T> {
    set_state(state, during);
    let result = op();
    set_state(state, RepositoryState::Initialized);
    result
}

/// Owns one [`RepositoryHandle`] per repository root.
pub struct VcsOrchestrator {
    config: RepositoryConfig,
    handles: Mutex<HashMap<Utf8PathBuf, Arc<RepositoryHandle>>>,
}

impl VcsOrchestrator {
    pub fn new(config: RepositoryConfig) -> Self {
        Self {
            config,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn handle(&self, root: &Utf8Path) -> ModResult<Arc<RepositoryHandle>> {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handles.get(root) {
            return Ok(handle.clone());
        }
        let handle = Arc::new(RepositoryHandle::spawn(root.to_path_buf())?);
        handles.insert(root.to_path_buf(), handle.clone());
        Ok(handle)
    }

    /// Current lifecycle state of `root`
    pub fn repository_state(&self, root: &Utf8Path) -> RepositoryState {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        match handles.get(root) {
            Some(handle) => handle.state(),
            None if GitCli::new(root).is_repository() => RepositoryState::Initialized,
            None => RepositoryState::Uninitialized,
        }
    }

    pub async fn ensure_repository(&self, root: &Utf8Path) -> ModResult<RepositoryStatus> {
        let config = self.config.clone();
        self.handle(root)?
            .submit(move |git, state| {
                if git.is_repository() {
                    git.ensure_identity(&config)?;
                    set_state(state, RepositoryState::Initialized);
                    return Ok(RepositoryStatus::AlreadyInitialized);
                }
                match git.init_repository(&config) {
                    Ok(status) => {
                        set_state(state, RepositoryState::Initialized);
                        Ok(status)
                    }
                    Err(e) => {
                        tracing::error!("Repository initialization in {} failed: {}", git.root(), e);
                        let git_dir = git.root().join(".git");
                        if let Err(cleanup) = fs::remove_dir_all(&git_dir) {
                            if cleanup.kind() != std::io::ErrorKind::NotFound {
                                tracing::warn!("Could not remove partial {}: {}", git_dir, cleanup);
                            }
                        }
                        set_state(state, RepositoryState::Uninitialized);
                        Err(e)
                    }
                }
            })
            .await
    }

    pub async fn snapshot(&self, root: &Utf8Path, message: &str) -> ModResult<SnapshotOutcome> {
        let message = message.to_string();
        self.handle(root)?
            .submit(move |git, state| {
                git.require_repository()?;
                transition(state, RepositoryState::Snapshotting, || git.snapshot(&message))
            })
            .await
    }

    pub async fn history(&self, root: &Utf8Path, limit: usize) -> ModResult<Vec<Snapshot>> {
        self.handle(root)?
            .submit(move |git, _| git.history(limit))
            .await
    }

    /// Roll `root` back to `snapshot_id`, returning the backup branch name.
    pub async fn rollback(&self, root: &Utf8Path, snapshot_id: &str) -> ModResult<String> {
        let snapshot_id = snapshot_id.to_string();
        let snapshot_first = self.config.snapshot_before_rollback;
        self.handle(root)?
            .submit(move |git, state| {
                git.require_repository()?;
                transition(state, RepositoryState::RollingBack, || {
                    git.rollback(&snapshot_id, snapshot_first)
                })
            })
            .await
    }

    pub async fn current_branch(&self, root: &Utf8Path) -> ModResult<String> {
        self.handle(root)?
            .submit(|git, _| {
                git.require_repository()?;
                Ok(git.current_branch())
            })
            .await
    }

    pub async fn create_branch(&self, root: &Utf8Path, name: &str) -> ModResult<()> {
        let name = name.to_string();
        self.handle(root)?
            .submit(move |git, _| git.create_branch(&name))
            .await
    }

    /// Check out `name`; the working tree changes, so callers re-scan.
    pub async fn switch_branch(&self, root: &Utf8Path, name: &str) -> ModResult<()> {
        let name = name.to_string();
        self.handle(root)?
            .submit(move |git, _| git.switch_branch(&name))
            .await
    }

    pub async fn branches(&self, root: &Utf8Path) -> ModResult<Vec<String>> {
        self.handle(root)?
            .submit(|git, _| {
                git.require_repository()?;
                Ok(git.branches())
            })
            .await
    }
}
