//! Error taxonomy shared by the scanner, store, activation manager and git orchestrator.
//!
//! Benign outcomes (a toggle that is already in the requested state, a snapshot with
//! nothing staged) are not errors; they are reported through
//! [`ToggleOutcome`](crate::services::activation::ToggleOutcome) and
//! [`SnapshotOutcome`](crate::models::SnapshotOutcome).

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors surfaced by the mod synchronization engine
#[derive(Error, Debug)]
pub enum ModError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Failed to {operation} {path}: {source}")]
    FilesystemOperationFailed {
        operation: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not a mod repository yet")]
    RepositoryNotInitialized(Utf8PathBuf),

    #[error("Snapshot {0} does not exist")]
    SnapshotNotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("'{name}' is not a valid {kind} name")]
    InvalidName { kind: &'static str, name: String },

    #[error("`git {command}` failed with exit code {code:?}: {stderr}")]
    SubordinateProcessFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Record {id} is inconsistent: path {path} disagrees with enabled={enabled}")]
    InconsistentRecord {
        id: String,
        path: Utf8PathBuf,
        enabled: bool,
    },

    #[error("Stored record {id} has an invalid {field}: {reason}")]
    MalformedRecord {
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("Record store error at {path}: {message}")]
    Store { path: Utf8PathBuf, message: String },

    #[error("Command queue for {0} has shut down")]
    QueueClosed(Utf8PathBuf),
}

impl ModError {
    /// Build a [`ModError::FilesystemOperationFailed`] for `path`.
    pub fn fs(operation: &'static str, path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        ModError::FilesystemOperationFailed {
            operation,
            path: path.into(),
            source,
        }
    }

    /// True for errors that leave the prior state untouched and only report absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModError::NotFound(_) | ModError::SnapshotNotFound(_))
    }
}

pub type ModResult<T> = std::result::Result<T, ModError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_error_message_carries_context() {
        let err = ModError::fs(
            "rename",
            "/mods/Foo.package",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("rename"));
        assert!(message.contains("/mods/Foo.package"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_not_found_classification() {
        assert!(ModError::NotFound("mod abc".into()).is_not_found());
        assert!(ModError::SnapshotNotFound("deadbeef".into()).is_not_found());
        assert!(!ModError::QueueClosed("/mods".into()).is_not_found());
    }
}
