//! Typed error definitions for preserve_paths.
//! Provides a small set of well-known failure modes for better logs and tests.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::fs_adapter::hint;

/// Which part of a rollback failed for a single preserved path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    /// Removing content the package placed at the preserved location.
    ClearInstalled,
    /// Creating the parent directory of the preserved location.
    CreateParent,
    /// Moving the backup back into place.
    MoveBack,
}

impl std::fmt::Display for RestoreStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RestoreStep::ClearInstalled => "remove installed content",
            RestoreStep::CreateParent => "create parent directory",
            RestoreStep::MoveBack => "move backup into place",
        })
    }
}

#[derive(Debug, Error)]
pub enum PreserveError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Cannot make '{}' writable: {source}{}", .path.display(), hint(.source))]
    PermissionDenied { path: PathBuf, source: io::Error },

    #[error("Cannot create backup area '{}': {source}{}", .path.display(), hint(.source))]
    BackupArea { path: PathBuf, source: io::Error },

    #[error("Cannot move '{}' to '{}': {source}{}", .from.display(), .to.display(), hint(.source))]
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("Cannot restore '{}' ({step}): {source}{}", .path.display(), hint(.source))]
    RestoreFailed {
        path: PathBuf,
        step: RestoreStep,
        source: io::Error,
    },

    #[error("Operation '{0}' already has preserved paths awaiting rollback")]
    SessionActive(String),
}

impl PreserveError {
    /// Stable numeric code for structured logs.
    pub fn code(&self) -> u16 {
        match self {
            PreserveError::Configuration(_) => 10,
            PreserveError::PermissionDenied { .. } => 20,
            PreserveError::BackupArea { .. } => 30,
            PreserveError::MoveFailed { .. } => 31,
            PreserveError::RestoreFailed { .. } => 40,
            PreserveError::SessionActive(_) => 50,
        }
    }

    /// Short machine-friendly kind label.
    pub fn kind(&self) -> &'static str {
        match self {
            PreserveError::Configuration(_) => "configuration",
            PreserveError::PermissionDenied { .. } => "permission_denied",
            PreserveError::BackupArea { .. } => "backup_area",
            PreserveError::MoveFailed { .. } => "move_failed",
            PreserveError::RestoreFailed { .. } => "restore_failed",
            PreserveError::SessionActive(_) => "session_active",
        }
    }
}
