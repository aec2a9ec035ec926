//! Per-entry failures. None of these abort a batch.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};

/// Why a single entry could not be processed.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EntryError {
    /// The file exists but could not be read or is not UTF-8.
    #[error("Reading {path}")]
    Unreadable {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// No backup could be made; the entry was left untouched.
    #[error("Backing up {path}")]
    BackupFailed {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The backup exists but the entry could not be replaced.
    #[error("Writing {path} (restore it with: {restore})")]
    WriteFailed {
        path: Utf8PathBuf,
        backup: Utf8PathBuf,
        restore: String,
        #[source]
        source: io::Error,
    },
}

impl EntryError {
    /// Short machine-readable name, used in JSON reports.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            EntryError::Unreadable { .. } => "entry-unreadable",
            EntryError::BackupFailed { .. } => "backup-failed",
            EntryError::WriteFailed { .. } => "write-failed",
        }
    }

    /// Where the pre-patch content was saved, when it was.
    pub(crate) fn backup(&self) -> Option<&Utf8Path> {
        match self {
            EntryError::WriteFailed { backup, .. } => Some(backup),
            _ => None,
        }
    }

    /// The message with its cause, in the same shape as `{:#}` on an
    /// `anyhow::Error`.
    pub(crate) fn detail(&self) -> String {
        let source = match self {
            EntryError::Unreadable { source, .. }
            | EntryError::BackupFailed { source, .. }
            | EntryError::WriteFailed { source, .. } => source,
        };
        format!("{self}: {source}")
    }
}
