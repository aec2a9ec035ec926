//! Per-entry outcomes, and printing them for humans or as JSON.

use std::io::Write;

use anyhow::Result;
use camino::Utf8PathBuf;
use canon_json::CanonJsonSerialize as _;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::error::EntryError;

/// What happened to one entry.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub(crate) enum EntryOutcome {
    /// Not a linux entry.
    Skipped,
    /// Already in order.
    Unchanged,
    /// Rewritten; the old content is at `backup`.
    Patched { backup: Utf8PathBuf },
    /// Dry run: this is the content it would have been rewritten to.
    WouldPatch { content: String },
    /// See [`EntryError`].
    Failed {
        kind: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        backup: Option<Utf8PathBuf>,
    },
}

impl From<&EntryError> for EntryOutcome {
    fn from(e: &EntryError) -> Self {
        Self::Failed {
            kind: e.kind().to_owned(),
            message: e.detail(),
            backup: e.backup().map(ToOwned::to_owned),
        }
    }
}

/// One line of the report.
#[derive(Debug, Serialize)]
pub(crate) struct EntryReport {
    pub(crate) path: Utf8PathBuf,
    #[serde(flatten)]
    pub(crate) outcome: EntryOutcome,
}

/// The result of a `patch` run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Report {
    pub(crate) entries_dir: Utf8PathBuf,
    pub(crate) dry_run: bool,
    pub(crate) entries: Vec<EntryReport>,
}

impl Report {
    pub(crate) fn failures(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Failed { .. }))
            .count()
    }

    pub(crate) fn write_json(&self, mut out: impl Write) -> Result<()> {
        self.to_canon_json_writer(&mut out)
            .map_err(anyhow::Error::new)?;
        writeln!(out)?;
        Ok(())
    }

    pub(crate) fn write_human(&self, mut out: impl Write) -> Result<()> {
        if self.entries.is_empty() {
            writeln!(out, "No boot entries in {}; nothing to do.", self.entries_dir)?;
            return Ok(());
        }
        for entry in self.entries.iter() {
            let path = &entry.path;
            match &entry.outcome {
                EntryOutcome::Skipped => {
                    writeln!(out, "{} {path} (no linux line)", "skipped".dimmed())?
                }
                EntryOutcome::Unchanged => writeln!(out, "{} {path}", "ok".green())?,
                EntryOutcome::Patched { backup } => writeln!(
                    out,
                    "{} {path} (backup: {backup})",
                    "patched".green().bold()
                )?,
                EntryOutcome::WouldPatch { content } => {
                    writeln!(out, "{} {path}:", "would patch".yellow().bold())?;
                    for line in content.lines() {
                        writeln!(out, "    {line}")?;
                    }
                }
                EntryOutcome::Failed { message, .. } => {
                    writeln!(out, "{} {message}", "failed".red().bold())?
                }
            }
        }
        let failures = self.failures();
        if failures > 0 {
            writeln!(
                out,
                "{}",
                format!("{failures} of {} entries failed", self.entries.len()).red()
            )?;
        }
        Ok(())
    }
}

/// Read-only view of one entry, for `status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct EntryStatus {
    pub(crate) path: Utf8PathBuf,
    /// Has a `linux` line.
    pub(crate) linux: bool,
    pub(crate) microcode: bool,
    /// One microcode line, before the initramfs.
    pub(crate) ordered: bool,
    /// `patch` would rewrite it.
    pub(crate) needs_patch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

/// The result of a `status` run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct StatusReport {
    pub(crate) entries_dir: Utf8PathBuf,
    pub(crate) entries: Vec<EntryStatus>,
}

impl StatusReport {
    pub(crate) fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.error.is_some()).count()
    }

    pub(crate) fn write_json(&self, mut out: impl Write) -> Result<()> {
        self.to_canon_json_writer(&mut out)
            .map_err(anyhow::Error::new)?;
        writeln!(out)?;
        Ok(())
    }

    pub(crate) fn write_human(&self, mut out: impl Write) -> Result<()> {
        if self.entries.is_empty() {
            writeln!(out, "No boot entries in {}.", self.entries_dir)?;
            return Ok(());
        }
        for e in self.entries.iter() {
            let path = &e.path;
            if let Some(err) = e.error.as_deref() {
                writeln!(out, "{} {err}", "error".red().bold())?;
            } else if !e.linux {
                writeln!(out, "{} {path}", "not linux".dimmed())?;
            } else if e.needs_patch {
                let why = if e.microcode {
                    "microcode misplaced"
                } else {
                    "no microcode"
                };
                writeln!(out, "{} {path} ({why})", "needs patch".yellow().bold())?;
            } else {
                writeln!(out, "{} {path}", "ok".green())?;
            }
        }
        Ok(())
    }
}
