//! The batch driver: every entry in the directory, one at a time, in
//! filename order. Failures are recorded per entry; only failing to list
//! the directory aborts the run.

use anyhow::Result;
use fn_error_context::context;

use crate::config::PatcherConfig;
use crate::entries::EntriesDir;
use crate::error::EntryError;
use crate::parsers::bls_entry::BootEntry;
use crate::patch::{patch, PatchResult};
use crate::report::{EntryOutcome, EntryReport, EntryStatus, Report, StatusReport};
use crate::writeback::write_back;

/// Read and parse one entry, returning its bytes too so that the backup
/// is exactly what was on disk.
fn read_entry(
    entries: &EntriesDir,
    name: &str,
    config: &PatcherConfig,
) -> Result<(Vec<u8>, BootEntry), EntryError> {
    let path = entries.path.join(name);
    let unreadable = |source| EntryError::Unreadable {
        path: path.clone(),
        source,
    };
    let bytes = entries.dir.read(name).map_err(unreadable)?;
    let content = std::str::from_utf8(&bytes)
        .map_err(|e| unreadable(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    let entry = BootEntry::parse(path.clone(), content, &config.rules);
    Ok((bytes, entry))
}

fn patch_one(
    entries: &EntriesDir,
    name: &str,
    config: &PatcherConfig,
    dry_run: bool,
) -> Result<EntryOutcome, EntryError> {
    let (original, entry) = read_entry(entries, name, config)?;
    let outcome = match patch(&entry, &config.microcode) {
        PatchResult::Skipped => {
            tracing::debug!("{}: no linux line, skipping", entry.path);
            EntryOutcome::Skipped
        }
        PatchResult::Unchanged => {
            tracing::debug!("{}: already in order", entry.path);
            EntryOutcome::Unchanged
        }
        PatchResult::Patched(new) if dry_run => EntryOutcome::WouldPatch {
            content: new.render(),
        },
        PatchResult::Patched(new) => {
            let backup = write_back(entries, name, &original, &new.render(), &*config.clock)?;
            tracing::info!("{}: patched, backup at {backup}", new.path);
            EntryOutcome::Patched { backup }
        }
    };
    Ok(outcome)
}

fn log_failure(e: &EntryError) {
    match e {
        EntryError::WriteFailed { .. } => {
            tracing::error!("{}; the entry may be left in an unknown state", e.detail())
        }
        _ => tracing::warn!("{}", e.detail()),
    }
}

/// Bring every entry in the configured directory into order.
#[context("Patching entries")]
pub(crate) fn patch_entries(config: &PatcherConfig, dry_run: bool) -> Result<Report> {
    let mut report = Report {
        entries_dir: config.entries_dir.clone(),
        dry_run,
        entries: Vec::new(),
    };
    let Some(entries) = EntriesDir::open(&config.entries_dir)? else {
        tracing::info!("{} does not exist; nothing to do", config.entries_dir);
        return Ok(report);
    };
    for name in entries.entry_names(&config.entry_suffix)? {
        let outcome = patch_one(&entries, &name, config, dry_run).unwrap_or_else(|e| {
            log_failure(&e);
            EntryOutcome::from(&e)
        });
        report.entries.push(EntryReport {
            path: entries.path.join(&name),
            outcome,
        });
    }
    if report.entries.is_empty() {
        tracing::info!("No entries in {}; nothing to do", config.entries_dir);
    }
    Ok(report)
}

fn entry_status(entries: &EntriesDir, name: &str, config: &PatcherConfig) -> EntryStatus {
    match read_entry(entries, name, config) {
        Ok((_, entry)) => EntryStatus {
            linux: entry.is_linux(),
            microcode: entry.has_microcode(),
            ordered: entry.is_ordered(),
            needs_patch: matches!(
                patch(&entry, &config.microcode),
                PatchResult::Patched(_)
            ),
            error: None,
            path: entry.path,
        },
        Err(e) => {
            log_failure(&e);
            EntryStatus {
                path: entries.path.join(name),
                linux: false,
                microcode: false,
                ordered: false,
                needs_patch: false,
                error: Some(e.detail()),
            }
        }
    }
}

/// Inspect every entry without changing anything.
#[context("Inspecting entries")]
pub(crate) fn entries_status(config: &PatcherConfig) -> Result<StatusReport> {
    let mut report = StatusReport {
        entries_dir: config.entries_dir.clone(),
        entries: Vec::new(),
    };
    if let Some(entries) = EntriesDir::open(&config.entries_dir)? {
        for name in entries.entry_names(&config.entry_suffix)? {
            report.entries.push(entry_status(&entries, &name, config));
        }
    }
    Ok(report)
}
