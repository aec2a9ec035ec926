//! # bls-ucode command line
//!
//! Command line tool to keep the CPU microcode image first in the
//! `initrd` list of Boot Loader Specification entries.

use std::ffi::OsString;
use std::io::Write;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;

use crate::config::{PatcherConfig, PatcherConfigFile};
use crate::entries::list_entries;
use crate::run::{entries_status, patch_entries};

/// Options selecting which entries to look at and how to classify them.
#[derive(Debug, Default, clap::Args, PartialEq, Eq)]
pub(crate) struct SelectionOpts {
    /// Configuration file; defaults to /etc/bls-ucode.toml if present.
    #[clap(long)]
    pub(crate) config: Option<Utf8PathBuf>,

    /// Directory holding the entry files.
    #[clap(long)]
    pub(crate) entries_dir: Option<Utf8PathBuf>,

    /// Microcode image, as written in entries (e.g. /intel-ucode.img).
    #[clap(long)]
    pub(crate) microcode: Option<Utf8PathBuf>,

    /// Regular expression matched against initramfs file names.
    #[clap(long)]
    pub(crate) initramfs_pattern: Option<String>,
}

impl SelectionOpts {
    /// Resolve these flags on top of the config file.
    fn config(&self) -> Result<PatcherConfig> {
        let file = PatcherConfigFile::load(self.config.as_deref())?;
        let flags = PatcherConfigFile {
            entries_dir: self.entries_dir.clone(),
            microcode: self.microcode.clone(),
            initramfs_pattern: self.initramfs_pattern.clone(),
            entry_suffix: None,
        };
        PatcherConfig::new(file.merge(flags))
    }
}

/// Perform changes to boot entries.
#[derive(Debug, clap::Args, PartialEq, Eq)]
pub(crate) struct PatchOpts {
    #[clap(flatten)]
    pub(crate) selection: SelectionOpts,

    /// Show what would change, but don't write anything.
    #[clap(long)]
    pub(crate) dry_run: bool,

    /// Output a JSON report.
    #[clap(long)]
    pub(crate) json: bool,
}

/// Show the state of boot entries.
#[derive(Debug, clap::Args, PartialEq, Eq)]
pub(crate) struct StatusOpts {
    #[clap(flatten)]
    pub(crate) selection: SelectionOpts,

    /// Output in JSON format.
    #[clap(long)]
    pub(crate) json: bool,
}

/// List entry files.
#[derive(Debug, clap::Args, PartialEq, Eq)]
pub(crate) struct ListOpts {
    /// Configuration file; defaults to /etc/bls-ucode.toml if present.
    #[clap(long)]
    pub(crate) config: Option<Utf8PathBuf>,

    /// Directory holding the entry files.
    #[clap(long)]
    pub(crate) entries_dir: Option<Utf8PathBuf>,
}

/// Keep early microcode loaded first in boot loader entries.
///
/// Every entry with a `linux` line gets exactly one microcode `initrd`
/// line, placed right before the first initramfs. Rewritten entries are
/// backed up next to the original as `<name>.bak.<YYYYMMDD-HHMMSS>`.
#[derive(Debug, Parser, PartialEq, Eq)]
#[clap(name = "bls-ucode", version)]
pub(crate) enum Opt {
    /// Insert or move the microcode line in every entry.
    Patch(PatchOpts),
    /// Report which entries are in order, without changing anything.
    Status(StatusOpts),
    /// Print the entry files that would be considered.
    List(ListOpts),
}

fn print_entries(path: &Utf8Path, suffix: &str, mut out: impl Write) -> Result<()> {
    for entry in list_entries(path, suffix)? {
        writeln!(out, "{entry}")?;
    }
    Ok(())
}

/// Parse the provided arguments and execute.
/// Calls [`clap::Error::exit`] on failure, printing the error message and aborting the program.
pub fn run_from_iter<I>(args: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
{
    run_from_opt(Opt::parse_from(args))
}

fn run_from_opt(opt: Opt) -> Result<()> {
    let mut out = anstream::stdout().lock();
    match opt {
        Opt::Patch(opts) => {
            let config = opts.selection.config()?;
            let report = patch_entries(&config, opts.dry_run)?;
            if opts.json {
                report.write_json(&mut out)?;
            } else {
                report.write_human(&mut out)?;
            }
            out.flush().context("Writing to stdout")?;
            let failures = report.failures();
            anyhow::ensure!(
                failures == 0,
                "{failures} of {} entries could not be processed",
                report.entries.len()
            );
            Ok(())
        }
        Opt::Status(opts) => {
            let config = opts.selection.config()?;
            let report = entries_status(&config)?;
            if opts.json {
                report.write_json(&mut out)?;
            } else {
                report.write_human(&mut out)?;
            }
            out.flush().context("Writing to stdout")?;
            let failures = report.failures();
            anyhow::ensure!(failures == 0, "{failures} entries could not be read");
            Ok(())
        }
        Opt::List(opts) => {
            let selection = SelectionOpts {
                config: opts.config,
                entries_dir: opts.entries_dir,
                ..Default::default()
            };
            let config = selection.config()?;
            print_entries(&config.entries_dir, &config.entry_suffix, &mut out)?;
            out.flush().context("Writing to stdout")?;
            Ok(())
        }
    }
}
