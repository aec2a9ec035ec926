//! # Configuration
//!
//! Settings come from, in increasing priority: built-in defaults, an
//! optional TOML file, and command line flags. The file looks like:
//!
//! ```toml
//! [patcher]
//! entries-dir = "/efi/loader/entries"
//! microcode = "/intel-ucode.img"
//! initramfs-pattern = '^initramfs.*\.img$'
//! entry-suffix = ".conf"
//! ```

use anyhow::{Context, Result};
use bls_ucode_utils::{SystemClock, TimestampSource};
use camino::{Utf8Path, Utf8PathBuf};
use fn_error_context::context;
use serde::Deserialize;

use crate::parsers::bls_entry::ClassifyRules;

/// Read when `--config` is not given; it is fine for it to be missing.
pub(crate) const DEFAULT_CONFIG_PATH: &str = "/etc/bls-ucode.toml";
/// Where systemd-boot keeps Type #1 entries on a typical install.
pub(crate) const DEFAULT_ENTRIES_DIR: &str = "/boot/loader/entries";
/// As written into entries; relative to the root of the boot partition.
pub(crate) const DEFAULT_MICROCODE: &str = "/amd-ucode.img";
/// Matches `initramfs-linux.img`, `initramfs-linux-lts-fallback.img` and so on.
pub(crate) const DEFAULT_INITRAMFS_PATTERN: &str = r"^initramfs.*\.img$";
/// File name suffix of entry files.
pub(crate) const DEFAULT_ENTRY_SUFFIX: &str = ".conf";

/// The toplevel config entry, so that the file can grow other tables.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigToplevel {
    patcher: Option<PatcherConfigFile>,
}

/// Everything settable from the config file or the command line. Unset
/// fields fall through to the next source.
#[derive(Debug, Default, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub(crate) struct PatcherConfigFile {
    pub(crate) entries_dir: Option<Utf8PathBuf>,
    pub(crate) microcode: Option<Utf8PathBuf>,
    pub(crate) initramfs_pattern: Option<String>,
    pub(crate) entry_suffix: Option<String>,
}

impl PatcherConfigFile {
    fn parse(s: &str) -> Result<Self> {
        let top: ConfigToplevel = toml::from_str(s)?;
        Ok(top.patcher.unwrap_or_default())
    }

    /// Load `path`, or [`DEFAULT_CONFIG_PATH`] if it exists.
    #[context("Loading configuration")]
    pub(crate) fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (Utf8Path::new(DEFAULT_CONFIG_PATH), false),
        };
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {path}");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("Reading {path}")),
        };
        tracing::debug!("Using config file {path}");
        Self::parse(&contents).with_context(|| format!("Parsing {path}"))
    }

    /// Fields set in `other` take precedence.
    pub(crate) fn merge(self, other: Self) -> Self {
        Self {
            entries_dir: other.entries_dir.or(self.entries_dir),
            microcode: other.microcode.or(self.microcode),
            initramfs_pattern: other.initramfs_pattern.or(self.initramfs_pattern),
            entry_suffix: other.entry_suffix.or(self.entry_suffix),
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug)]
pub(crate) struct PatcherConfig {
    pub(crate) entries_dir: Utf8PathBuf,
    /// The image path written into new `initrd` lines.
    pub(crate) microcode: Utf8PathBuf,
    pub(crate) rules: ClassifyRules,
    pub(crate) entry_suffix: String,
    /// Names backups.
    pub(crate) clock: Box<dyn TimestampSource>,
}

impl PatcherConfig {
    /// Fill in defaults and validate.
    pub(crate) fn new(file: PatcherConfigFile) -> Result<Self> {
        let microcode = file
            .microcode
            .unwrap_or_else(|| DEFAULT_MICROCODE.into());
        let pattern = file
            .initramfs_pattern
            .as_deref()
            .unwrap_or(DEFAULT_INITRAMFS_PATTERN);
        let rules = ClassifyRules::new(&microcode, pattern)?;
        let entry_suffix = file
            .entry_suffix
            .unwrap_or_else(|| DEFAULT_ENTRY_SUFFIX.to_owned());
        anyhow::ensure!(!entry_suffix.is_empty(), "Entry suffix must not be empty");
        anyhow::ensure!(
            !entry_suffix.contains('/'),
            "Entry suffix {entry_suffix:?} must not contain '/'"
        );
        Ok(Self {
            entries_dir: file
                .entries_dir
                .unwrap_or_else(|| DEFAULT_ENTRIES_DIR.into()),
            microcode,
            rules,
            entry_suffix,
            clock: Box::new(SystemClock),
        })
    }

    /// Swap the clock, for deterministic backup names.
    #[cfg(test)]
    pub(crate) fn with_clock(mut self, clock: impl TimestampSource + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
}
