//! See <https://uapi-group.org/specifications/specs/boot_loader_specification/>
//!
//! A line-level model of Type #1 entry files. Only the `linux` and
//! `initrd` keys are interpreted, and only far enough to tell the
//! kernel, the microcode image and the initramfs apart. Every line
//! is kept verbatim so that rendering an unmodified entry gives back
//! the exact input bytes.

use anyhow::{anyhow, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

/// The key naming the kernel image.
pub(crate) const LINUX_KEY: &str = "linux";
/// The key naming an initrd image; may appear more than once.
pub(crate) const INITRD_KEY: &str = "initrd";

/// What a single line of an entry file is, as far as we care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DirectiveKind {
    /// `linux <path>`
    LinuxImage,
    /// `initrd <path>` where `<path>` names the microcode image
    InitrdMicrocode,
    /// `initrd <path>` where `<path>` names a general-purpose initramfs
    InitrdInitramfs,
    /// Anything else, including comments and other `initrd` lines
    Other,
}

/// A classified line. `raw` never contains the `\n` terminator, but does
/// keep the `\r` of a CRLF file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DirectiveLine {
    pub(crate) kind: DirectiveKind,
    pub(crate) raw: String,
}

/// Tells microcode and initramfs images apart by their file name.
#[derive(Debug, Clone)]
pub(crate) struct ClassifyRules {
    /// Final path component of the microcode image, e.g. `amd-ucode.img`.
    microcode_name: String,
    /// Matched against the final path component of other `initrd` values.
    initramfs: Regex,
}

impl ClassifyRules {
    pub(crate) fn new(microcode: &Utf8Path, initramfs_pattern: &str) -> Result<Self> {
        let microcode_name = microcode
            .file_name()
            .ok_or_else(|| anyhow!("Microcode image path {microcode} has no file name"))?
            .to_owned();
        let initramfs = Regex::new(initramfs_pattern)
            .with_context(|| format!("Parsing initramfs pattern {initramfs_pattern:?}"))?;
        Ok(Self {
            microcode_name,
            initramfs,
        })
    }
}

/// The file name part of an image path as written in an entry.
fn image_name(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

fn classify_kind(line: &str, rules: &ClassifyRules) -> DirectiveKind {
    let line = line.trim();
    if line.starts_with('#') {
        return DirectiveKind::Other;
    }
    let mut words = line.split_ascii_whitespace();
    let (Some(key), Some(value)) = (words.next(), words.next()) else {
        return DirectiveKind::Other;
    };
    match key {
        LINUX_KEY => DirectiveKind::LinuxImage,
        INITRD_KEY => {
            let name = image_name(value);
            if name == rules.microcode_name {
                DirectiveKind::InitrdMicrocode
            } else if rules.initramfs.is_match(name) {
                DirectiveKind::InitrdInitramfs
            } else {
                DirectiveKind::Other
            }
        }
        _ => DirectiveKind::Other,
    }
}

/// Classify one line of an entry file. Leading and trailing whitespace is
/// ignored, and the key must be the first word of the line.
pub(crate) fn classify_line(line: &str, rules: &ClassifyRules) -> DirectiveLine {
    DirectiveLine {
        kind: classify_kind(line, rules),
        raw: line.to_owned(),
    }
}

/// One boot entry file, split into classified lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BootEntry {
    pub(crate) path: Utf8PathBuf,
    pub(crate) lines: Vec<DirectiveLine>,
    /// Whether the last line was terminated.
    pub(crate) final_newline: bool,
}

impl BootEntry {
    pub(crate) fn parse(
        path: impl Into<Utf8PathBuf>,
        content: &str,
        rules: &ClassifyRules,
    ) -> Self {
        let final_newline = content.ends_with('\n');
        let mut pieces: Vec<&str> = content.split('\n').collect();
        // split() yields a trailing empty piece after a final newline,
        // and a single empty piece for empty input.
        if final_newline || content.is_empty() {
            pieces.pop();
        }
        Self {
            path: path.into(),
            lines: pieces.into_iter().map(|l| classify_line(l, rules)).collect(),
            final_newline,
        }
    }

    pub(crate) fn render(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&line.raw);
        }
        if self.final_newline {
            out.push('\n');
        }
        out
    }

    /// Index of the first line of the given kind.
    pub(crate) fn first_index(&self, kind: DirectiveKind) -> Option<usize> {
        self.lines.iter().position(|l| l.kind == kind)
    }

    fn count(&self, kind: DirectiveKind) -> usize {
        self.lines.iter().filter(|l| l.kind == kind).count()
    }

    /// Whether this looks like a Linux entry at all.
    pub(crate) fn is_linux(&self) -> bool {
        self.first_index(DirectiveKind::LinuxImage).is_some()
    }

    pub(crate) fn has_microcode(&self) -> bool {
        self.first_index(DirectiveKind::InitrdMicrocode).is_some()
    }

    /// There is exactly one microcode line, and it comes before the first
    /// initramfs line, or after the kernel line when there is no initramfs.
    pub(crate) fn is_ordered(&self) -> bool {
        if self.count(DirectiveKind::InitrdMicrocode) != 1 {
            return false;
        }
        let Some(ucode) = self.first_index(DirectiveKind::InitrdMicrocode) else {
            return false;
        };
        match (
            self.first_index(DirectiveKind::InitrdInitramfs),
            self.first_index(DirectiveKind::LinuxImage),
        ) {
            (Some(initramfs), _) => ucode < initramfs,
            (None, Some(linux)) => ucode > linux,
            (None, None) => false,
        }
    }
}

/// The stock rules for AMD hosts, shared by tests across the crate.
#[cfg(test)]
pub(crate) fn amd_rules() -> ClassifyRules {
    ClassifyRules::new(Utf8Path::new("/amd-ucode.img"), r"^initramfs.*\.img$").unwrap()
}
