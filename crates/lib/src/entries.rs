//! Finding the entry files to work on.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std_ext::cap_std;
use cap_std_ext::cap_std::fs::Dir;
use fn_error_context::context;

/// An opened directory of boot entries.
#[derive(Debug)]
pub(crate) struct EntriesDir {
    pub(crate) path: Utf8PathBuf,
    pub(crate) dir: Dir,
}

/// Entry files end in `suffix`. Hidden files are skipped, which also
/// keeps us away from temporary files of an interrupted atomic write.
fn is_entry_name(name: &str, suffix: &str) -> bool {
    !name.starts_with('.') && name.len() > suffix.len() && name.ends_with(suffix)
}

impl EntriesDir {
    /// Open `path`; a directory that does not exist gives `None`.
    #[context("Opening entries directory {path}")]
    pub(crate) fn open(path: &Utf8Path) -> Result<Option<Self>> {
        match Dir::open_ambient_dir(path, cap_std::ambient_authority()) {
            Ok(dir) => Ok(Some(Self {
                path: path.to_owned(),
                dir,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of the regular files that look like entries, in
    /// lexicographic order.
    pub(crate) fn entry_names(&self, suffix: &str) -> Result<impl Iterator<Item = String>> {
        let mut names = Vec::new();
        let entries = self
            .dir
            .entries()
            .with_context(|| format!("Listing {}", self.path))?;
        for ent in entries {
            let ent = ent.with_context(|| format!("Listing {}", self.path))?;
            let name = ent.file_name();
            let Some(name) = name.to_str() else {
                tracing::warn!("Ignoring non-UTF-8 file name {name:?} in {}", self.path);
                continue;
            };
            if !is_entry_name(name, suffix) {
                continue;
            }
            let ty = ent
                .file_type()
                .with_context(|| format!("Querying {}/{name}", self.path))?;
            if !ty.is_file() {
                tracing::debug!("Ignoring {name}: not a regular file");
                continue;
            }
            names.push(name.to_owned());
        }
        names.sort();
        Ok(names.into_iter())
    }
}

/// Full paths of the entries in `path`; empty if it does not exist.
pub(crate) fn list_entries(
    path: &Utf8Path,
    suffix: &str,
) -> Result<impl Iterator<Item = Utf8PathBuf>> {
    let names: Vec<String> = match EntriesDir::open(path)? {
        Some(d) => d.entry_names(suffix)?.collect(),
        None => Vec::new(),
    };
    let path = path.to_owned();
    Ok(names.into_iter().map(move |n| path.join(n)))
}
