//! Replacing an entry on disk, after saving a backup of it.
//!
//! The backup is written and synced before the entry is touched, and the
//! entry itself is replaced atomically (temporary file plus rename), so at
//! every point either the old or the new content is in place.

use std::io::{self, Write};

use bls_ucode_utils::{restore_command, TimestampSource};
use camino::Utf8PathBuf;
use cap_std_ext::cap_std::fs::{OpenOptions, Permissions};
use cap_std_ext::dirext::CapStdExtDirExt;

use crate::entries::EntriesDir;
use crate::error::EntryError;

/// How many `.N` suffixes we try before giving up on a backup name.
const MAX_BACKUP_ATTEMPTS: u32 = 100;

/// Write `original` to a new sibling of `name` called
/// `<name>.bak.<YYYYMMDD-HHMMSS>`, adding `.1`, `.2`, ... if that is taken.
/// An existing file is never overwritten. Returns the backup's file name.
fn create_backup(
    entries: &EntriesDir,
    name: &str,
    original: &[u8],
    perms: &Permissions,
    clock: &dyn TimestampSource,
) -> io::Result<String> {
    let base = format!("{name}.bak.{}", clock.backup_stamp());
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    for n in 0..MAX_BACKUP_ATTEMPTS {
        let candidate = if n == 0 {
            base.clone()
        } else {
            format!("{base}.{n}")
        };
        let mut f = match entries.dir.open_with(&candidate, &opts) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };
        let r = f
            .set_permissions(perms.clone())
            .and_then(|()| f.write_all(original))
            .and_then(|()| f.sync_all());
        if let Err(e) = r {
            drop(f);
            // A partial backup is worse than none.
            if let Err(rm) = entries.dir.remove_file(&candidate) {
                tracing::warn!("Removing partial backup {}/{candidate}: {rm}", entries.path);
            }
            return Err(e);
        }
        return Ok(candidate);
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("{base} and {MAX_BACKUP_ATTEMPTS} numbered variants already exist"),
    ))
}

/// Back up `name` (whose current bytes are `original`) and replace it
/// with `content`. Returns the path of the backup.
///
/// If no backup can be made the entry is not touched. A failure after the
/// backup exists is reported with the command that restores it.
pub(crate) fn write_back(
    entries: &EntriesDir,
    name: &str,
    original: &[u8],
    content: &str,
    clock: &dyn TimestampSource,
) -> Result<Utf8PathBuf, EntryError> {
    write_back_with(entries, name, original, clock, |perms| {
        entries.dir.atomic_write_with_perms(name, content, perms)
    })
}

/// [`write_back`], with the final replace step supplied by the caller.
fn write_back_with(
    entries: &EntriesDir,
    name: &str,
    original: &[u8],
    clock: &dyn TimestampSource,
    replace: impl FnOnce(Permissions) -> io::Result<()>,
) -> Result<Utf8PathBuf, EntryError> {
    let path = entries.path.join(name);
    let backup_failed = |source| EntryError::BackupFailed {
        path: path.clone(),
        source,
    };

    let perms = entries
        .dir
        .metadata(name)
        .map_err(backup_failed)?
        .permissions();
    let backup = create_backup(entries, name, original, &perms, clock).map_err(backup_failed)?;
    let backup = entries.path.join(backup);
    tracing::debug!("Saved {path} to {backup}");

    replace(perms).map_err(|source| EntryError::WriteFailed {
        restore: restore_command(&backup, &path),
        path: path.clone(),
        backup: backup.clone(),
        source,
    })?;
    Ok(backup)
}
