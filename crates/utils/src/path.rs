use std::borrow::Cow;
use std::fmt::Display;

use camino::Utf8Path;

/// Helper to format a path so it can be pasted into a shell.
#[derive(Debug)]
pub struct PathQuotedDisplay<'a> {
    path: &'a Utf8Path,
}

impl<'a> Display for PathQuotedDisplay<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&shell_quote(self.path.as_str()))
    }
}

impl<'a> PathQuotedDisplay<'a> {
    /// Given a path, quote it in a way that it would be parsed by a default
    /// POSIX shell. If the path has no spaces or shell meta-characters,
    /// it will be exactly the same as the input.
    pub fn new<P: AsRef<Utf8Path> + ?Sized>(path: &'a P) -> PathQuotedDisplay<'a> {
        PathQuotedDisplay {
            path: path.as_ref(),
        }
    }
}

fn shell_quote(s: &str) -> Cow<'_, str> {
    if !s.is_empty()
        && s.chars()
            .all(|c| matches!(c, '/' | '.' | '-' | '_' | '+' | ':') || c.is_alphanumeric())
    {
        return Cow::Borrowed(s);
    }
    // Only fails on interior NUL bytes, which a path cannot hold.
    shlex::try_quote(s).unwrap_or_else(|_| Cow::Owned(format!("{s:?}")))
}

/// The shell command that puts `backup` back in place of `target`.
///
/// Used in error messages when an entry was backed up but could not be
/// rewritten.
pub fn restore_command(backup: &Utf8Path, target: &Utf8Path) -> String {
    format!(
        "cp -p -- {} {}",
        PathQuotedDisplay::new(backup),
        PathQuotedDisplay::new(target)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquoted() {
        for v in [
            "/boot/loader/entries/arch.conf",
            "/efi/loader/entries/arch-lts.conf.bak.20250131-235959",
            "relative/entry+1.conf",
        ] {
            assert_eq!(v, PathQuotedDisplay::new(v).to_string());
        }
    }

    #[test]
    fn test_quoted() {
        let cases = [
            ("", "''"),
            ("/boot/loader/my entries/a.conf", "'/boot/loader/my entries/a.conf'"),
            ("/boot/$x.conf", "'/boot/$x.conf'"),
            (r#"/boot/"q'.conf"#, r#""/boot/\"q'.conf""#),
        ];
        for (v, quoted) in cases {
            assert_eq!(quoted, PathQuotedDisplay::new(v).to_string());
        }
    }

    #[test]
    fn test_restore_command() {
        let cmd = restore_command(
            Utf8Path::new("/boot/loader/entries/a b.conf.bak.20250131-235959"),
            Utf8Path::new("/boot/loader/entries/a b.conf"),
        );
        similar_asserts::assert_eq!(
            cmd,
            "cp -p -- '/boot/loader/entries/a b.conf.bak.20250131-235959' '/boot/loader/entries/a b.conf'"
        );
    }
}
