//! Moving the microcode `initrd` line into place.
//!
//! The policy is "remove, then reinsert": every microcode line is dropped,
//! and exactly one is put back immediately before the first initramfs
//! line, or immediately after the first `linux` line when the entry has
//! no initramfs. Running it on its own output is always a no-op.

use camino::Utf8Path;

use crate::parsers::bls_entry::{BootEntry, DirectiveKind, DirectiveLine, INITRD_KEY};

/// What [`patch`] decided for one entry.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PatchResult {
    /// No `linux` line; not an entry we manage.
    Skipped,
    /// Already in order.
    Unchanged,
    /// The entry as it should be written back.
    Patched(BootEntry),
}

/// Build a fresh microcode line with the indentation of `anchor`.
fn microcode_line(microcode: &Utf8Path, anchor: &str) -> DirectiveLine {
    let indent_len = anchor.len() - anchor.trim_start().len();
    DirectiveLine {
        kind: DirectiveKind::InitrdMicrocode,
        raw: format!("{}{INITRD_KEY} {microcode}", &anchor[..indent_len]),
    }
}

/// Apply the ordering policy to `entry`. The entry itself is not modified.
///
/// When the entry already had microcode lines, the first one is reused
/// with only its line ending adjusted, so a path such as
/// `/boot/amd-ucode.img` is preserved. Otherwise a new `initrd <microcode>`
/// line is inserted.
pub(crate) fn patch(entry: &BootEntry, microcode: &Utf8Path) -> PatchResult {
    let mut removed = None;
    let mut lines: Vec<DirectiveLine> = entry
        .lines
        .iter()
        .filter(|l| {
            if l.kind == DirectiveKind::InitrdMicrocode {
                removed.get_or_insert_with(|| (*l).clone());
                false
            } else {
                true
            }
        })
        .cloned()
        .collect();

    let initramfs = lines
        .iter()
        .position(|l| l.kind == DirectiveKind::InitrdInitramfs);
    let Some(linux) = lines
        .iter()
        .position(|l| l.kind == DirectiveKind::LinuxImage)
    else {
        return PatchResult::Skipped;
    };
    // First match wins for both anchors.
    let (at, anchor) = match initramfs {
        Some(i) => (i, i),
        None => (linux + 1, linux),
    };
    let mut line = removed.unwrap_or_else(|| microcode_line(microcode, &lines[anchor].raw));

    // In a CRLF entry the inserted line gets a CR too. When it goes last in
    // a file without a final newline, the line before it gains the
    // terminator instead and needs the CR.
    let crlf = entry.lines.iter().any(|l| l.raw.ends_with('\r'));
    let last = at == lines.len() && !entry.final_newline;
    if let Some(stripped) = line.raw.strip_suffix('\r') {
        line.raw = stripped.to_owned();
    }
    if crlf && !last {
        line.raw.push('\r');
    }
    if let Some(prev) = lines.last_mut().filter(|_| crlf && last) {
        if !prev.raw.ends_with('\r') {
            prev.raw.push('\r');
        }
    }
    lines.insert(at, line);

    if lines == entry.lines {
        return PatchResult::Unchanged;
    }
    PatchResult::Patched(BootEntry {
        path: entry.path.clone(),
        lines,
        final_newline: entry.final_newline,
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use quickcheck::{QuickCheck, TestResult};

    use super::*;
    use crate::parsers::bls_entry::amd_rules;

    const AMD: &str = "/amd-ucode.img";

    /// Run the policy on text, returning the new text (or the input when
    /// nothing changed) and the result.
    fn patch_str(input: &str) -> (String, PatchResult) {
        let entry = BootEntry::parse("a.conf", input, &amd_rules());
        let r = patch(&entry, Utf8Path::new(AMD));
        let out = match &r {
            PatchResult::Patched(e) => e.render(),
            _ => input.to_owned(),
        };
        (out, r)
    }

    fn ucode_count(s: &str) -> usize {
        BootEntry::parse("a.conf", s, &amd_rules())
            .lines
            .iter()
            .filter(|l| l.kind == DirectiveKind::InitrdMicrocode)
            .count()
    }

    #[test]
    fn test_insert_before_initramfs() {
        let (out, r) = patch_str("linux /vmlinuz-linux\ninitrd /initramfs-linux.img\n");
        assert!(matches!(r, PatchResult::Patched(_)));
        similar_asserts::assert_eq!(
            out,
            "linux /vmlinuz-linux\ninitrd /amd-ucode.img\ninitrd /initramfs-linux.img\n"
        );
    }

    #[test]
    fn test_reorder_misplaced() {
        let input = indoc! { r#"
            title Arch Linux
            linux /vmlinuz-linux
            initrd /initramfs-linux.img
            initrd /amd-ucode.img
            options root=UUID=abc rw
        "# };
        let expected = indoc! { r#"
            title Arch Linux
            linux /vmlinuz-linux
            initrd /amd-ucode.img
            initrd /initramfs-linux.img
            options root=UUID=abc rw
        "# };
        let (out, r) = patch_str(input);
        assert!(matches!(r, PatchResult::Patched(_)));
        similar_asserts::assert_eq!(out, expected);
    }

    #[test]
    fn test_not_linux() {
        let input = indoc! { r#"
            title Windows Boot Manager
            efi /EFI/Microsoft/Boot/bootmgfw.efi
        "# };
        let (out, r) = patch_str(input);
        assert_eq!(r, PatchResult::Skipped);
        assert_eq!(out, input);

        // An initramfs alone doesn't make it a linux entry
        let input = "initrd /initramfs-linux.img\n";
        assert_eq!(patch_str(input).1, PatchResult::Skipped);
        assert_eq!(patch_str("").1, PatchResult::Skipped);
    }

    #[test]
    fn test_already_ordered() {
        let input = "linux /vmlinuz-linux\ninitrd /amd-ucode.img\ninitrd /initramfs-linux.img\n";
        assert_eq!(patch_str(input).1, PatchResult::Unchanged);
    }

    #[test]
    fn test_no_initramfs() {
        let input = indoc! { r#"
            title UKI-ish
            linux /vmlinuz-linux
            options quiet
        "# };
        let (out, _) = patch_str(input);
        similar_asserts::assert_eq!(
            out,
            "title UKI-ish\nlinux /vmlinuz-linux\ninitrd /amd-ucode.img\noptions quiet\n"
        );
    }

    #[test]
    fn test_duplicates_collapsed() {
        let input = indoc! { r#"
            linux /vmlinuz-linux
            initrd /amd-ucode.img
            initrd /initramfs-linux.img
            initrd /amd-ucode.img
        "# };
        let (out, _) = patch_str(input);
        similar_asserts::assert_eq!(
            out,
            "linux /vmlinuz-linux\ninitrd /amd-ucode.img\ninitrd /initramfs-linux.img\n"
        );
    }

    #[test]
    fn test_first_initramfs_wins() {
        let input = indoc! { r#"
            linux /vmlinuz-linux
            initrd /initramfs-linux.img
            initrd /initramfs-linux-fallback.img
        "# };
        let (out, _) = patch_str(input);
        similar_asserts::assert_eq!(
            out,
            "linux /vmlinuz-linux\ninitrd /amd-ucode.img\ninitrd /initramfs-linux.img\ninitrd /initramfs-linux-fallback.img\n"
        );
    }

    #[test]
    fn test_existing_line_reused() {
        let input = "linux /vmlinuz-linux\ninitrd /initramfs-linux.img\n  initrd\t/boot/amd-ucode.img\n";
        let (out, _) = patch_str(input);
        similar_asserts::assert_eq!(
            out,
            "linux /vmlinuz-linux\n  initrd\t/boot/amd-ucode.img\ninitrd /initramfs-linux.img\n"
        );
    }

    #[test]
    fn test_style_follows_anchor() {
        let (out, _) = patch_str("  linux /vmlinuz-linux\r\n  initrd /initramfs-linux.img\r\n");
        similar_asserts::assert_eq!(
            out,
            "  linux /vmlinuz-linux\r\n  initrd /amd-ucode.img\r\n  initrd /initramfs-linux.img\r\n"
        );
        // No trailing newline stays that way
        let (out, _) = patch_str("linux /vmlinuz-linux");
        assert_eq!(out, "linux /vmlinuz-linux\ninitrd /amd-ucode.img");
    }

    #[test]
    fn test_commented_ignored() {
        let input = indoc! { r#"
            # initrd /amd-ucode.img
            linux /vmlinuz-linux
            initrd /initramfs-linux.img
        "# };
        let (out, _) = patch_str(input);
        similar_asserts::assert_eq!(
            out,
            "# initrd /amd-ucode.img\nlinux /vmlinuz-linux\ninitrd /amd-ucode.img\ninitrd /initramfs-linux.img\n"
        );
    }

    #[test]
    fn test_crlf_without_final_newline() {
        // The anchor is the unterminated last line, but the file is CRLF
        let (out, _) = patch_str("linux /v\r\ninitrd /initramfs-linux.img");
        assert_eq!(
            out,
            "linux /v\r\ninitrd /amd-ucode.img\r\ninitrd /initramfs-linux.img"
        );
        // Appending after an unterminated linux line terminates it with CRLF
        let (out, _) = patch_str("title x\r\nlinux /v");
        assert_eq!(out, "title x\r\nlinux /v\r\ninitrd /amd-ucode.img");
        // A reused line takes the entry's line ending
        let (out, _) = patch_str("linux /v\r\ninitrd /initramfs-linux.img\r\ninitrd /amd-ucode.img");
        assert_eq!(
            out,
            "linux /v\r\ninitrd /amd-ucode.img\r\ninitrd /initramfs-linux.img\r"
        );
        for s in [
            "linux /v\r\ninitrd /initramfs-linux.img",
            "title x\r\nlinux /v",
        ] {
            let (once, _) = patch_str(s);
            assert_eq!(patch_str(&once).1, PatchResult::Unchanged, "{s:?}");
        }
    }

    /// Lines entries are generated from.
    const VOCABULARY: &[&str] = &[
        "title Arch Linux",
        "linux /vmlinuz-linux",
        "  linux\t/vmlinuz-linux-lts",
        "initrd /amd-ucode.img",
        "initrd /boot/amd-ucode.img",
        "initrd /initramfs-linux.img",
        "initrd /initramfs-linux-fallback.img",
        "initrd /intel-ucode.img",
        "# initrd /amd-ucode.img",
        "# linux /vmlinuz-linux",
        "options root=UUID=abc rw",
        "",
    ];

    /// Build an entry from indices into [`VOCABULARY`].
    fn generated_entry(picks: &[u8], crlf: bool, final_newline: bool) -> String {
        let ending = if crlf { "\r\n" } else { "\n" };
        let lines: Vec<&str> = picks
            .iter()
            .take(8)
            .map(|&i| VOCABULARY[usize::from(i) % VOCABULARY.len()])
            .collect();
        let mut s = lines.join(ending);
        if final_newline && !lines.is_empty() {
            s.push_str(ending);
        }
        s
    }

    fn check_properties(picks: Vec<u8>, crlf: bool, final_newline: bool) -> TestResult {
        let input = generated_entry(&picks, crlf, final_newline);
        let (once, r) = patch_str(&input);
        if r == PatchResult::Skipped {
            // Skipped entries must be byte-identical
            return TestResult::from_bool(
                BootEntry::parse("a.conf", &input, &amd_rules()).render() == input,
            );
        }
        // Idempotence
        let (twice, r2) = patch_str(&once);
        if once != twice || r2 != PatchResult::Unchanged {
            return TestResult::error(format!("not idempotent: {input:?} -> {once:?}"));
        }
        // No duplication, and ordering
        let entry = BootEntry::parse("a.conf", &once, &amd_rules());
        if ucode_count(&once) != 1 || !entry.is_ordered() {
            return TestResult::error(format!("not ordered: {input:?} -> {once:?}"));
        }
        // No mixed line endings
        if input.contains("\r\n") && once.replace("\r\n", "").contains('\n') {
            return TestResult::error(format!("bare LF: {input:?} -> {once:?}"));
        }
        TestResult::passed()
    }

    #[test]
    fn test_properties() {
        QuickCheck::new()
            .tests(2000)
            .quickcheck(check_properties as fn(Vec<u8>, bool, bool) -> TestResult);
    }
}
