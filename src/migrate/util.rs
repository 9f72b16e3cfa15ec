use anyhow::{Context, Result};
use std::path::Path;
use tempfile::NamedTempFile;

/// Quote an identifier for SQLite. Column names come from the field catalog, so
/// they are never trusted as bare SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `?, ?, ?` with `count` placeholders.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Run `write` against a sibling temp file, then rename it over `target`.
/// On failure `target` is left as it was.
pub fn write_atomic<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    write(&mut tmp)?;
    tmp.persist(target)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", target.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("title"), "\"title\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn placeholders_are_comma_joined() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }

    #[test]
    fn failed_atomic_write_keeps_original() {
        let tmp = tempdir().expect("tempdir");
        let target = tmp.path().join("mapping.csv");
        fs::write(&target, "original\n").expect("seed");

        let result = write_atomic(&target, |file| {
            file.write_all(b"half")?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&target).expect("read"), "original\n");

        write_atomic(&target, |file| {
            file.write_all(b"replaced\n")?;
            Ok(())
        })
        .expect("write");
        assert_eq!(fs::read_to_string(&target).expect("read"), "replaced\n");
    }
}
