use anyhow::Context;
use camino::Utf8Path;
use std::io::Write as _;
use tracing::trace;

/// Write `contents` to `path` atomically: write to a sibling temp file, fsync
/// it, then rename it into place. A reader of `path` never observes a
/// partially-written file, matching the adapter contract in the publish
/// pipeline (producer manifest rewrites must be all-or-nothing).
pub fn write_atomic(path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
    trace!(%path, bytes = contents.len(), "writing file atomically");
    let dir = path
        .parent()
        .with_context(|| format!("{path} has no parent directory"))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file next to {path}"))?;
    tmp.write_all(contents)
        .with_context(|| format!("failed to write temp file for {path}"))?;
    tmp.as_file().sync_all().context("failed to fsync temp file")?;
    tmp.persist(path)
        .with_context(|| format!("failed to rename temp file into {path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn write_atomic_creates_file_with_exact_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("manifest.json")).unwrap();

        write_atomic(&path, b"hello\n").unwrap();

        assert_eq!(fs_err::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn write_atomic_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("manifest.json")).unwrap();

        write_atomic(&path, b"first\n").unwrap();
        write_atomic(&path, b"second\n").unwrap();

        assert_eq!(fs_err::read_to_string(&path).unwrap(), "second\n");
    }
}
