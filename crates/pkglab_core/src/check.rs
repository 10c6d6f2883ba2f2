use camino::{Utf8Path, Utf8PathBuf};
use pkg_version::PublishedVersion;
use pkglab_fs::{MANIFEST_FILENAME, Manifest};

use crate::error::PkglabError;

/// Walks `dir`'s `node_modules` (one level, descending into `@scope/`
/// namespace directories) looking for installed packages whose version
/// matches the pkglab published-version grammar (§6). Their presence means
/// this directory would ship a dependency resolved against the local
/// sandbox instead of a real registry release.
pub fn installed_pkglab_artifacts(dir: &Utf8Path) -> Result<Vec<String>, PkglabError> {
    let node_modules = dir.join("node_modules");
    let mut found = Vec::new();
    if node_modules.is_dir() {
        visit(&node_modules, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn visit(dir: &Utf8Path, found: &mut Vec<String>) -> Result<(), PkglabError> {
    let entries = fs_err::read_dir(dir).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
    for entry in entries {
        let entry = entry.map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        let path = Utf8PathBuf::try_from(entry.path()).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        if !path.is_dir() {
            continue;
        }
        if path.file_name().is_some_and(|name| name.starts_with('@')) {
            visit(&path, found)?;
            continue;
        }
        let manifest_path = path.join(MANIFEST_FILENAME);
        if !manifest_path.is_file() {
            continue;
        }
        let Ok(manifest) = Manifest::read(&manifest_path) else { continue };
        let Some(version) = manifest.version() else { continue };
        if version.parse::<PublishedVersion>().is_ok() {
            let name = manifest.name().unwrap_or_else(|| path.file_name().unwrap_or("?"));
            found.push(format!("{name}@{version}"));
        }
    }
    Ok(())
}
