use std::collections::BTreeMap;
use std::fmt;

use blake2::{Blake2s256, Digest};
use camino::{Utf8Path, Utf8PathBuf};

use crate::error::PkglabError;

/// A fixed-width content digest for a package: the fold of every tracked
/// file's `(relative path, content)` pair with the fingerprints of its
/// in-workspace dependencies, per §3/§4.B. Presented as 32 lowercase hex
/// characters (16 raw bytes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a package rooted at `dir`.
    ///
    /// `tracked_files` must already be filtered to the adapter's publish
    /// filter (§4.C) and are sorted here to keep the digest order-independent
    /// of filesystem iteration order. `dep_fingerprints` must hold the
    /// already-computed fingerprint of every in-workspace dependency, keyed
    /// by package name; callers are expected to compute fingerprints in
    /// topological order so this map is always complete.
    pub fn compute(
        dir: &Utf8Path,
        tracked_files: &[Utf8PathBuf],
        dep_fingerprints: &BTreeMap<String, Fingerprint>,
    ) -> Result<Self, PkglabError> {
        let mut files = tracked_files.to_vec();
        files.sort();

        let mut hasher = Blake2s256::new();
        for relative_path in &files {
            let contents = fs_err::read(dir.join(relative_path))
                .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
            hasher.update(relative_path.as_str().len().to_le_bytes());
            hasher.update(relative_path.as_str().as_bytes());
            hasher.update(contents.len().to_le_bytes());
            hasher.update(&contents);
        }
        // `dep_fingerprints` is a BTreeMap, so iteration is already ordered by
        // dependency name, satisfying the "sorted by depName" fold order.
        for (name, fingerprint) in dep_fingerprints {
            hasher.update(name.as_bytes());
            hasher.update(fingerprint.0.as_bytes());
        }

        let digest = hasher.finalize();
        Ok(Self(hex::encode(&digest[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Utf8Path, name: &str, contents: &str) -> Utf8PathBuf {
        fs_err::write(dir.join(name), contents).unwrap();
        Utf8PathBuf::from(name)
    }

    #[test]
    fn is_a_pure_function_of_its_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let file = write(&dir, "index.js", "module.exports = 1;\n");

        let a = Fingerprint::compute(&dir, &[file.clone()], &BTreeMap::new()).unwrap();
        let b = Fingerprint::compute(&dir, &[file], &BTreeMap::new()).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn changes_when_file_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let file = write(&dir, "index.js", "module.exports = 1;\n");
        let before = Fingerprint::compute(&dir, &[file.clone()], &BTreeMap::new()).unwrap();

        write(&dir, "index.js", "module.exports = 2;\n");
        let after = Fingerprint::compute(&dir, &[file], &BTreeMap::new()).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn is_independent_of_tracked_file_ordering() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let a = write(&dir, "a.js", "a");
        let b = write(&dir, "b.js", "b");

        let forward = Fingerprint::compute(&dir, &[a.clone(), b.clone()], &BTreeMap::new()).unwrap();
        let backward = Fingerprint::compute(&dir, &[b, a], &BTreeMap::new()).unwrap();

        assert_eq!(forward, backward);
    }

    #[test]
    fn changes_when_a_dependency_fingerprint_changes() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let file = write(&dir, "index.js", "module.exports = 1;\n");

        let mut deps = BTreeMap::new();
        deps.insert("a".to_string(), Fingerprint("a".repeat(32)));
        let before = Fingerprint::compute(&dir, &[file.clone()], &deps).unwrap();

        deps.insert("a".to_string(), Fingerprint("b".repeat(32)));
        let after = Fingerprint::compute(&dir, &[file], &deps).unwrap();

        assert_ne!(before, after);
    }
}
