use camino::Utf8PathBuf;
use serde_json::json;

/// A consumer repository built under a throwaway directory, for tests that
/// exercise `add`/`rm`/propagation without a real npm install. A
/// `package-lock.json` is always present so the npm adapter detects it;
/// the `install` step itself is expected to be stubbed in these tests.
#[derive(Debug)]
pub struct FakeConsumer {
    root: Utf8PathBuf,
    _dir: tempfile::TempDir,
}

impl FakeConsumer {
    pub fn root(&self) -> &camino::Utf8Path {
        &self.root
    }

    /// Builds a consumer whose manifest already declares `deps` (name,
    /// version, is-dev) as pre-existing entries, simulating a repo that had
    /// some of its dependencies before pkglab ever touched it.
    pub fn new(deps: &[(&str, &str, bool)]) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8 path");

        let mut dependencies = serde_json::Map::new();
        let mut dev_dependencies = serde_json::Map::new();
        for (name, version, is_dev) in deps {
            let target = if *is_dev { &mut dev_dependencies } else { &mut dependencies };
            target.insert((*name).to_string(), serde_json::Value::String((*version).to_string()));
        }

        let manifest = json!({
            "name": "consumer",
            "version": "1.0.0",
            "dependencies": dependencies,
            "devDependencies": dev_dependencies,
        });
        fs_err::write(root.join("package.json"), serde_json::to_string_pretty(&manifest).unwrap() + "\n")
            .expect("failed to write manifest");
        fs_err::write(root.join("package-lock.json"), "{}\n").expect("failed to write lockfile");

        Self { root, _dir: dir }
    }

    pub fn empty() -> Self {
        Self::new(&[])
    }
}
