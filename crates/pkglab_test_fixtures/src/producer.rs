use camino::Utf8PathBuf;
use serde_json::json;

/// A producer workspace built under a throwaway directory, for tests that
/// exercise the workspace scanner, fingerprinter, and publish pipeline.
/// Packages are written under `packages/<name>/package.json`, matching the
/// default discovery glob (§4.A).
#[derive(Debug)]
pub struct FakeProducer {
    root: Utf8PathBuf,
    _dir: tempfile::TempDir,
}

impl FakeProducer {
    pub fn root(&self) -> &camino::Utf8Path {
        &self.root
    }
}

/// Builder for [`FakeProducer`]; packages are added in any order and the
/// builder writes a `package-lock.json` alongside each one so the npm
/// adapter detects it.
#[derive(Debug, Default)]
pub struct FakeProducerBuilder {
    packages: Vec<(String, String, Vec<String>)>,
}

impl FakeProducer {
    pub fn new() -> FakeProducerBuilder {
        FakeProducerBuilder::default()
    }
}

impl FakeProducerBuilder {
    /// Registers a package named `name` at `version`, depending on each of
    /// `deps` (by name; these become `dependencies` entries, whether or not
    /// they resolve to an in-workspace package).
    pub fn package(mut self, name: &str, version: &str, deps: &[&str]) -> Self {
        self.packages.push((
            name.to_string(),
            version.to_string(),
            deps.iter().map(|d| d.to_string()).collect(),
        ));
        self
    }

    pub fn build(self) -> FakeProducer {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8 path");

        fs_err::create_dir_all(root.join("packages")).expect("failed to create packages dir");

        let root_manifest = json!({
            "name": "producer-root",
            "private": true,
            "workspaces": ["packages/*"],
        });
        fs_err::write(
            root.join("package.json"),
            serde_json::to_string_pretty(&root_manifest).unwrap() + "\n",
        )
        .expect("failed to write root manifest");

        for (name, version, deps) in &self.packages {
            let pkg_dir = root.join("packages").join(sanitize_dir_name(name));
            fs_err::create_dir_all(&pkg_dir).expect("failed to create package dir");

            let mut dependencies = serde_json::Map::new();
            for dep in deps {
                dependencies.insert(dep.clone(), serde_json::Value::String("^1.0.0".to_string()));
            }
            let manifest = json!({
                "name": name,
                "version": version,
                "dependencies": dependencies,
            });
            fs_err::write(
                pkg_dir.join("package.json"),
                serde_json::to_string_pretty(&manifest).unwrap() + "\n",
            )
            .expect("failed to write package manifest");
            fs_err::write(pkg_dir.join("package-lock.json"), "{}\n").expect("failed to write lockfile");
            fs_err::write(pkg_dir.join("index.js"), format!("module.exports = \"{name}\";\n"))
                .expect("failed to write source file");
        }

        FakeProducer { root, _dir: dir }
    }
}

fn sanitize_dir_name(name: &str) -> String {
    name.replace(['@', '/'], "-")
}
