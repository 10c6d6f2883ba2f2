use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};
use pkglab_fs::Manifest;

use crate::error::PkglabError;

/// A single producer-side package: a directory holding a `package.json`
/// that was matched by the workspace's discovery pattern.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub dir: Utf8PathBuf,
    pub base_version: String,
    /// All dependency names declared in either manifest section, not yet
    /// filtered down to in-workspace ones.
    pub declared_dependencies: BTreeSet<String>,
}

/// A scanned producer workspace: its packages and the in-workspace
/// dependency edges between them, held in topological (deps-first) order.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: Utf8PathBuf,
    order: Vec<Package>,
    /// name -> names of in-workspace packages it depends on.
    deps_of: BTreeMap<String, BTreeSet<String>>,
    /// name -> names of in-workspace packages that depend on it.
    dependents_of: BTreeMap<String, BTreeSet<String>>,
}

const DEFAULT_DISCOVERY_GLOB: &str = "packages/*";

impl Workspace {
    /// Scans `root` for member packages using the root manifest's
    /// `workspaces` array (falling back to [`DEFAULT_DISCOVERY_GLOB`]),
    /// builds the in-workspace dependency graph, and returns packages in
    /// topological order. Only single-segment glob-star patterns
    /// (`<dir>/*`) and bare relative directories are supported, which
    /// covers every producer layout in the spec's worked examples.
    pub fn scan(root: &Utf8Path) -> Result<Self, PkglabError> {
        let root_manifest_path = root.join(pkglab_fs::MANIFEST_FILENAME);
        let patterns = if root_manifest_path.is_file() {
            let manifest = Manifest::read(&root_manifest_path)
                .map_err(|e| PkglabError::InvalidWorkspace(format!("{root}: {e}")))?;
            manifest
                .workspaces_globs()
                .unwrap_or_else(|| vec![DEFAULT_DISCOVERY_GLOB.to_string()])
        } else {
            vec![DEFAULT_DISCOVERY_GLOB.to_string()]
        };

        let mut dirs = BTreeSet::new();
        for pattern in &patterns {
            for dir in expand_pattern(root, pattern)? {
                dirs.insert(dir);
            }
        }

        let mut by_name: BTreeMap<String, Package> = BTreeMap::new();
        for dir in dirs {
            let manifest_path = dir.join(pkglab_fs::MANIFEST_FILENAME);
            if !manifest_path.is_file() {
                continue;
            }
            let manifest = Manifest::read(&manifest_path)
                .map_err(|e| PkglabError::InvalidWorkspace(format!("{manifest_path}: {e}")))?;
            let name = manifest.name().ok_or_else(|| {
                PkglabError::InvalidWorkspace(format!("{manifest_path}: missing \"name\""))
            })?;
            let version = manifest.version().unwrap_or("0.0.0").to_string();
            let package = Package {
                name: name.to_string(),
                dir: dir.clone(),
                base_version: version,
                declared_dependencies: manifest.dependency_names(),
            };
            if let Some(existing) = by_name.insert(name.to_string(), package) {
                return Err(PkglabError::InvalidWorkspace(format!(
                    "package name \"{}\" declared by both {} and {dir}",
                    name, existing.dir
                )));
            }
        }

        let names: BTreeSet<String> = by_name.keys().cloned().collect();
        let mut deps_of: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut dependents_of: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for name in &names {
            dependents_of.insert(name.clone(), BTreeSet::new());
        }
        for (name, package) in &by_name {
            let deps: BTreeSet<String> = package
                .declared_dependencies
                .iter()
                .filter(|d| names.contains(d.as_str()))
                .cloned()
                .collect();
            for dep in &deps {
                dependents_of.get_mut(dep).expect("dep is in names").insert(name.clone());
            }
            deps_of.insert(name.clone(), deps);
        }

        let order = topological_order(&by_name, &deps_of)?;

        Ok(Self { root: root.to_owned(), order, deps_of, dependents_of })
    }

    pub fn packages(&self) -> &[Package] {
        &self.order
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.order.iter().find(|p| p.name == name)
    }

    /// In-workspace packages `name` directly depends on.
    pub fn direct_dependencies(&self, name: &str) -> BTreeSet<String> {
        self.deps_of.get(name).cloned().unwrap_or_default()
    }

    /// Every in-workspace package `name` depends on, transitively.
    pub fn dependencies_transitive(&self, name: &str) -> BTreeSet<String> {
        transitive_closure(name, &self.deps_of)
    }

    /// Every in-workspace package that depends on `name`, transitively.
    pub fn dependents_transitive(&self, name: &str) -> BTreeSet<String> {
        transitive_closure(name, &self.dependents_of)
    }

    /// `{name}` plus everything it depends on and everything that depends
    /// on it, restricted to the workspace's topological order.
    pub fn closure(&self, name: &str) -> Vec<&Package> {
        let mut members = self.dependencies_transitive(name);
        members.extend(self.dependents_transitive(name));
        members.insert(name.to_string());
        self.order.iter().filter(|p| members.contains(&p.name)).collect()
    }
}

fn transitive_closure(start: &str, edges: &BTreeMap<String, BTreeSet<String>>) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![start.to_string()];
    while let Some(name) = stack.pop() {
        let Some(neighbors) = edges.get(&name) else { continue };
        for neighbor in neighbors {
            if seen.insert(neighbor.clone()) {
                stack.push(neighbor.clone());
            }
        }
    }
    seen
}

fn topological_order(
    by_name: &BTreeMap<String, Package>,
    deps_of: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Vec<Package>, PkglabError> {
    let mut remaining: BTreeMap<String, usize> =
        deps_of.iter().map(|(name, deps)| (name.clone(), deps.len())).collect();
    let mut dependents_of: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, deps) in deps_of {
        for dep in deps {
            dependents_of.entry(dep.clone()).or_default().push(name.clone());
        }
    }

    let mut ready: BTreeSet<String> =
        remaining.iter().filter(|(_, count)| **count == 0).map(|(name, _)| name.clone()).collect();
    let mut order = Vec::with_capacity(by_name.len());

    while let Some(name) = ready.pop_first() {
        order.push(by_name.get(&name).expect("scanned package").clone());
        if let Some(dependents) = dependents_of.get(&name) {
            for dependent in dependents {
                let count = remaining.get_mut(dependent).expect("tracked");
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent.clone());
                }
            }
        }
    }

    if order.len() != by_name.len() {
        let unresolved: Vec<&str> = remaining
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, _)| name.as_str())
            .collect();
        return Err(PkglabError::InvalidWorkspace(format!(
            "dependency cycle among: {}",
            unresolved.join(", ")
        )));
    }

    Ok(order)
}

/// Expands a single `<prefix>/*` glob or a bare relative directory into the
/// list of directories it names, relative to `root`.
fn expand_pattern(root: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>, PkglabError> {
    if let Some(prefix) = pattern.strip_suffix("/*") {
        let base = root.join(prefix);
        let mut dirs = Vec::new();
        let entries = fs_err::read_dir(&base)
            .map_err(|e| PkglabError::InvalidWorkspace(format!("{base}: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| PkglabError::InvalidWorkspace(format!("{base}: {e}")))?;
            let path = Utf8PathBuf::try_from(entry.path())
                .map_err(|e| PkglabError::InvalidWorkspace(e.to_string()))?;
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    } else {
        Ok(vec![root.join(pattern)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkglab_test_fixtures::FakeProducer;
    use pretty_assertions::assert_eq;

    #[test]
    fn scans_packages_in_dependency_first_order() {
        let producer = FakeProducer::new()
            .package("a", "1.0.0", &[])
            .package("b", "1.0.0", &["a"])
            .package("c", "1.0.0", &["a", "b"])
            .build();

        let workspace = Workspace::scan(producer.root()).unwrap();
        let names: Vec<&str> = workspace.packages().iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn closure_includes_dependencies_and_dependents() {
        let producer = FakeProducer::new()
            .package("a", "1.0.0", &[])
            .package("b", "1.0.0", &["a"])
            .package("c", "1.0.0", &["b"])
            .package("unrelated", "1.0.0", &[])
            .build();

        let workspace = Workspace::scan(producer.root()).unwrap();
        let closure: BTreeSet<&str> =
            workspace.closure("b").into_iter().map(|p| p.name.as_str()).collect();

        assert_eq!(closure, BTreeSet::from(["a", "b", "c"]));
    }

    #[test]
    fn detects_dependency_cycles() {
        let producer = FakeProducer::new()
            .package("a", "1.0.0", &["b"])
            .package("b", "1.0.0", &["a"])
            .build();

        let err = Workspace::scan(producer.root()).unwrap_err();
        assert!(matches!(err, PkglabError::InvalidWorkspace(_)));
    }

    #[test]
    fn rejects_duplicate_package_names() {
        let producer = FakeProducer::new().package("a", "1.0.0", &[]).build();
        fs_err::create_dir_all(producer.root().join("packages/a-dup")).unwrap();
        fs_err::write(
            producer.root().join("packages/a-dup/package.json"),
            "{\"name\": \"a\", \"version\": \"1.0.0\"}",
        )
        .unwrap();

        let err = Workspace::scan(producer.root()).unwrap_err();
        assert!(matches!(err, PkglabError::InvalidWorkspace(_)));
    }
}
