use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use pkg_version::{PublishedVersion, UNTAGGED, sanitize_tag};
use pkglab_fs::{MANIFEST_FILENAME, Manifest, canonicalize_best_effort};
use tokio::sync::Semaphore;
use tracing::{info, instrument};
use url::Url;

use crate::error::PkglabError;
use crate::fingerprint::Fingerprint;
use crate::package_manager::{self, PackageManager};
use crate::propagation::{self, PropagationReport, PublishedTuple};
use crate::state::{PublishedEntry, StateStore, pin_key};
use crate::workspace::{Package, Workspace};

const DEFAULT_CONCURRENCY: usize = 4;

/// Inputs to a single publish run, per §4.F.
#[derive(Debug)]
pub struct PublishRequest<'a> {
    pub producer_dir: &'a Utf8Path,
    selector: Option<&'a str>,
    explicit_tag: Option<&'a str>,
    worktree: bool,
    concurrency: usize,
}

impl<'a> PublishRequest<'a> {
    pub fn new(producer_dir: &'a Utf8Path) -> Self {
        Self { producer_dir, selector: None, explicit_tag: None, worktree: false, concurrency: DEFAULT_CONCURRENCY }
    }

    pub fn with_selector(mut self, selector: Option<&'a str>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_tag(mut self, tag: Option<&'a str>) -> Self {
        self.explicit_tag = tag;
        self
    }

    pub fn with_worktree(mut self, worktree: bool) -> Self {
        self.worktree = worktree;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

#[derive(Debug, Clone)]
pub struct PublishedPackage {
    pub name: String,
    pub version: PublishedVersion,
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub tag: String,
    pub published: Vec<PublishedPackage>,
    pub propagation: PropagationReport,
}

/// Runs the full publish pipeline (§4.F steps 1-8): tag resolution, scan,
/// selection closure, fingerprint & filter, version assignment, manifest
/// rewrite, pack & publish, then commit-or-rollback and propagation.
#[instrument(skip(store, request), fields(producer = %request.producer_dir))]
pub async fn publish(
    store: &StateStore,
    registry_url: &Url,
    token: &str,
    request: PublishRequest<'_>,
) -> Result<PublishOutcome, PkglabError> {
    if request.explicit_tag.is_some() && request.worktree {
        return Err(PkglabError::ConflictingOptions(
            "pass either -t/--tag or -w/--worktree, not both".to_string(),
        ));
    }

    let tag = resolve_tag(request.producer_dir, request.explicit_tag, request.worktree)?;

    let workspace = Workspace::scan(request.producer_dir)?;
    let closure = selection_closure(&workspace, request.selector)?;

    let mut adapters: BTreeMap<String, Box<dyn PackageManager>> = BTreeMap::new();
    for package in &closure {
        let adapter = package_manager::detect(&package.dir)
            .ok_or_else(|| PkglabError::PackFailed(format!("{}: no supported package manager", package.dir)))?;
        adapters.insert(package.name.clone(), adapter);
    }

    // `closure` inherits the workspace's topological order, so dependency
    // fingerprints are always already computed by the time a package needs
    // them (§4.B).
    let mut fingerprints: BTreeMap<String, Fingerprint> = BTreeMap::new();
    for package in &closure {
        let adapter = &adapters[&package.name];
        let tracked = adapter.tracked_files(&package.dir)?;
        let dep_fingerprints: BTreeMap<String, Fingerprint> = workspace
            .direct_dependencies(&package.name)
            .into_iter()
            .filter_map(|dep| fingerprints.get(&dep).map(|fp| (dep, fp.clone())))
            .collect();
        let fingerprint = Fingerprint::compute(&package.dir, &tracked, &dep_fingerprints)?;
        fingerprints.insert(package.name.clone(), fingerprint);
    }

    // Held for the rest of this function (§5): fingerprint diffing, version
    // assignment, pack/publish, the catalog commit, and propagation all run
    // under one lock, so a concurrent `pub` can't read the same
    // last-published N and race to commit — it blocks here instead, and
    // eventually fails with `Busy` if this run doesn't finish in time.
    let mut guard = store.lock_exclusive()?;

    let publish_set: Vec<&Package> = closure
        .iter()
        .copied()
        .filter(|package| match guard.catalog().last_published(&package.name, &tag) {
            Some(entry) => entry.fingerprint != fingerprints[&package.name].as_str(),
            None => true,
        })
        .collect();

    if publish_set.is_empty() {
        info!(tag = %tag, "no packages changed since last publish");
        guard.discard();
        return Ok(PublishOutcome { tag, published: Vec::new(), propagation: PropagationReport::default() });
    }

    let tag_for_version = (tag != UNTAGGED).then_some(tag.as_str());
    let mut new_versions: BTreeMap<String, PublishedVersion> = BTreeMap::new();
    for package in &publish_set {
        let prev_n = guard
            .catalog()
            .last_published(&package.name, &tag)
            .and_then(|entry| entry.version.parse::<PublishedVersion>().ok())
            .map_or(0, |v| v.n());
        new_versions.insert(package.name.clone(), PublishedVersion::new(tag_for_version, prev_n + 1));
    }

    let mut backups: Vec<(Utf8PathBuf, String)> = Vec::new();
    for package in &publish_set {
        let manifest_path = package.dir.join(MANIFEST_FILENAME);
        let original =
            fs_err::read_to_string(&manifest_path).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        backups.push((manifest_path.clone(), original));

        let mut manifest =
            Manifest::read(&manifest_path).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        manifest.set_version(&new_versions[&package.name].to_string());
        for dep in workspace.direct_dependencies(&package.name) {
            let Some((section, _)) = manifest.get_dependency(&dep) else { continue };
            if let Some(new_version) = new_versions.get(&dep) {
                manifest.set_dependency(section, &dep, &new_version.to_string());
            } else if let Some(entry) = guard.catalog().last_published(&dep, &tag) {
                manifest.set_dependency(section, &dep, &entry.version);
            }
        }
        manifest.write(&manifest_path).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
    }

    let pack_and_publish_result =
        pack_and_publish(&publish_set, &adapters, &workspace, registry_url, token, request.concurrency).await;

    match pack_and_publish_result {
        Ok(()) => {
            // The rewrite above only existed to produce the tarballs; the
            // producer's committed manifests must remain untouched (§4.F
            // step 8).
            for (path, original) in &backups {
                pkglab_fs::write_atomic(path, original.as_bytes())
                    .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
            }

            let now = Utc::now();
            guard.catalog_mut().producers.insert(canonicalize_best_effort(request.producer_dir));
            for package in &publish_set {
                guard.catalog_mut().published.insert(
                    pin_key(&package.name, &tag),
                    PublishedEntry {
                        version: new_versions[&package.name].to_string(),
                        fingerprint: fingerprints[&package.name].as_str().to_string(),
                        timestamp: now,
                    },
                );
            }

            let tuples: Vec<PublishedTuple> = publish_set
                .iter()
                .map(|package| PublishedTuple {
                    package: package.name.clone(),
                    tag: tag.clone(),
                    version: new_versions[&package.name].clone(),
                })
                .collect();
            // Propagation is part of this same publish pipeline run (§5), so
            // it stays under the guard instead of re-acquiring the lock: a
            // concurrent `add` observes either the pre- or post-publish
            // state, never a partially-propagated one.
            let propagation = propagation::propagate(guard.catalog_mut(), &tuples).await;
            guard.commit()?;

            let published = publish_set
                .iter()
                .map(|package| PublishedPackage {
                    name: package.name.clone(),
                    version: new_versions[&package.name].clone(),
                })
                .collect();
            Ok(PublishOutcome { tag, published, propagation })
        }
        Err(failing_package) => {
            for (path, original) in &backups {
                let _ = pkglab_fs::write_atomic(path, original.as_bytes());
            }
            guard.discard();
            Err(PkglabError::PublishFailed(failing_package))
        }
    }
}

fn resolve_tag(producer_dir: &Utf8Path, explicit_tag: Option<&str>, worktree: bool) -> Result<String, PkglabError> {
    if let Some(tag) = explicit_tag {
        return Ok(sanitize_tag(tag));
    }
    if worktree {
        let repo = vcs_cmd::Repo::new(producer_dir.to_owned())?;
        let branch = repo.current_branch()?;
        return Ok(sanitize_tag(&branch));
    }
    Ok(UNTAGGED.to_string())
}

fn selection_closure<'a>(workspace: &'a Workspace, selector: Option<&str>) -> Result<Vec<&'a Package>, PkglabError> {
    match selector {
        None => Ok(workspace.packages().iter().collect()),
        Some(name) => {
            workspace.package(name).ok_or_else(|| PkglabError::UnknownPackage(name.to_string()))?;
            Ok(workspace.closure(name))
        }
    }
}

/// Packs and publishes `publish_set` with bounded concurrency, never
/// starting a package before every in-closure dependency it has has
/// acknowledged (§4.F step 7). Returns the name of the first package whose
/// pack or publish call failed.
async fn pack_and_publish(
    publish_set: &[&Package],
    adapters: &BTreeMap<String, Box<dyn PackageManager>>,
    workspace: &Workspace,
    registry_url: &Url,
    token: &str,
    concurrency: usize,
) -> Result<(), String> {
    let in_set: BTreeSet<&str> = publish_set.iter().map(|p| p.name.as_str()).collect();
    let mut remaining_deps: BTreeMap<String, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for package in publish_set {
        let deps: Vec<String> =
            workspace.direct_dependencies(&package.name).into_iter().filter(|d| in_set.contains(d.as_str())).collect();
        remaining_deps.insert(package.name.clone(), deps.len());
        for dep in deps {
            dependents.entry(dep).or_default().push(package.name.clone());
        }
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut ready: Vec<String> =
        remaining_deps.iter().filter(|(_, count)| **count == 0).map(|(name, _)| name.clone()).collect();
    let mut done: BTreeSet<String> = BTreeSet::new();

    while done.len() < publish_set.len() {
        if ready.is_empty() {
            return Err("internal error: topological stall while publishing".to_string());
        }
        let batch = std::mem::take(&mut ready);
        let mut tasks = Vec::new();
        for name in &batch {
            let package = publish_set.iter().find(|p| &p.name == name).expect("name came from publish_set");
            let dir = package.dir.clone();
            let name = name.clone();
            let adapter = package_manager::adapter_for(adapters[&name].kind());
            let permit = semaphore.clone().acquire_owned();
            let registry_url = registry_url.clone();
            let token = token.to_string();
            tasks.push(tokio::spawn(async move {
                let _permit = permit.await.expect("semaphore is never closed");
                let tarball = adapter.pack(&dir).await.map_err(|e| format!("{name}: {e}"))?;
                adapter.publish(&tarball, &registry_url, &token).await.map_err(|e| format!("{name}: {e}"))?;
                Ok::<String, String>(name)
            }));
        }
        for task in tasks {
            let name = task.await.map_err(|e| e.to_string())??;
            done.insert(name.clone());
            if let Some(waiting) = dependents.get(&name) {
                for dependent in waiting {
                    let count = remaining_deps.get_mut(dependent).expect("tracked above");
                    *count -= 1;
                    if *count == 0 {
                        ready.push(dependent.clone());
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pkglab_test_fixtures::FakeProducer;

    use super::*;

    #[test]
    fn resolve_tag_sanitizes_an_explicit_tag() {
        let producer = FakeProducer::new().package("a", "1.0.0", &[]).build();
        let tag = resolve_tag(producer.root(), Some("feat/x-y"), false).unwrap();
        assert_eq!(tag, "feat-x-y");
    }

    #[test]
    fn resolve_tag_defaults_to_untagged() {
        let producer = FakeProducer::new().package("a", "1.0.0", &[]).build();
        let tag = resolve_tag(producer.root(), None, false).unwrap();
        assert_eq!(tag, UNTAGGED);
    }

    #[test]
    fn resolve_tag_derives_from_the_current_branch_in_worktree_mode() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let repo = vcs_cmd::test_fixture::init(&dir).unwrap();
        repo.git(&["checkout", "-b", "feat/my-change"]).unwrap();

        let tag = resolve_tag(&dir, None, true).unwrap();
        assert_eq!(tag, "feat-my-change");
    }

    #[test]
    fn selection_closure_with_no_selector_returns_every_package() {
        let producer = FakeProducer::new()
            .package("a", "1.0.0", &[])
            .package("b", "1.0.0", &["a"])
            .build();
        let workspace = Workspace::scan(producer.root()).unwrap();
        let closure = selection_closure(&workspace, None).unwrap();
        assert_eq!(closure.len(), 2);
    }

    #[test]
    fn selection_closure_with_a_selector_returns_its_dependency_closure() {
        let producer = FakeProducer::new()
            .package("a", "1.0.0", &[])
            .package("b", "1.0.0", &["a"])
            .package("c", "1.0.0", &[])
            .build();
        let workspace = Workspace::scan(producer.root()).unwrap();
        let closure = selection_closure(&workspace, Some("b")).unwrap();
        let names: Vec<&str> = closure.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"a"));
        assert!(names.contains(&"b"));
        assert!(!names.contains(&"c"));
    }

    #[test]
    fn selection_closure_rejects_an_unknown_package() {
        let producer = FakeProducer::new().package("a", "1.0.0", &[]).build();
        let workspace = Workspace::scan(producer.root()).unwrap();
        let err = selection_closure(&workspace, Some("nonexistent")).unwrap_err();
        assert!(matches!(err, PkglabError::UnknownPackage(_)));
    }
}
