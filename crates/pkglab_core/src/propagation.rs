use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use pkg_version::{PublishedVersion, UNTAGGED};
use pkglab_fs::{Manifest, PackageManagerKind, canonicalize_best_effort};
use tracing::{info, instrument, warn};

use crate::error::PkglabError;
use crate::package_manager;
use crate::state::{Catalog, ConsumerRegistration, Pin, StateStore, pin_key};

/// A package published at a given tag with its new version; produced by the
/// publish pipeline (§4.F step 8) and consumed by [`propagate`] (§4.G).
#[derive(Debug, Clone)]
pub struct PublishedTuple {
    pub package: String,
    pub tag: String,
    pub version: PublishedVersion,
}

/// Per-consumer outcome of a propagation pass. `InstallFailed` entries don't
/// fail the overall call (§7): the pin and catalog have already advanced by
/// the time `install` runs.
#[derive(Debug, Default)]
pub struct PropagationReport {
    pub installed: Vec<Utf8PathBuf>,
    pub install_failures: Vec<(Utf8PathBuf, String)>,
}

/// For each published tuple, rewrites the manifest of every consumer
/// registered for that `(package, tag)` and reinstalls, per §4.G. Tag
/// isolation (§8 invariant 1) falls out naturally: only pins whose key
/// matches `(package, tag)` exactly are touched.
///
/// Takes the catalog directly rather than a [`StateStore`]: the caller (the
/// publish pipeline) already holds the exclusive lock for the entirety of
/// its run per §5, and propagation is part of that same run, not a
/// separate lock/unlock cycle.
#[instrument(skip(catalog))]
pub async fn propagate(catalog: &mut Catalog, published: &[PublishedTuple]) -> PropagationReport {
    let mut report = PropagationReport::default();

    for tuple in published {
        let key = pin_key(&tuple.package, &tuple.tag);
        let consumers: Vec<(Utf8PathBuf, Pin)> = catalog
            .consumers
            .iter()
            .filter_map(|(dir, reg)| reg.pins.get(&key).map(|pin| (dir.clone(), pin.clone())))
            .collect();

        for (consumer_dir, pin) in consumers {
            if let Err(e) = apply_pin_update(catalog, &consumer_dir, &key, &pin, &tuple.version).await {
                warn!(%consumer_dir, package = %tuple.package, "propagation failed: {e}");
                report.install_failures.push((consumer_dir, e.to_string()));
                continue;
            }
            report.installed.push(consumer_dir);
        }
    }

    report
}

async fn apply_pin_update(
    catalog: &mut Catalog,
    consumer_dir: &Utf8Path,
    key: &str,
    pin: &Pin,
    version: &PublishedVersion,
) -> Result<(), PkglabError> {
    let manifest_path = consumer_dir.join(pkglab_fs::MANIFEST_FILENAME);
    let mut manifest =
        Manifest::read(&manifest_path).map_err(|e| PkglabError::InstallFailed(format!("{manifest_path}: {e}")))?;
    manifest.set_dependency(pin.section, &pin.package, &version.to_string());
    manifest
        .write(&manifest_path)
        .map_err(|e| PkglabError::InstallFailed(format!("{manifest_path}: {e}")))?;

    // The pin advances unconditionally: the registry is the source of truth,
    // and `install` is idempotent to re-run (§4.G).
    if let Some(reg) = catalog.consumers.get_mut(consumer_dir) {
        if let Some(existing) = reg.pins.get_mut(key) {
            existing.version = version.to_string();
        }
    }

    let adapter = package_manager::detect(consumer_dir)
        .ok_or_else(|| PkglabError::InstallFailed(format!("{consumer_dir}: no supported package manager")))?;
    adapter
        .install(consumer_dir)
        .await
        .map_err(|e| PkglabError::InstallFailed(format!("{consumer_dir}: {e}")))
}

/// `add <pkg>[@tag]`: propagation-on-demand (§4.G). Looks up the latest
/// catalog entry for `(package, tag)`, creates or refreshes the pin
/// (capturing the manifest section and pre-existing version the first
/// time), rewrites the manifest, and installs.
#[instrument(skip(store))]
pub async fn add(
    store: &StateStore,
    consumer_dir: &Utf8Path,
    package: &str,
    tag: Option<&str>,
) -> Result<(), PkglabError> {
    let consumer_dir = canonicalize_best_effort(consumer_dir);
    let tag = tag.unwrap_or(UNTAGGED).to_string();

    // Held for the entirety of this `add` (§5): the lookup, the pin
    // insertion, and the `install` below all run under one lock, so a
    // concurrent `add`/`rm`/`pub` serializes against this one instead of
    // racing it.
    let mut guard = store.lock_exclusive()?;

    let entry = guard
        .catalog()
        .last_published(package, &tag)
        .cloned()
        .ok_or_else(|| PkglabError::UnknownTag(format!("{package}@{tag}")))?;

    let adapter = package_manager::detect(&consumer_dir)
        .ok_or_else(|| PkglabError::InstallFailed(format!("{consumer_dir}: no supported package manager")))?;

    let already_registered = guard.catalog().consumers.contains_key(&consumer_dir);
    if !already_registered {
        backup_consumer(store, &consumer_dir, adapter.kind())?;
    }

    let manifest_path = consumer_dir.join(pkglab_fs::MANIFEST_FILENAME);
    let mut manifest = Manifest::read(&manifest_path).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
    let (section, original_version) = match manifest.get_dependency(package) {
        Some((section, version)) => (section, Some(version)),
        None => (pkglab_fs::DependencySection::Runtime, None),
    };
    manifest.set_dependency(section, package, &entry.version);
    manifest
        .write(&manifest_path)
        .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;

    let key = pin_key(package, &tag);
    let reg = guard.catalog_mut().consumers.entry(consumer_dir.clone()).or_insert_with(|| {
        ConsumerRegistration { package_manager: adapter.kind().as_str().to_string(), pins: BTreeMap::new() }
    });
    reg.pins.insert(
        key,
        Pin {
            package: package.to_string(),
            tag: tag.clone(),
            version: entry.version.clone(),
            section,
            original_version: original_version.clone(),
        },
    );
    // The pin persists even if `install` below fails; the registry is the
    // source of truth, and `install` is idempotent to re-run later (§4.G).
    guard.flush()?;

    let install_result = adapter
        .install(&consumer_dir)
        .await
        .map_err(|e| PkglabError::InstallFailed(format!("{consumer_dir}: {e}")));
    guard.commit()?;
    install_result
}

/// `rm <pkg>`: removes the pin, restores whatever the dependency looked
/// like before pkglab's first `add` (or deletes the entry if pkglab
/// introduced it), and installs. De-registers the consumer if this was its
/// last pin (§3 invariant).
#[instrument(skip(store))]
pub async fn remove(store: &StateStore, consumer_dir: &Utf8Path, package: &str) -> Result<(), PkglabError> {
    let consumer_dir = canonicalize_best_effort(consumer_dir);

    // Held for the entirety of this `rm` (§5), same reasoning as `add`.
    let mut guard = store.lock_exclusive()?;

    let Some(keys): Option<Vec<String>> = guard.catalog().consumers.get(&consumer_dir).map(|reg| {
        reg.pins.iter().filter(|(_, pin)| pin.package == package).map(|(k, _)| k.clone()).collect()
    }) else {
        guard.discard();
        return Err(PkglabError::UnknownPackage(format!("{consumer_dir} has no pins for {package}")));
    };
    if keys.is_empty() {
        guard.discard();
        return Err(PkglabError::UnknownPackage(format!("{consumer_dir} has no pin for {package}")));
    }

    let removed_pins: Vec<(String, Pin)> = {
        let catalog = guard.catalog_mut();
        let reg = catalog.consumers.get_mut(&consumer_dir).expect("checked above");
        let removed: Vec<(String, Pin)> =
            keys.into_iter().map(|k| (k.clone(), reg.pins.remove(&k).expect("just found"))).collect();
        if reg.pins.is_empty() {
            catalog.consumers.remove(&consumer_dir);
        }
        removed
    };
    guard.flush()?;

    let manifest_path = consumer_dir.join(pkglab_fs::MANIFEST_FILENAME);
    let mut manifest = Manifest::read(&manifest_path).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
    for (_, pin) in &removed_pins {
        match &pin.original_version {
            Some(version) => manifest.set_dependency(pin.section, package, version),
            None => {
                manifest.remove_dependency(package);
            }
        }
    }
    manifest.write(&manifest_path).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;

    let adapter = package_manager::detect(&consumer_dir)
        .ok_or_else(|| PkglabError::InstallFailed(format!("{consumer_dir}: no supported package manager")))?;
    let install_result = adapter
        .install(&consumer_dir)
        .await
        .map_err(|e| PkglabError::InstallFailed(format!("{consumer_dir}: {e}")));
    guard.commit()?;
    install_result
}

/// Snapshots `consumer_dir`'s manifest and lockfile under the state store's
/// `backups/<consumer-hash>/` directory (§6, §9's backup-fidelity note).
/// Only called the first time a consumer registers; a later `add` of a
/// second package must not overwrite the original snapshot.
fn backup_consumer(store: &StateStore, consumer_dir: &Utf8Path, kind: PackageManagerKind) -> Result<(), PkglabError> {
    let backup_dir = store.consumer_backup_dir(consumer_dir);
    fs_err::create_dir_all(&backup_dir).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;

    let manifest_path = consumer_dir.join(pkglab_fs::MANIFEST_FILENAME);
    fs_err::copy(&manifest_path, backup_dir.join(pkglab_fs::MANIFEST_FILENAME))
        .map_err(|e| PkglabError::Other(anyhow::anyhow!("failed to back up {manifest_path}: {e}")))?;

    let lockfile_name = kind.lockfile_name();
    let lockfile_path = consumer_dir.join(lockfile_name);
    if lockfile_path.is_file() {
        fs_err::copy(&lockfile_path, backup_dir.join(lockfile_name))
            .map_err(|e| PkglabError::Other(anyhow::anyhow!("failed to back up {lockfile_path}: {e}")))?;
    }
    info!(%consumer_dir, "backed up manifest and lockfile");
    Ok(())
}

/// Restores `consumer_dir`'s manifest and lockfile from their backup and
/// de-registers it, for `repos reset` (§4.H, §9's "regeneration vs restore"
/// note: the lockfile must be restored byte-for-byte, never regenerated).
#[instrument(skip(store))]
pub fn reset(store: &StateStore, consumer_dir: &Utf8Path) -> Result<(), PkglabError> {
    let consumer_dir = canonicalize_best_effort(consumer_dir);
    let backup_dir = store.consumer_backup_dir(&consumer_dir);

    // Held for the entirety of this `reset` (§5): the read of which
    // package manager this consumer used and the final deregistration must
    // not straddle a gap another process could slip a mutation into.
    let mut guard = store.lock_exclusive()?;

    let package_manager = guard.catalog().consumers.get(&consumer_dir).map(|reg| reg.package_manager.clone());

    // A stale consumer's directory is already gone; there is nothing left to
    // restore, only the registration to drop. An error from here on simply
    // drops `guard` without committing, releasing the lock with the catalog
    // untouched.
    if consumer_dir.is_dir() {
        let manifest_backup = backup_dir.join(pkglab_fs::MANIFEST_FILENAME);
        if manifest_backup.is_file() {
            let contents =
                fs_err::read(&manifest_backup).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
            pkglab_fs::write_atomic(&consumer_dir.join(pkglab_fs::MANIFEST_FILENAME), &contents)
                .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        }

        if let Some(kind) = package_manager.as_deref().and_then(lockfile_name_for) {
            let lockfile_backup = backup_dir.join(kind);
            if lockfile_backup.is_file() {
                let contents =
                    fs_err::read(&lockfile_backup).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
                pkglab_fs::write_atomic(&consumer_dir.join(kind), &contents)
                    .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
            }
        }
    }

    guard.catalog_mut().consumers.remove(&consumer_dir);
    guard.commit()
}

fn lockfile_name_for(kind: &str) -> Option<&'static str> {
    match kind {
        "npm" => Some(PackageManagerKind::Npm.lockfile_name()),
        "yarn" => Some(PackageManagerKind::Yarn.lockfile_name()),
        "pnpm" => Some(PackageManagerKind::Pnpm.lockfile_name()),
        _ => None,
    }
}

/// Every registered consumer whose directory no longer exists on disk, for
/// `repos reset --stale` (§6).
pub fn stale_consumers(catalog: &Catalog) -> Vec<Utf8PathBuf> {
    catalog.consumers.keys().filter(|dir| !dir.is_dir()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pkglab_fs::DependencySection;
    use pkglab_test_fixtures::FakeConsumer;

    use super::*;
    use crate::state::StateStore;

    fn store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, StateStore::open(path))
    }

    fn register_with_backup(store: &StateStore, consumer: &FakeConsumer, original_version: &str) {
        let dir = canonicalize_best_effort(consumer.root());
        let backup_dir = store.consumer_backup_dir(&dir);
        fs_err::create_dir_all(&backup_dir).unwrap();
        fs_err::copy(dir.join("package.json"), backup_dir.join("package.json")).unwrap();
        fs_err::copy(dir.join("package-lock.json"), backup_dir.join("package-lock.json")).unwrap();

        store
            .with_exclusive(|catalog| {
                let mut pins = BTreeMap::new();
                pins.insert(
                    pin_key("left-pad", UNTAGGED),
                    Pin {
                        package: "left-pad".to_string(),
                        tag: UNTAGGED.to_string(),
                        version: "0.0.0-pkglab.1".to_string(),
                        section: DependencySection::Runtime,
                        original_version: Some(original_version.to_string()),
                    },
                );
                catalog.consumers.insert(
                    dir.clone(),
                    ConsumerRegistration { package_manager: "npm".to_string(), pins },
                );
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn reset_restores_the_backed_up_manifest_and_deregisters_the_consumer() {
        let (_tmp, store) = store();
        let consumer = FakeConsumer::new(&[("left-pad", "1.3.0", false)]);
        register_with_backup(&store, &consumer, "1.3.0");

        // Simulate `add` having overwritten the pin in place.
        let manifest_path = consumer.root().join("package.json");
        let mut manifest = Manifest::read(&manifest_path).unwrap();
        manifest.set_dependency(DependencySection::Runtime, "left-pad", "0.0.0-pkglab.1");
        manifest.write(&manifest_path).unwrap();

        reset(&store, consumer.root()).unwrap();

        let restored = Manifest::read(&manifest_path).unwrap();
        assert_eq!(restored.get_dependency("left-pad").unwrap().1, "1.3.0");

        let dir = canonicalize_best_effort(consumer.root());
        let still_registered = store.with_shared(|catalog| catalog.consumers.contains_key(&dir)).unwrap();
        assert!(!still_registered);
    }

    #[test]
    fn stale_consumers_finds_only_directories_that_no_longer_exist() {
        let (_tmp, store) = store();
        let live = FakeConsumer::empty();
        let gone = FakeConsumer::empty();
        register_with_backup(&store, &live, "1.0.0");
        register_with_backup(&store, &gone, "1.0.0");

        let gone_dir = canonicalize_best_effort(gone.root());
        fs_err::remove_dir_all(&gone_dir).unwrap();

        let stale = store.with_shared(stale_consumers).unwrap();
        assert_eq!(stale, vec![gone_dir]);
    }
}
