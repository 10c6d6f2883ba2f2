use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use pkglab_fs::DependencySection;
use serde::{Deserialize, Serialize};

use crate::error::PkglabError;
use crate::registry::RegistryHandle;

pub const SCHEMA_VERSION: u32 = 1;

const LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A `(consumer, package, tag)` binding, per §3. Keyed within
/// [`ConsumerRegistration::pins`] by [`pin_key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pin {
    pub package: String,
    pub tag: String,
    pub version: String,
    pub section: DependencySection,
    /// The dependency's version string before pkglab first touched it, or
    /// `None` if pkglab introduced the entry. `rm` restores this (or deletes
    /// the entry outright) rather than leaving pkglab's version behind.
    pub original_version: Option<String>,
}

/// `(absolute dir, package-manager kind, set of pins)`, per §3. Backups of
/// the original manifest/lockfile live on disk under the state store's
/// `backups/<consumer-hash>/` directory (§6), not inline here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerRegistration {
    pub package_manager: String,
    pub pins: BTreeMap<String, Pin>,
}

impl ConsumerRegistration {
    /// Identifies a consumer's backup directory by the hash of its
    /// canonicalized absolute path, per §6 (`backups/<consumer-hash>/`).
    pub fn backup_key(dir: &Utf8Path) -> String {
        use blake2::Digest as _;
        let mut hasher = blake2::Blake2s256::new();
        hasher.update(dir.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// The latest published `(version, fingerprint, timestamp)` for a
/// `(package, tag)` pair, per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedEntry {
    pub version: String,
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
}

/// Process-wide persisted state: producer workspaces, consumer
/// registrations, and per-`(package, tag)` published entries, per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub schema_version: u32,
    pub producers: BTreeSet<Utf8PathBuf>,
    pub consumers: BTreeMap<Utf8PathBuf, ConsumerRegistration>,
    pub published: BTreeMap<String, PublishedEntry>,
    pub registry: Option<RegistryHandle>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            producers: BTreeSet::new(),
            consumers: BTreeMap::new(),
            published: BTreeMap::new(),
            registry: None,
        }
    }
}

/// Combines a package name and tag into the string key used in
/// [`Catalog::published`] and [`ConsumerRegistration::pins`]. `\u{0}` can't
/// appear in either a package name or a sanitized tag, so the join is
/// unambiguous to split back apart if ever needed.
pub fn pin_key(package: &str, tag: &str) -> String {
    format!("{package}\u{0}{tag}")
}

impl Catalog {
    pub fn last_published(&self, package: &str, tag: &str) -> Option<&PublishedEntry> {
        self.published.get(&pin_key(package, tag))
    }
}

/// Owns the `$HOME/.pkglab/` directory: `catalog.json`, the advisory lock
/// that serializes all mutation (§5), `registry/`, and `backups/`.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: Utf8PathBuf,
}

impl StateStore {
    pub fn open(dir: Utf8PathBuf) -> Self {
        Self { dir }
    }

    /// The default location, `$HOME/.pkglab`, per §6.
    pub fn default_location() -> Result<Self, PkglabError> {
        let home = dirs::home_dir()
            .ok_or_else(|| PkglabError::Other(anyhow::anyhow!("could not determine home directory")))?;
        let home = Utf8PathBuf::try_from(home).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        Ok(Self::open(home.join(".pkglab")))
    }

    pub fn registry_dir(&self) -> Utf8PathBuf {
        self.dir.join("registry")
    }

    pub fn backups_dir(&self) -> Utf8PathBuf {
        self.dir.join("backups")
    }

    pub fn consumer_backup_dir(&self, consumer_dir: &Utf8Path) -> Utf8PathBuf {
        self.backups_dir().join(ConsumerRegistration::backup_key(consumer_dir))
    }

    fn catalog_path(&self) -> Utf8PathBuf {
        self.dir.join("catalog.json")
    }

    fn lock_path(&self) -> Utf8PathBuf {
        self.dir.join("catalog.json.lock")
    }

    /// Acquires the exclusive catalog lock and loads the catalog behind it.
    /// The lock is held for as long as the returned guard lives, so a caller
    /// with async work to do in between — spawning the registry, running
    /// `install`, packing and publishing — holds it across every `.await`
    /// rather than releasing and re-acquiring around them, per §5: the lock
    /// must cover the entirety of any publish pipeline run, any
    /// `add`/`rm`/`reset`, and registry supervisor transitions.
    pub fn lock_exclusive(&self) -> Result<ExclusiveGuard, PkglabError> {
        fs_err::create_dir_all(&self.dir).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        let lock_file =
            fs_err::File::create(self.lock_path()).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        self.acquire(lock_file.file(), true)?;
        let catalog = self.load()?;
        Ok(ExclusiveGuard { store: self.clone(), lock_file, catalog })
    }

    /// Acquires the shared catalog lock and loads a read-only snapshot
    /// behind it, for `pkg ls`/`repos ls` (§5).
    pub fn lock_shared(&self) -> Result<SharedGuard, PkglabError> {
        fs_err::create_dir_all(&self.dir).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        let lock_file =
            fs_err::File::create(self.lock_path()).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        self.acquire(lock_file.file(), false)?;
        let catalog = self.load()?;
        Ok(SharedGuard { lock_file, catalog })
    }

    /// Convenience wrapper around [`Self::lock_exclusive`] for operations
    /// that mutate the catalog synchronously and commit (or roll back)
    /// immediately, without holding the lock across any `.await`.
    pub fn with_exclusive<T>(
        &self,
        f: impl FnOnce(&mut Catalog) -> Result<T, PkglabError>,
    ) -> Result<T, PkglabError> {
        let mut guard = self.lock_exclusive()?;
        match f(guard.catalog_mut()) {
            Ok(value) => {
                guard.commit()?;
                Ok(value)
            }
            Err(e) => {
                guard.discard();
                Err(e)
            }
        }
    }

    /// Convenience wrapper around [`Self::lock_shared`] for read-only access
    /// that doesn't need to hold the lock across any `.await`.
    pub fn with_shared<T>(&self, f: impl FnOnce(&Catalog) -> T) -> Result<T, PkglabError> {
        let guard = self.lock_shared()?;
        Ok(f(guard.catalog()))
    }

    fn acquire(&self, file: &std::fs::File, exclusive: bool) -> Result<(), PkglabError> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            let acquired =
                if exclusive { file.try_lock_exclusive() } else { file.try_lock_shared() };
            match acquired {
                Ok(()) => return Ok(()),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(_) => {
                    return Err(PkglabError::Busy(format!(
                        "timed out after {LOCK_TIMEOUT:?} waiting for catalog lock"
                    )));
                }
            }
        }
    }

    fn load(&self) -> Result<Catalog, PkglabError> {
        let path = self.catalog_path();
        if !path.is_file() {
            return Ok(Catalog::default());
        }
        let raw = fs_err::read_to_string(&path).map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        let catalog: Catalog = serde_json::from_str(&raw)
            .map_err(|e| PkglabError::StateCorrupt(format!("{path}: {e}")))?;
        if catalog.schema_version != SCHEMA_VERSION {
            return Err(PkglabError::StateCorrupt(format!(
                "{path}: schema version {} does not match supported version {SCHEMA_VERSION}",
                catalog.schema_version
            )));
        }
        Ok(catalog)
    }

    fn save(&self, catalog: &Catalog) -> Result<(), PkglabError> {
        let mut json = serde_json::to_vec_pretty(catalog)
            .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))?;
        json.push(b'\n');
        pkglab_fs::write_atomic(&self.catalog_path(), &json)
            .map_err(|e| PkglabError::Other(anyhow::anyhow!(e)))
    }
}

/// A held exclusive lock on the catalog, with the snapshot loaded behind it.
/// Dropping the guard releases the lock without persisting anything;
/// [`Self::flush`]/[`Self::commit`] write the current in-memory catalog back
/// to disk.
#[derive(Debug)]
pub struct ExclusiveGuard {
    store: StateStore,
    lock_file: fs_err::File,
    catalog: Catalog,
}

impl ExclusiveGuard {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Persists the current catalog contents without releasing the lock, for
    /// operations that need an intermediate mutation to survive a crash
    /// before continuing under the same lock (e.g. committing a pin before
    /// running `install`).
    pub fn flush(&self) -> Result<(), PkglabError> {
        self.store.save(&self.catalog)
    }

    /// Persists the catalog one final time and releases the lock.
    pub fn commit(self) -> Result<(), PkglabError> {
        self.flush()
    }

    /// Releases the lock without persisting any mutation made through
    /// [`Self::catalog_mut`] since the last [`Self::flush`].
    pub fn discard(self) {}
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.lock_file.file());
    }
}

/// A held shared lock on the catalog, with a read-only snapshot loaded
/// behind it. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct SharedGuard {
    lock_file: fs_err::File,
    catalog: Catalog,
}

impl SharedGuard {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl Drop for SharedGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(self.lock_file.file());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap());

        store
            .with_exclusive(|catalog| {
                catalog.producers.insert(Utf8PathBuf::from("/producer"));
                Ok(())
            })
            .unwrap();

        let producers = store.with_shared(|catalog| catalog.producers.clone()).unwrap();
        assert!(producers.contains(&Utf8PathBuf::from("/producer")));
    }

    #[test]
    fn a_failing_mutation_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap());

        let result = store.with_exclusive(|catalog| {
            catalog.producers.insert(Utf8PathBuf::from("/producer"));
            Err(PkglabError::Busy("simulated failure".to_string()))
        });
        assert!(result.is_err());

        let producers = store.with_shared(|catalog| catalog.producers.clone()).unwrap();
        assert!(producers.is_empty());
    }

    #[test]
    fn rejects_a_mismatched_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs_err::write(dir.join("catalog.json"), r#"{"schemaVersion":99,"producers":[],"consumers":{},"published":{},"registry":null}"#).unwrap();
        let store = StateStore::open(dir);

        let err = store.with_shared(|_| ()).unwrap_err();
        assert!(matches!(err, PkglabError::StateCorrupt(_)));
    }

    #[test]
    fn pin_key_round_trips_distinctly_per_tag() {
        assert_ne!(pin_key("@acme/a", "(untagged)"), pin_key("@acme/a", "feat1"));
    }
}
