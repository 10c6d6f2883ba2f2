use pkglab_core::{DEFAULT_REGISTRY_PORT, PkglabError, RegistryControl, RegistryState, StateStore, VerdaccioRegistry};

pub async fn run(store: &StateStore) -> anyhow::Result<()> {
    let registry = VerdaccioRegistry::new(store.registry_dir(), DEFAULT_REGISTRY_PORT);

    // Held across the spawn/health-wait below, not just around the read and
    // the final write: a concurrent `up`/`down` serializes against this one
    // instead of racing it (§5).
    let mut guard = store.lock_exclusive()?;
    let existing = guard.catalog().registry.clone();
    let handle = registry.up(existing.as_ref()).await?;
    guard.catalog_mut().registry = Some(handle.clone());
    guard.commit()?;

    match handle.state {
        RegistryState::Running => {
            println!("registry running at {}", handle.base_url());
            Ok(())
        }
        other => Err(PkglabError::RegistryDown(format!(
            "registry on port {} did not become healthy (state: {other:?})",
            handle.port
        ))
        .into()),
    }
}
