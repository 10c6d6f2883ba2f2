use pkglab_core::{DEFAULT_REGISTRY_PORT, RegistryControl, RegistryState, StateStore, VerdaccioRegistry};

pub async fn run(store: &StateStore) -> anyhow::Result<()> {
    // Held across the SIGTERM/grace-period wait below, per §5.
    let mut guard = store.lock_exclusive()?;
    let Some(mut handle) = guard.catalog().registry.clone() else {
        guard.discard();
        println!("registry is not running");
        return Ok(());
    };

    handle.state = RegistryState::Stopping;
    guard.catalog_mut().registry = Some(handle.clone());
    guard.flush()?;

    let registry = VerdaccioRegistry::new(store.registry_dir(), DEFAULT_REGISTRY_PORT);
    registry.down(&handle).await?;

    guard.catalog_mut().registry = None;
    guard.commit()?;
    println!("registry stopped");
    Ok(())
}
