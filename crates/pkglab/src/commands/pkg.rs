use pkglab_core::StateStore;

pub fn ls(store: &StateStore) -> anyhow::Result<()> {
    let entries = store.with_shared(|catalog| {
        catalog
            .published
            .iter()
            .map(|(key, entry)| {
                let (package, tag) = key.split_once('\u{0}').expect("pin_key always contains NUL");
                (package.to_string(), tag.to_string(), entry.version.clone())
            })
            .collect::<Vec<_>>()
    })?;

    if entries.is_empty() {
        println!("no published packages");
        return Ok(());
    }
    for (package, tag, version) in entries {
        println!("{package} {tag} {version}");
    }
    Ok(())
}
