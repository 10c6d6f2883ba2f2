use camino::Utf8PathBuf;
use pkglab_core::{LOCAL_REGISTRY_TOKEN, PkglabError, PublishRequest, StateStore, publish};

use crate::args::Publish;
use crate::config::Config;

pub async fn run(store: &StateStore, args: &Publish) -> anyhow::Result<()> {
    let producer_dir = match &args.producer {
        Some(dir) => dir.clone(),
        None => Utf8PathBuf::try_from(std::env::current_dir()?)?,
    };
    let config = Config::load(&producer_dir)?;

    let registry_url = store
        .with_shared(|catalog| catalog.registry.clone())?
        .ok_or_else(|| PkglabError::RegistryDown("run `pkglab up` first".to_string()))?
        .base_url();

    let tag = args.tag.as_deref().or(config.workspace.default_tag.as_deref());
    let concurrency = args.concurrency.or(config.workspace.concurrency);

    let mut request = PublishRequest::new(&producer_dir)
        .with_selector(args.name.as_deref())
        .with_tag(tag)
        .with_worktree(args.worktree);
    if let Some(concurrency) = concurrency {
        request = request.with_concurrency(concurrency);
    }

    let outcome = publish(store, &registry_url, LOCAL_REGISTRY_TOKEN, request).await?;

    for package in &outcome.published {
        println!("{}@{} [{}]", package.name, package.version, outcome.tag);
    }
    println!("{} packages", outcome.published.len());

    if !outcome.propagation.install_failures.is_empty() {
        for (dir, error) in &outcome.propagation.install_failures {
            tracing::warn!(%dir, %error, "install failed while propagating");
        }
        // Pins and catalog are already committed at this point; the failure
        // only needs to surface in the exit code, not roll anything back
        // (§7: InstallFailed is not fatal to the publish itself).
        let failing = outcome.propagation.install_failures.iter().map(|(dir, _)| dir.as_str()).collect::<Vec<_>>().join(", ");
        return Err(PkglabError::InstallFailed(failing).into());
    }

    Ok(())
}
