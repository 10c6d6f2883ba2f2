use camino::Utf8PathBuf;
use pkglab_core::{StateStore, propagation};

use crate::args::Add;

pub async fn run(store: &StateStore, args: &Add) -> anyhow::Result<()> {
    let consumer_dir = match &args.consumer {
        Some(dir) => dir.clone(),
        None => Utf8PathBuf::try_from(std::env::current_dir()?)?,
    };
    let (package, tag) = args.package_and_tag();
    propagation::add(store, &consumer_dir, package, tag).await?;
    println!("added {}{}", package, tag.map(|t| format!("@{t}")).unwrap_or_default());
    Ok(())
}
