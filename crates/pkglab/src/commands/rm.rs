use camino::Utf8PathBuf;
use pkglab_core::{StateStore, propagation};

use crate::args::Rm;

pub async fn run(store: &StateStore, args: &Rm) -> anyhow::Result<()> {
    let consumer_dir = match &args.consumer {
        Some(dir) => dir.clone(),
        None => Utf8PathBuf::try_from(std::env::current_dir()?)?,
    };
    propagation::remove(store, &consumer_dir, &args.name).await?;
    println!("removed {}", args.name);
    Ok(())
}
