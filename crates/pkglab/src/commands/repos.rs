use camino::Utf8PathBuf;
use pkglab_core::{StateStore, propagation};

use crate::args::{Reset, ReposCommand};

pub async fn run(store: &StateStore, cmd: ReposCommand) -> anyhow::Result<()> {
    match cmd {
        ReposCommand::Ls => ls(store),
        ReposCommand::Reset(args) => reset(store, &args),
    }
}

fn ls(store: &StateStore) -> anyhow::Result<()> {
    let dirs = store.with_shared(|catalog| catalog.consumers.keys().cloned().collect::<Vec<_>>())?;
    if dirs.is_empty() {
        println!("No linked repos");
        return Ok(());
    }
    for dir in dirs {
        println!("{dir}");
    }
    Ok(())
}

fn reset(store: &StateStore, args: &Reset) -> anyhow::Result<()> {
    if args.all {
        let dirs = store.with_shared(|catalog| catalog.consumers.keys().cloned().collect::<Vec<_>>())?;
        for dir in dirs {
            if !dir.is_dir() {
                println!("Skipping {dir}");
                continue;
            }
            propagation::reset(store, &dir)?;
            println!("Reset {dir}");
        }
        return Ok(());
    }

    if args.stale {
        let stale = store.with_shared(propagation::stale_consumers)?;
        for dir in stale {
            propagation::reset(store, &dir)?;
            println!("Removed stale {dir}");
        }
        return Ok(());
    }

    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => Utf8PathBuf::try_from(std::env::current_dir()?)?,
    };
    let dir = pkglab_fs::canonicalize_best_effort(&dir);
    let registered = store.with_shared(|catalog| catalog.consumers.contains_key(&dir))?;
    if !registered {
        println!("Skipping {dir} (not registered)");
        return Ok(());
    }
    propagation::reset(store, &dir)?;
    println!("Reset {dir}");
    Ok(())
}
