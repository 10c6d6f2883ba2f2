use camino::Utf8PathBuf;
use pkglab_core::installed_pkglab_artifacts;

pub fn run() -> anyhow::Result<()> {
    let dir = Utf8PathBuf::try_from(std::env::current_dir()?)?;
    let found = installed_pkglab_artifacts(&dir)?;
    if found.is_empty() {
        println!("no pkglab-published artifacts installed");
        return Ok(());
    }
    for artifact in &found {
        println!("{artifact}");
    }
    anyhow::bail!("{} pkglab-published artifact(s) installed", found.len());
}
