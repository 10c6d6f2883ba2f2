/// `repos ls` / `repos reset [DIR | --all | --stale]` (§6).
#[derive(clap::Subcommand, Debug)]
pub enum ReposCommand {
    /// List registered consumer repositories.
    Ls,
    /// Restore a consumer's original manifest/lockfile and unregister it.
    Reset(Reset),
}

#[derive(clap::Parser, Debug)]
pub struct Reset {
    /// Consumer repository to reset. Defaults to the current directory.
    pub dir: Option<camino::Utf8PathBuf>,
    /// Reset every registered consumer.
    #[arg(long, conflicts_with_all = ["dir", "stale"])]
    pub all: bool,
    /// Reset only consumers whose directory no longer exists.
    #[arg(long, conflicts_with_all = ["dir", "all"])]
    pub stale: bool,
}
