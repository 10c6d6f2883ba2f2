/// `pub [NAME] [-t TAG | -w]` (§4.F, §6).
#[derive(clap::Parser, Debug)]
pub struct Publish {
    /// Package to publish, together with its ancestors and descendants in
    /// the dependency graph. Omit to publish every changed package.
    pub name: Option<String>,
    /// Tag to publish under. Defaults to the untagged channel.
    #[arg(short = 't', long, conflicts_with = "worktree")]
    pub tag: Option<String>,
    /// Derive the tag from the producer's current git branch.
    #[arg(short = 'w', long, conflicts_with = "tag")]
    pub worktree: bool,
    /// Producer workspace root. Defaults to the current directory.
    #[arg(long)]
    pub producer: Option<camino::Utf8PathBuf>,
    /// Maximum number of packages packed and published concurrently.
    /// Defaults to `pkglab.toml`'s `workspace.concurrency`, or 4.
    #[arg(long)]
    pub concurrency: Option<usize>,
}
