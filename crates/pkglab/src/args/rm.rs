/// `rm NAME` (§6).
#[derive(clap::Parser, Debug)]
pub struct Rm {
    /// Package whose pin(s) should be removed.
    pub name: String,
    /// Consumer repository to unregister from. Defaults to the current directory.
    #[arg(long)]
    pub consumer: Option<camino::Utf8PathBuf>,
}
