mod add;
mod completions;
mod publish;
mod repos;
mod rm;

use clap::builder::{Styles, styling::AnsiColor};
use tracing::level_filters::LevelFilter;

pub use self::{
    add::Add, completions::Completions, publish::Publish, repos::{Reset, ReposCommand},
    rm::Rm,
};

const MAIN_COLOR: AnsiColor = AnsiColor::Red;
const SECONDARY_COLOR: AnsiColor = AnsiColor::Yellow;
const HELP_STYLES: Styles = Styles::styled()
    .header(MAIN_COLOR.on_default().bold())
    .usage(MAIN_COLOR.on_default().bold())
    .placeholder(SECONDARY_COLOR.on_default())
    .literal(SECONDARY_COLOR.on_default());

/// pkglab keeps consumer repositories in sync with a producer monorepo
/// through a local package registry, without ever touching a committed
/// manifest with a filesystem path.
#[derive(clap::Parser, Debug)]
#[command(version, author, styles = HELP_STYLES)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
    /// Print source location and additional information in logs.
    ///
    /// If this option is unspecified, logs are printed at the INFO level without verbosity.
    /// `-v` adds verbosity to logs.
    /// `-vv` adds verbosity and sets the log level to DEBUG.
    /// `-vvv` adds verbosity and sets the log level to TRACE.
    /// To change the log level without setting verbosity, use the `PKGLAB_LOG`
    /// environment variable. E.g. `PKGLAB_LOG=DEBUG`.
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
    )]
    verbose: u8,
}

impl CliArgs {
    pub fn verbosity(&self) -> anyhow::Result<Option<LevelFilter>> {
        let level = match self.verbose {
            0 => None,
            1 => Some(LevelFilter::INFO),
            2 => Some(LevelFilter::DEBUG),
            3 => Some(LevelFilter::TRACE),
            _ => anyhow::bail!("invalid verbosity level. Use -v, -vv, or -vvv."),
        };
        Ok(level)
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Start the local registry (idempotent).
    Up,
    /// Stop the local registry.
    Down,
    /// Publish changed packages in the selector's dependency closure.
    ///
    /// With no package name, publishes every changed package in the
    /// producer workspace. `-t`/`-w` are mutually exclusive.
    #[command(name = "pub")]
    Publish(Publish),
    /// Register a consumer's pin on a published package and install it.
    ///
    /// `SPEC` is `name` or `name@tag`.
    Add(Add),
    /// Remove a pin and restore the dependency's original manifest entry.
    Rm(Rm),
    /// Exit non-zero if the current directory has installed artifacts
    /// published by this system.
    Check,
    /// List published packages, or registered consumer repositories.
    #[command(subcommand)]
    Pkg(PkgCommand),
    /// List or reset registered consumer repositories.
    #[command(name = "repos", subcommand)]
    Repos(ReposCommand),
    /// Generate command autocompletions for various shells.
    #[command(alias = "generate-completions")]
    Completions(Completions),
}

#[derive(clap::Subcommand, Debug)]
pub enum PkgCommand {
    /// List all published `(package, tag, version)` triples.
    Ls,
}
