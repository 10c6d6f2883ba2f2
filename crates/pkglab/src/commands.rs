mod add;
mod check;
mod down;
mod pkg;
mod publish;
mod repos;
mod rm;
mod up;

use pkglab_core::StateStore;

use crate::args::{Command, PkgCommand};

impl Command {
    pub async fn run(self) -> anyhow::Result<()> {
        let store = StateStore::default_location()?;
        match self {
            Command::Up => up::run(&store).await?,
            Command::Down => down::run(&store).await?,
            Command::Publish(args) => publish::run(&store, &args).await?,
            Command::Add(args) => add::run(&store, &args).await?,
            Command::Rm(args) => rm::run(&store, &args).await?,
            Command::Check => check::run()?,
            Command::Pkg(PkgCommand::Ls) => pkg::ls(&store)?,
            Command::Repos(cmd) => repos::run(&store, cmd).await?,
            Command::Completions(args) => args.run(),
        }
        Ok(())
    }
}
