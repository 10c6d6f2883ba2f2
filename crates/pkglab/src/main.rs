mod args;
mod commands;
mod config;
mod log;

use clap::Parser;

use crate::args::CliArgs;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    if let Err(e) = run(args).await {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    log::init(args.verbosity()?.unwrap_or(tracing::level_filters::LevelFilter::INFO));
    args.command.run().await
}
