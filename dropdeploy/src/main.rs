mod cli;
mod config;
mod ops;
mod retention;
mod store;
mod uploader;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let opts = config::resolve(cli.config.as_deref(), cli.overrides())?;

    let default_level = if opts.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.parse()?))
        .init();
    if opts.debug {
        debug!("debug logging enabled");
    }

    let store = store::from_options(&opts)?;

    match cli.command {
        Command::Deploy => ops::deploy(&opts, store.as_ref()).await?,
        Command::Download => ops::download(&opts, store.as_ref()).await?,
        Command::Prune => ops::prune(&opts, store.as_ref()).await?,
        Command::Exists => {
            if ops::exists(&opts, store.as_ref()).await? != 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
