mod archive;
mod auth;
mod classify;
mod cli;
mod driver;
mod error;
mod models;
mod output;
mod poll;
mod providers;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting ci-runlog - CI/CD run log collector");
    cli.execute().await?;

    Ok(())
}
