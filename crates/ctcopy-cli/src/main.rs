//! # ctcopy
//!
//! Copies, snapshots and renames system containers, and starts ephemeral
//! copies with extra mounts that disappear once they stop.

mod commands;
mod logging;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log)?;
    commands::execute(cli)
}
