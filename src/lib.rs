//! epgx - convert XMLTV program guides into compact, searchable EPGX databases

pub mod cli;
pub mod export;
pub mod infra;
pub mod ingest;
pub mod storage;
pub mod validate;

use anyhow::Result;
use clap::Parser;

use cli::{
    Cli, Command,
    handlers::{handle_build, handle_jtv, handle_validate},
};

/// Main entry point for the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::Build(args) => handle_build(args),
        Command::Validate(args) => handle_validate(args),
        Command::Jtv(args) => handle_jtv(args),
    }
}
