#![doc = include_str!("../README.md")]

mod cli;
mod commands;
mod types;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::verify::VerifyArgs;

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Verify {
            file,
            format,
            attacker,
            threads,
            max_depth,
            exhaustion_stage,
            exhaustive,
        } => {
            commands::verify::run_verify_command(VerifyArgs {
                file,
                format,
                attacker,
                threads,
                max_depth,
                exhaustion_stage,
                exhaustive,
            })?;
        }
        Commands::Check { file, format } => {
            commands::check::run_check_command(file, format)?;
        }
        Commands::Parse { file } => {
            commands::check::run_parse_command(file)?;
        }
    }
    Ok(())
}
