//! notesync - keep plain text notes on disk and in sync with a remote store
//!
//! Quick capture from the terminal, filtering, tagging and an explicit
//! sync command against a shared directory acting as the remote.

mod cli;
mod commands;
mod config;
mod error;


use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;
use crate::error::CliError;

fn main() {
    if let Err(error) = run() {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn init_tracing() -> Result<(), CliError> {
    let directive = "notesync=info"
        .parse()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn run() -> Result<(), CliError> {
    init_tracing()?;

    let cli = Cli::parse();

    if let Some(Commands::Config { command }) = &cli.command {
        return commands::run_config(command, cli.db_path.clone(), cli.remote_dir.clone());
    }

    let config = CliConfig::load().map_err(CliError::Config)?;
    let settings = config.settings(cli.db_path, cli.remote_dir);

    match cli.command {
        Some(Commands::Add { content }) => commands::run_add(&content, &settings),
        Some(Commands::List { query, limit, json }) => {
            commands::run_list(query.as_deref(), limit, json, &settings)
        }
        Some(Commands::Show { key }) => commands::run_show(&key, &settings),
        Some(Commands::Edit { key }) => commands::run_edit(&key, &settings),
        Some(Commands::Tag { command }) => commands::run_tag(&command, &settings),
        Some(Commands::Pin { key }) => commands::run_pin(&key, true, &settings),
        Some(Commands::Unpin { key }) => commands::run_pin(&key, false, &settings),
        Some(Commands::Delete { key }) => commands::run_delete(&key, &settings),
        Some(Commands::Status { key, json }) => commands::run_status(&key, json, &settings),
        Some(Commands::Sync { full }) => commands::run_sync(full, &settings),
        Some(Commands::Config { .. }) => Ok(()),
        None => {
            if cli.note.is_empty() {
                Cli::command().print_help()?;
                println!();
                Ok(())
            } else {
                commands::run_add(&cli.note, &settings)
            }
        }
    }
}
