//! Drydock CLI - a dependency-aware module and build database manager

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::Session;
use drydock::util::diagnostic::{emit, normalize_message};
use drydock::util::errors::DbError;

fn main() {
    let verbose = std::env::args().any(|a| a == "-v" || a == "--verbose");
    if let Err(e) = run() {
        eprintln!("error: {}", normalize_message(&format!("{:#}", e)));
        if verbose {
            if let Some(db_error) = e.downcast_ref::<DbError>() {
                emit(&db_error.to_diagnostic());
            }
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Completions need neither configuration nor logging
    if let Commands::Completions(args) = &cli.command {
        return commands::completions::execute(args);
    }

    let session = Session::from_cli(&cli)?;

    // Set up logging
    let filter = if session.ctx.is_verbose() {
        EnvFilter::new("drydock=debug")
    } else {
        EnvFilter::new("drydock=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // Execute command
    match cli.command {
        Commands::Db(args) => commands::db::execute(&session, args),
        Commands::Build(args) => commands::build::execute(&session, args),
        Commands::Spec(args) => commands::spec::execute(&session, args),
        Commands::Config(args) => commands::config::execute(&session, args),
        Commands::Completions(args) => commands::completions::execute(&args),
    }
}
