use clap::Parser;

mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod services;
mod templating;
mod ui;

use cli::{Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging with LOGGING env var support
    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "warn".to_string()
            }
        });

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false)
        .init();

    if let Err(error) = run(cli).await {
        eprintln!("[ERROR] [{}]: {}", error.code(), error);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            commands::version::execute();
            Ok(())
        }
        Commands::Validate { scope } => commands::validate::execute(&scope.scope, scope.update).await,
        Commands::Plan { scope } => commands::plan::execute(&scope.scope, scope.update).await,
        Commands::Apply {
            scope,
            auto_approve,
        } => commands::apply::execute(&scope.scope, scope.update, auto_approve).await,
        Commands::Destroy {
            scope,
            auto_approve,
        } => commands::destroy::execute(&scope.scope, auto_approve).await,
    }
}
