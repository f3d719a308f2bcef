//! Command-line interface for Weathervane
//!
//! Subcommands:
//! - `start` — validate the environment and run the gateway
//! - `check-env` — validate the environment and print the results
//! - `env-example` — print an annotated sample `.env` file

use crate::env;
use crate::server;
use clap::{Parser, Subcommand};
use tracing::error;

///////////////////////////////////////////////////////////////////////////////
//****                         Public Structs                            ****//
///////////////////////////////////////////////////////////////////////////////

#[derive(Parser)]
#[command(name = "weathervane")]
#[command(about = "A rate-limited, cache-fronted weather proxy gateway")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Start,
    /// Validate environment variables and print the results
    CheckEnv,
    /// Print an annotated sample environment configuration
    EnvExample,
}

///////////////////////////////////////////////////////////////////////////////
//****                       Public Functions                            ****//
///////////////////////////////////////////////////////////////////////////////

/// Parse arguments and dispatch; `start` is the default when no subcommand
/// is given.
pub async fn run() {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Start) {
        Commands::Start => {
            let config = env::get_config();
            if let Err(e) = server::start_server(config).await {
                error!("Server error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::CheckEnv => {
            let result = env::validate_environment();
            let failed = result.is_err();
            env::print_validation_results(&result);
            if failed {
                std::process::exit(1);
            }
        }
        Commands::EnvExample => {
            println!("{}", env::generate_env_example());
        }
    }
}
