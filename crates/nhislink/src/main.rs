// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! nhislink - NHIS health-data fetch orchestrator.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod link;
mod serve;

use clap::{Parser, Subcommand};

/// nhislink - NHIS health-data fetch orchestrator.
#[derive(Parser, Debug)]
#[command(name = "nhislink", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP gateway (default).
    Serve,
    /// Print the link status of a user as JSON.
    Status {
        /// Application user id.
        #[arg(long)]
        user: String,
    },
    /// Unlink a user and drop their cached fetches.
    Unlink {
        /// Application user id.
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match nhislink_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            nhislink_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Status { user } => link::run_status(&config, &user).await,
        Commands::Unlink { user } => link::run_unlink(&config, &user).await,
    };

    if let Err(e) = result {
        eprintln!("nhislink: {e}");
        std::process::exit(1);
    }
}
