//! Gambit CLI entry point
//!
//! This is the main executable for the Gambit deployment orchestrator.
//! It handles command-line argument parsing, error display, and command
//! execution.
//!
//! The CLI supports the operations needed to keep an appliance current:
//! - `run` - consume a pending update request (timer-invoked)
//! - `update` - run the full update flow immediately
//! - `install` - install asset bundles for a variant
//! - `restore` - roll asset bundles back to their last good copy
//! - `snapshot` - refresh the rolling backup snapshot

use anyhow::Result;
use clap::Parser;
use gambit_cli::cli;
use gambit_cli::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Execute the command
    match cli.execute().await {
        Ok(_) => Ok(()),
        Err(e) => {
            // Convert to a user-friendly error with context and suggestions
            let error_ctx = user_friendly_error(e);
            let code = error_ctx.exit_code();
            error_ctx.display();
            std::process::exit(code);
        }
    }
}
