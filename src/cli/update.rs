use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::DeployConfig;
use crate::orchestrator::UpdateOrchestrator;

/// Arguments for the `update` command.
///
/// Without flags, runs the full update sequence immediately (snapshot,
/// repository update, asset ensure pass, hooks), ignoring the cooldown —
/// this is the operator-driven equivalent of a general update request.
#[derive(Parser, Debug)]
pub struct UpdateArgs {
    /// Pin the working tree to a specific release tag instead of updating.
    ///
    /// Fetches tags from the remote and checks the tag out, leaving the
    /// device on an immutable release pin that later updates re-pin rather
    /// than advance.
    #[arg(long, value_name = "TAG")]
    pub tag: Option<String>,
}

/// Execute the `update` command.
pub async fn execute(args: UpdateArgs, config: DeployConfig) -> Result<()> {
    let orchestrator = UpdateOrchestrator::new(config);
    match args.tag {
        Some(tag) => {
            orchestrator.pin_tag(&tag).await?;
            println!("{}", format!("Pinned release tag {tag}").green());
        }
        None => {
            orchestrator.run().await?;
            println!("{}", "Update completed".green());
        }
    }
    Ok(())
}
