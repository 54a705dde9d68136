use anyhow::Result;
use clap::Parser;

use crate::config::DeployConfig;
use crate::runner::FlagRunner;

/// Arguments for the `run` command.
///
/// This is the entry point the systemd timer invokes every few minutes.
/// It exits successfully when there is nothing to do (no pending request,
/// request inside the cooldown, another invocation already running) and
/// propagates the dispatched action's failure otherwise.
#[derive(Parser, Debug)]
pub struct RunArgs {}

/// Execute the `run` command.
pub async fn execute(_args: RunArgs, config: DeployConfig) -> Result<()> {
    FlagRunner::new(config).run().await.map(|_| ())
}
