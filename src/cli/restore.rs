use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::DeployConfig;
use crate::restore::{RestoreAgent, RestoreScope};

/// Arguments for the `restore` command.
///
/// Scopes:
/// - `all [ARCH]` - every bundle, aggregating partial failures
/// - `arch [ARCH]` - the architecture-scoped bundles only
/// - a bundle name (e.g. `books`, `engines-aarch64`)
///
/// The architecture defaults to the host's. The command exits non-zero if
/// any requested restoration could not be satisfied, after attempting all
/// of them.
#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Restore scope: 'all', 'arch', or a bundle name
    #[arg(value_name = "SCOPE")]
    pub scope: String,

    /// Architecture override (aarch64 or x86_64)
    #[arg(value_name = "ARCH")]
    pub arch: Option<String>,
}

/// Execute the `restore` command.
pub async fn execute(args: RestoreArgs, config: DeployConfig) -> Result<()> {
    let scope = RestoreScope::parse(&args.scope, args.arch.as_deref())?;
    let agent = RestoreAgent::new(config);
    let report = agent.restore_scope(&scope).await?;

    for name in &report.restored {
        println!("{} {name}", "Restored".green());
    }
    for name in &report.missing {
        println!("{} {name} (no backup available)", "Missing".yellow());
    }
    report.into_result().map(|_| ())
}
