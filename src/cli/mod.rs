//! Command-line interface for Gambit.
//!
//! Each subcommand is implemented in its own module with its own argument
//! struct and execution logic:
//!
//! - `run` - consume a pending update request (what the timer invokes)
//! - `update` - run the full update flow immediately, or pin a release tag
//! - `install` - install asset bundles for a variant
//! - `restore` - roll asset bundles back from the vault
//! - `snapshot` - refresh the rolling backup snapshot
//!
//! Global options control verbosity and the configuration file location.
//! Logging goes to stderr and, when configured, to the append-only device
//! log so the operator can reconstruct what every timer invocation did.

mod install;
mod restore;
mod run;
mod snapshot;
mod update;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DeployConfig;

/// Main CLI structure for Gambit.
///
/// Global options are available to all subcommands. Verbosity flags map to
/// tracing filter levels; `RUST_LOG` overrides both when set.
#[derive(Parser)]
#[command(
    name = "gambit",
    about = "Self-updating deployment orchestrator for chess appliance devices",
    version,
    long_about = "Gambit keeps the appliance software repository and its asset bundles \
                  (engines, neural-network weights, books, games, audio) current, with \
                  rolling backups and automatic rollback of failed asset installs."
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the deployment configuration file.
    ///
    /// Defaults to $GAMBIT_CONFIG, then /etc/gambit/config.toml.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Consume a pending update request (timer-invoked)
    Run(run::RunArgs),

    /// Run the full update flow immediately
    Update(update::UpdateArgs),

    /// Install asset bundles for a variant
    Install(install::InstallArgs),

    /// Roll asset bundles back to their last good copy
    Restore(restore::RestoreArgs),

    /// Refresh the rolling backup snapshot
    Snapshot(snapshot::SnapshotArgs),
}

impl Cli {
    /// Load configuration, set up logging, and execute the subcommand.
    pub async fn execute(self) -> Result<()> {
        let config = DeployConfig::load(self.config.as_deref())?;
        init_logging(self.verbose, self.quiet, config.paths.log_file.as_deref());

        match self.command {
            Commands::Run(args) => run::execute(args, config).await,
            Commands::Update(args) => update::execute(args, config).await,
            Commands::Install(args) => install::execute(args, config).await,
            Commands::Restore(args) => restore::execute(args, config).await,
            Commands::Snapshot(args) => snapshot::execute(args, config).await,
        }
    }
}

/// Initialize tracing: stderr always, plus the append-only device log when
/// one is configured and writable.
fn init_logging(verbose: bool, quiet: bool, log_file: Option<&std::path::Path>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = log_file.and_then(|path| {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::OpenOptions::new().create(true).append(true).open(path).ok().map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(std::sync::Arc::new(file))
        })
    });

    // try_init: a second call (e.g. in-process tests) is harmless
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}
