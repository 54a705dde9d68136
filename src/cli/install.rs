use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::bundles::{BundleClass, Variant};
use crate::config::DeployConfig;
use crate::installer::AssetInstaller;

/// Arguments for the `install` command.
///
/// Installs the asset bundles for a variant. Bundles whose destination
/// directory already exists are skipped; pass `--refresh` to relocate the
/// live copies into the vault first and force a re-fetch.
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Variant to install: 'small' (engines, weights, scripts) or 'lite'
    /// (additionally emulation, auxiliary engines, replay audio)
    #[arg(value_name = "VARIANT")]
    pub variant: Variant,

    /// Stash live bundles into the vault first, forcing a re-fetch
    #[arg(long)]
    pub refresh: bool,

    /// Operate on the book/game bundles instead of the engine bundles
    #[arg(long)]
    pub books_games: bool,
}

/// Execute the `install` command.
pub async fn execute(args: InstallArgs, config: DeployConfig) -> Result<()> {
    // Architecture check happens before any network activity
    let installer = AssetInstaller::new(config)?;

    let class = if args.books_games {
        BundleClass::BooksGames
    } else {
        BundleClass::Engines
    };
    let report = if args.refresh {
        installer.refresh_class(class, args.variant).await?
    } else if args.books_games {
        installer.install_books_games().await?
    } else {
        installer.install_variant(args.variant).await?
    };

    for name in &report.installed {
        println!("{} {name}", "Installed".green());
    }
    for name in &report.skipped {
        println!("{} {name} (already present)", "Skipped".cyan());
    }
    Ok(())
}
