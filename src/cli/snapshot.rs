use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::backup::BackupStore;
use crate::config::DeployConfig;
use crate::git::GitRepo;

/// Arguments for the `snapshot` command.
///
/// Refreshes the rolling snapshot on operator demand, subject to the same
/// repository-state gate as the automatic snapshot: a development branch
/// never becomes the rollback target.
#[derive(Parser, Debug)]
pub struct SnapshotArgs {}

/// Execute the `snapshot` command.
pub async fn execute(_args: SnapshotArgs, config: DeployConfig) -> Result<()> {
    crate::git::ensure_git_available()?;
    let repo = GitRepo::new(&config.paths.app_root);
    let state = repo.classify(&config.repository.branch).await?;
    BackupStore::new(config).snapshot(&state).await?;
    println!("{}", format!("Snapshot refreshed ({state})").green());
    Ok(())
}
