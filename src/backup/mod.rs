//! The rolling working-tree snapshot.
//!
//! The device keeps exactly one snapshot — no history. Each refresh
//! overwrites the previous generation, and the snapshot deliberately
//! excludes the large asset bundles: those have their own vault (see
//! [`crate::restore`]), and mirroring gigabytes of engine data next to a
//! few megabytes of code would make the snapshot useless on a small disk.
//!
//! A snapshot has three parts:
//! 1. a captured diff of tracked-file modifications (fixed name, single
//!    generation)
//! 2. a mirror of untracked files (cleared and rebuilt each time so nothing
//!    stale accumulates)
//! 3. a delta mirror of the full working tree minus VCS metadata and asset
//!    paths
//!
//! Snapshots only run when the repository is on the canonical branch or
//! detached; a development branch never becomes the rollback target.

pub mod mirror;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::DeployConfig;
use crate::git::{GitRepo, RepoState};
use crate::utils::fs::{atomic_write, ensure_dir, remove_dir_all, repair_ownership};

use mirror::mirror_tree;

/// Maintains the rolling snapshot of the working tree.
pub struct BackupStore {
    config: DeployConfig,
}

impl BackupStore {
    /// Create a store for the configured deployment.
    pub fn new(config: DeployConfig) -> Self {
        Self { config }
    }

    /// Refresh the snapshot.
    ///
    /// Returns without doing anything when the repository state disallows
    /// snapshots. The three parts run in order and are individually
    /// best-effort: a failure in the diff capture is logged and the mirror
    /// still runs, so the snapshot is as complete as circumstances allow.
    /// Only a failure to create the snapshot directories themselves is
    /// fatal.
    pub async fn snapshot(&self, state: &RepoState) -> Result<()> {
        if !state.snapshot_allowed() {
            info!("Skipping snapshot ({state})");
            return Ok(());
        }

        let paths = &self.config.paths;
        ensure_dir(&paths.backup_root)?;
        ensure_dir(&paths.untracked_mirror())?;

        let repo = GitRepo::new(&paths.app_root);
        if repo.is_git_repo() {
            if let Err(e) = self.capture_tracked_diff(&repo).await {
                warn!("Tracked-diff capture failed: {e:#}");
            }
            if let Err(e) = self.mirror_untracked(&repo).await {
                warn!("Untracked-file mirror failed: {e:#}");
            }
        }

        if let Err(e) = self.mirror_worktree().await {
            warn!("Working-tree mirror failed: {e:#}");
        }

        repair_ownership(
            &paths.backup_root,
            &self.config.account.user,
            &self.config.account.group,
        )
        .await?;
        info!("Snapshot refreshed at {}", paths.backup_root.display());
        Ok(())
    }

    /// Capture the diff of tracked modifications to its fixed-name file,
    /// overwriting the previous generation.
    async fn capture_tracked_diff(&self, repo: &GitRepo) -> Result<()> {
        let diff = repo.tracked_diff().await?;
        atomic_write(&self.config.paths.tracked_diff_file(), diff.as_bytes())
    }

    /// Rebuild the untracked-file mirror from scratch.
    ///
    /// Cleared first so files deleted from the working copy do not
    /// accumulate across generations. Asset paths are excluded even when
    /// ignore rules would let them through.
    async fn mirror_untracked(&self, repo: &GitRepo) -> Result<()> {
        let paths = &self.config.paths;
        let mirror_root = paths.untracked_mirror();
        remove_dir_all(&mirror_root)?;
        ensure_dir(&mirror_root)?;

        let exclude = paths.asset_prefixes();
        let mut copied = 0usize;
        for rel in repo.untracked_files().await? {
            if exclude.iter().any(|prefix| rel.starts_with(prefix)) {
                continue;
            }
            let source = paths.app_root.join(&rel);
            if !source.is_file() {
                continue;
            }
            let target = mirror_root.join(&rel);
            if let Some(parent) = target.parent() {
                ensure_dir(parent)?;
            }
            std::fs::copy(&source, &target)
                .with_context(|| format!("Failed to copy untracked file {}", rel.display()))?;
            copied += 1;
        }
        info!("Mirrored {copied} untracked file(s)");
        Ok(())
    }

    /// Delta-mirror the working tree, excluding VCS metadata and assets.
    async fn mirror_worktree(&self) -> Result<()> {
        let paths = &self.config.paths;
        let src = paths.app_root.clone();
        let dst = paths.worktree_mirror();
        let mut exclude: Vec<PathBuf> = vec![PathBuf::from(".git")];
        exclude.extend(paths.asset_prefixes());

        let stats =
            tokio::task::spawn_blocking(move || mirror_tree(&src, &dst, &exclude))
                .await
                .context("Mirror task failed")??;
        info!(
            "Working-tree mirror: {} copied, {} unchanged, {} deleted",
            stats.copied, stats.unchanged, stats.deleted
        );
        Ok(())
    }
}
