//! The full update sequence.
//!
//! One orchestrator run takes the device from "whatever state it is in" to
//! "running the current release with its assets present", in a fixed order:
//!
//! 1. optional OS package refresh (hook, warn-and-continue)
//! 2. rolling snapshot — strictly before anything mutates the tree
//! 3. repository update per classified state
//! 4. directory layout and ownership repair
//! 5. asset bundle ensure pass (engines, then books/games)
//! 6. runtime dependency sync (hook, fatal)
//! 7. service (re)registration (hook, fatal)
//! 8. capability grants for hardware access (hooks, warn-and-continue)
//!
//! External collaborators are argv vectors from the configuration, executed
//! with a finite timeout. A configured hook whose binary cannot be resolved
//! is a configuration error, never a silent skip.

use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use crate::backup::BackupStore;
use crate::config::DeployConfig;
use crate::constants::HOOK_TIMEOUT;
use crate::core::GambitError;
use crate::git::{GitRepo, RepositoryUpdater, ensure_git_available};
use crate::installer::AssetInstaller;
use crate::utils::fs::{ensure_dir, repair_ownership};

/// How a failed orchestrator step is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepPolicy {
    Fatal,
    WarnContinue,
}

/// Sequences a full update run.
pub struct UpdateOrchestrator {
    config: DeployConfig,
}

impl UpdateOrchestrator {
    /// Create an orchestrator for the configured deployment.
    pub fn new(config: DeployConfig) -> Self {
        Self { config }
    }

    /// Run the full update sequence.
    pub async fn run(&self) -> Result<()> {
        ensure_git_available()?;

        if self.config.update.os_refresh {
            self.run_hook(
                "OS package refresh",
                &self.config.hooks.os_refresh,
                StepPolicy::WarnContinue,
            )
            .await?;
        }

        let repo = GitRepo::new(&self.config.paths.app_root);
        let state = repo.classify(&self.config.repository.branch).await?;
        info!("Repository state: {state}");

        // Snapshot strictly before the updater mutates the working tree
        BackupStore::new(self.config.clone()).snapshot(&state).await?;

        RepositoryUpdater::new(repo, self.config.repository.clone()).apply(&state).await?;

        self.repair_layout().await?;

        let installer = AssetInstaller::new(self.config.clone())?;
        let engines = installer.install_variant(self.config.update.variant).await?;
        let books = installer.install_books_games().await?;
        info!(
            "Assets: {} installed, {} already present",
            engines.installed.len() + books.installed.len(),
            engines.skipped.len() + books.skipped.len()
        );

        self.run_hook("dependency sync", &self.config.hooks.dependency_sync, StepPolicy::Fatal)
            .await?;
        self.run_hook(
            "service registration",
            &self.config.hooks.service_register,
            StepPolicy::Fatal,
        )
        .await?;
        for grant in &self.config.hooks.capability_grants {
            self.run_hook("capability grant", grant, StepPolicy::WarnContinue).await?;
        }

        info!("Update run complete");
        Ok(())
    }

    /// Pin the working tree to a specific release tag (operator-driven).
    pub async fn pin_tag(&self, tag: &str) -> Result<()> {
        ensure_git_available()?;
        let repo = GitRepo::new(&self.config.paths.app_root);
        let state = repo.classify(&self.config.repository.branch).await?;
        BackupStore::new(self.config.clone()).snapshot(&state).await?;
        RepositoryUpdater::new(repo, self.config.repository.clone()).checkout_tag(tag).await
    }

    /// Make sure the directory layout exists and ends up owned by the
    /// operating account, whatever privilege this run started with.
    async fn repair_layout(&self) -> Result<()> {
        let paths = &self.config.paths;
        for dir in [
            &paths.asset_root,
            &paths.books_root,
            &paths.games_root,
            &paths.state_dir,
            &paths.scratch_dir(),
        ] {
            ensure_dir(dir)?;
        }
        if let Some(log) = &paths.log_file {
            if let Some(parent) = log.parent() {
                ensure_dir(parent)?;
            }
        }
        repair_ownership(&paths.app_root, &self.config.account.user, &self.config.account.group)
            .await?;
        repair_ownership(&paths.state_dir, &self.config.account.user, &self.config.account.group)
            .await
    }

    /// Execute one external collaborator command.
    ///
    /// An empty argv disables the step. A non-resolvable binary is a
    /// configuration error regardless of policy; a non-zero exit follows
    /// the step's policy.
    async fn run_hook(&self, step: &str, argv: &[String], policy: StepPolicy) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            return Ok(());
        };

        which::which(program).map_err(|_| GambitError::HookMissing {
            step: step.to_string(),
            command: program.clone(),
        })?;

        info!("Running {step}: {}", argv.join(" "));
        let result = run_command(program, args, HOOK_TIMEOUT).await;
        match (result, policy) {
            (Ok(()), _) => Ok(()),
            (Err(e), StepPolicy::WarnContinue) => {
                warn!("{step} failed (continuing): {e:#}");
                Ok(())
            }
            (Err(e), StepPolicy::Fatal) => Err(e),
        }
    }
}

async fn run_command(program: &str, args: &[String], timeout: Duration) -> Result<()> {
    let output = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(program).args(args).output(),
    )
    .await
    .map_err(|_| {
        anyhow::anyhow!("'{program}' timed out after {} seconds", timeout.as_secs())
    })??;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "'{program}' exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )
    }
}
