//! The flag-triggered runner.
//!
//! A systemd timer invokes `gambit run` every few minutes. Each invocation
//! is one pass of a small state machine:
//!
//! - no update request → nothing to do
//! - request present → decide whether to act: the cooldown applies unless
//!   the last success is unknown, the previous attempt failed, or the
//!   reason is a forced asset refresh
//! - too soon → the request is *dropped*, not deferred (the operator asked
//!   at a bad time; they can ask again)
//! - otherwise dispatch by reason, then persist the outcome: success clears
//!   the failure marker, stamps the success time, and consumes the request;
//!   failure writes the failure marker, rolls assets back best-effort, and
//!   **leaves the request in place** so a later invocation retries
//!
//! The whole invocation holds an advisory lock; a second timer firing while
//! a download is still in flight logs and exits cleanly.

pub mod lock;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info};

use crate::bundles::{BundleClass, Variant};
use crate::config::DeployConfig;
use crate::installer::AssetInstaller;
use crate::orchestrator::UpdateOrchestrator;
use crate::restore::RestoreAgent;
use crate::state::{RunState, UpdateReason};

use lock::InvocationLock;

/// What one runner invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No update request was pending
    NoRequest,
    /// Another invocation holds the lock
    SkippedLocked,
    /// The request arrived inside the cooldown and was dropped
    SkippedCooldown,
    /// The dispatched action completed successfully
    Completed,
}

/// The timer-driven update trigger.
pub struct FlagRunner {
    config: DeployConfig,
}

impl FlagRunner {
    /// Create a runner for the configured deployment.
    pub fn new(config: DeployConfig) -> Self {
        Self { config }
    }

    /// Execute one invocation of the state machine.
    pub async fn run(&self) -> Result<RunOutcome> {
        let Some(_lock) = InvocationLock::try_acquire(&self.config.paths.state_dir)? else {
            info!("Another update invocation is already running; exiting");
            return Ok(RunOutcome::SkippedLocked);
        };

        let state = RunState::new(&self.config.paths);
        state.ensure_layout()?;

        let Some(reason) = state.read_request()? else {
            return Ok(RunOutcome::NoRequest);
        };
        info!("Update requested (reason: {})", reason.tag());

        // A dispatch target that cannot run is a configuration error, not
        // a silent skip: record the failure so the status reporter sees it.
        if let Err(e) = crate::git::ensure_git_available() {
            state.write_failure("git binary missing")?;
            return Err(e);
        }

        if !self.due(&state, reason)? {
            info!("Inside cooldown and not forced; request skipped");
            state.clear_request()?;
            return Ok(RunOutcome::SkippedCooldown);
        }

        match self.dispatch(reason).await {
            Ok(()) => {
                state.clear_failure()?;
                state.write_last_success(Utc::now())?;
                state.clear_request()?;
                info!("Update completed successfully");
                Ok(RunOutcome::Completed)
            }
            Err(e) => {
                error!("Update failed (reason: {}): {e:#}", reason.tag());
                self.remediate(reason).await;
                state.write_failure(&format!("{} update failed", reason.tag()))?;
                // The request is deliberately left in place: the failure
                // marker bypasses the cooldown on the next invocation.
                Err(e)
            }
        }
    }

    /// Whether the request should be acted on now.
    fn due(&self, state: &RunState, reason: UpdateReason) -> Result<bool> {
        if reason.forces_run() || state.failure_exists() {
            return Ok(true);
        }
        match state.last_success()? {
            None => Ok(true),
            Some(last) => Ok(Utc::now() - last >= self.config.cooldown()),
        }
    }

    async fn dispatch(&self, reason: UpdateReason) -> Result<()> {
        match reason {
            UpdateReason::Pico => UpdateOrchestrator::new(self.config.clone()).run().await,
            UpdateReason::Engines => {
                let installer = AssetInstaller::new(self.config.clone())?;
                installer.refresh_class(BundleClass::Engines, self.config.update.variant).await?;
                Ok(())
            }
            UpdateReason::BooksGames => {
                let installer = AssetInstaller::new(self.config.clone())?;
                installer.refresh_class(BundleClass::BooksGames, Variant::Small).await?;
                Ok(())
            }
        }
    }

    /// Best-effort rollback after a failed asset refresh. Its own failure
    /// is logged but never changes the outer outcome.
    async fn remediate(&self, reason: UpdateReason) {
        let class = match reason {
            UpdateReason::Engines => BundleClass::Engines,
            UpdateReason::BooksGames => BundleClass::BooksGames,
            UpdateReason::Pico => return,
        };
        let arch = match crate::bundles::HostArch::detect() {
            Ok(arch) => arch,
            Err(e) => {
                error!("Cannot roll back assets: {e}");
                return;
            }
        };
        let agent = RestoreAgent::new(self.config.clone());
        match agent.restore_class(class, self.config.update.variant, arch).await {
            Ok(report) => info!(
                "Rollback: {} restored, {} without backup",
                report.restored.len(),
                report.missing.len()
            ),
            Err(e) => error!("Rollback failed: {e:#}"),
        }
    }
}
