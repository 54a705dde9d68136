//! The bundle vault and restore agent.
//!
//! When a bundle is forcibly re-fetched, its live directory is first
//! *relocated* (not copied) into the vault, keyed by bundle name. The vault
//! copy is what a failed re-fetch rolls back to, and restoring never
//! consumes it — a restore can be repeated any number of times.
//!
//! Restore scopes mirror the operator CLI: a single bundle, every
//! architecture-scoped bundle for one architecture, or everything. Partial
//! failures ("no backup available") are reported per bundle and aggregated;
//! the overall call fails only if at least one requested restoration could
//! not be satisfied, after attempting all of them.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::bundles::{self, BundleSpec, HostArch};
use crate::config::DeployConfig;
use crate::core::GambitError;
use crate::utils::fs::{copy_dir_all, ensure_dir, remove_dir_all, repair_ownership};

/// What the operator asked to restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreScope {
    /// One bundle by resolved name (e.g. `engines-aarch64`, `books`)
    Bundle(String),
    /// All architecture-scoped bundles for one architecture
    Arch(HostArch),
    /// Every bundle in the table, resolved for one architecture
    All(HostArch),
}

impl RestoreScope {
    /// Parse the CLI positionals: `all [ARCH]`, `arch [ARCH]`, or a bundle
    /// name. The architecture defaults to the host's.
    pub fn parse(scope: &str, arch_arg: Option<&str>) -> Result<Self> {
        let arch = match arch_arg {
            Some(name) => HostArch::from_name(name)?,
            None => HostArch::detect()?,
        };
        match scope {
            "all" => Ok(Self::All(arch)),
            "arch" => Ok(Self::Arch(arch)),
            name => {
                if bundles::find_bundle(name, arch).is_some() {
                    Ok(Self::Bundle(name.to_string()))
                } else {
                    Err(GambitError::InvalidRestoreScope {
                        value: name.to_string(),
                    }
                    .into())
                }
            }
        }
    }

    /// The bundles this scope selects, as (spec, arch) pairs.
    fn selected(&self) -> Vec<(&'static BundleSpec, HostArch)> {
        match self {
            Self::Bundle(name) => {
                // parse() validated the name for some arch; try both so a
                // scope built programmatically still resolves
                for arch in [HostArch::Aarch64, HostArch::X86_64] {
                    if let Some(spec) = bundles::find_bundle(name, arch) {
                        return vec![(spec, arch)];
                    }
                }
                Vec::new()
            }
            Self::Arch(arch) => bundles::BUNDLES
                .iter()
                .filter(|b| b.arch_scoped())
                .map(|b| (b, *arch))
                .collect(),
            Self::All(arch) => bundles::BUNDLES.iter().map(|b| (b, *arch)).collect(),
        }
    }
}

/// Outcome of restoring one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The vault copy was put back in place
    Restored,
    /// No vault copy exists for this bundle
    NoBackup,
}

/// Aggregate outcome of a scoped restore.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Bundles successfully restored
    pub restored: Vec<String>,
    /// Bundles with no vault copy
    pub missing: Vec<String>,
}

impl RestoreReport {
    /// Turn the report into the overall call result.
    pub fn into_result(mut self) -> Result<Self> {
        if self.missing.is_empty() {
            Ok(self)
        } else if self.restored.is_empty() && self.missing.len() == 1 {
            Err(GambitError::RestoreUnavailable {
                bundle: self.missing.remove(0),
            }
            .into())
        } else {
            Err(GambitError::RestoreIncomplete {
                restored: self.restored.len(),
                failed: self.missing.len(),
            }
            .into())
        }
    }
}

/// Rolls asset bundles back to their last good copy.
pub struct RestoreAgent {
    config: DeployConfig,
}

impl RestoreAgent {
    /// Create an agent for the configured deployment.
    pub fn new(config: DeployConfig) -> Self {
        Self { config }
    }

    fn vault_path(&self, name: &str) -> PathBuf {
        self.config.paths.bundle_backup_root.join(name)
    }

    /// Relocate a live bundle into the vault, replacing any previous vault
    /// copy. Returns `false` when there is no live bundle to stash.
    ///
    /// Relocation (rename, with a copy fallback across filesystems) is what
    /// makes the destination directory disappear, which in turn is what
    /// makes the installer re-fetch the bundle.
    pub async fn stash(&self, spec: &BundleSpec, arch: HostArch) -> Result<bool> {
        let name = spec.name(arch);
        let live = spec.destination(&self.config.paths, arch);
        if !live.exists() {
            return Ok(false);
        }

        let vault = self.vault_path(&name);
        ensure_dir(&self.config.paths.bundle_backup_root)?;
        remove_dir_all(&vault)?;

        match std::fs::rename(&live, &vault) {
            Ok(()) => {}
            Err(_) => {
                // Vault on a different filesystem: fall back to copy+remove
                copy_dir_all(&live, &vault)
                    .with_context(|| format!("Failed to stash bundle '{name}'"))?;
                remove_dir_all(&live)?;
            }
        }
        info!("Stashed bundle '{name}' into the vault");
        Ok(true)
    }

    /// Restore one bundle from the vault.
    ///
    /// Deletes the live (possibly partially extracted) destination,
    /// recreates its parent, and copies the vault copy back. The vault copy
    /// is left in place.
    pub async fn restore_bundle(
        &self,
        spec: &BundleSpec,
        arch: HostArch,
    ) -> Result<RestoreOutcome> {
        let name = spec.name(arch);
        let vault = self.vault_path(&name);
        if !vault.exists() {
            info!("No backup available for bundle '{name}'");
            return Ok(RestoreOutcome::NoBackup);
        }

        let live = spec.destination(&self.config.paths, arch);
        remove_dir_all(&live)?;
        if let Some(parent) = live.parent() {
            ensure_dir(parent)?;
        }
        copy_dir_all(&vault, &live)
            .with_context(|| format!("Failed to restore bundle '{name}' from the vault"))?;
        repair_ownership(&live, &self.config.account.user, &self.config.account.group).await?;
        info!("Restored bundle '{name}' from the vault");
        Ok(RestoreOutcome::Restored)
    }

    /// Restore every bundle a scope selects, attempting all of them before
    /// reporting.
    pub async fn restore_scope(&self, scope: &RestoreScope) -> Result<RestoreReport> {
        self.restore_all(scope.selected()).await
    }

    /// Restore every bundle of a class that a variant installs. Used as the
    /// best-effort remediation after a failed asset refresh.
    pub async fn restore_class(
        &self,
        class: crate::bundles::BundleClass,
        variant: crate::bundles::Variant,
        arch: HostArch,
    ) -> Result<RestoreReport> {
        let selected =
            bundles::bundles_for(class, variant).into_iter().map(|b| (b, arch)).collect();
        self.restore_all(selected).await
    }

    async fn restore_all(
        &self,
        selected: Vec<(&'static BundleSpec, HostArch)>,
    ) -> Result<RestoreReport> {
        let mut report = RestoreReport::default();
        for (spec, arch) in selected {
            let name = spec.name(arch);
            match self.restore_bundle(spec, arch).await {
                Ok(RestoreOutcome::Restored) => report.restored.push(name),
                Ok(RestoreOutcome::NoBackup) => report.missing.push(name),
                Err(e) => {
                    // A filesystem-level failure is worse than a missing
                    // backup but must not stop the remaining restores.
                    warn!("Restore of '{name}' failed: {e:#}");
                    report.missing.push(name);
                }
            }
        }
        Ok(report)
    }
}
