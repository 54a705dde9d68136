//! Deployment configuration for Gambit.
//!
//! Everything that varies between deployments lives in one TOML file: the
//! filesystem layout (application root, asset roots, backup roots, state
//! directory), the canonical repository remote and branch, the update
//! cooldown and variant, the bundle source, the operating account, and the
//! external collaborator commands the orchestrator shells out to.
//!
//! The file is searched in this order:
//! 1. `--config <path>` (must exist)
//! 2. `$GAMBIT_CONFIG` (must exist)
//! 3. `/etc/gambit/config.toml` (defaults are used when absent)
//!
//! # File Format
//!
//! ```toml
//! [paths]
//! app_root = "/opt/gambit"
//! state_dir = "/home/gambit/.gambit"
//!
//! [repository]
//! remote = "https://github.com/gambit-dev/gambit-app.git"
//! branch = "main"
//!
//! [update]
//! cooldown_secs = 3600
//! variant = "small"
//!
//! [bundles]
//! base_url = "https://assets.example.org/gambit"
//!
//! [hooks]
//! service_register = ["systemctl", "reenable", "gambit-app.service"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::bundles::Variant;
use crate::constants::DEFAULT_COOLDOWN_SECS;
use crate::core::GambitError;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV_VAR: &str = "GAMBIT_CONFIG";

/// Default configuration file location on the device.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/gambit/config.toml";

/// Filesystem layout of the deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// The application working tree (a git checkout)
    pub app_root: PathBuf,
    /// Root of the engine asset bundles (inside the working tree)
    pub asset_root: PathBuf,
    /// Opening book bundles
    pub books_root: PathBuf,
    /// Game archive bundles
    pub games_root: PathBuf,
    /// The rolling working-tree snapshot
    pub backup_root: PathBuf,
    /// The bundle vault holding previously-installed bundle copies
    pub bundle_backup_root: PathBuf,
    /// Markers, lock file, and scratch downloads
    pub state_dir: PathBuf,
    /// Append-only operator log; `None` (or absent) logs to stderr only
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::rooted(Path::new("/opt/gambit"), Path::new("/home/gambit"))
    }
}

impl PathsConfig {
    /// Build the standard layout from an application root and a home
    /// directory for mutable state. Used by the defaults and by tests.
    pub fn rooted(app_root: &Path, home: &Path) -> Self {
        Self {
            app_root: app_root.to_path_buf(),
            asset_root: app_root.join("engines"),
            books_root: app_root.join("books"),
            games_root: app_root.join("games"),
            backup_root: home.join("backup"),
            bundle_backup_root: home.join("bundle-backup"),
            state_dir: home.join(".gambit"),
            log_file: Some(home.join("logs/gambit-update.log")),
        }
    }

    /// The update request marker written by the application.
    pub fn request_marker(&self) -> PathBuf {
        self.state_dir.join("update-request")
    }

    /// The last-success timestamp file.
    pub fn last_success_file(&self) -> PathBuf {
        self.state_dir.join("last-success")
    }

    /// The failure marker.
    pub fn failure_marker(&self) -> PathBuf {
        self.state_dir.join("update-failed")
    }

    /// Scratch directory for in-flight bundle downloads.
    pub fn scratch_dir(&self) -> PathBuf {
        self.state_dir.join("downloads")
    }

    /// Captured diff of tracked-file modifications (single generation).
    pub fn tracked_diff_file(&self) -> PathBuf {
        self.backup_root.join("tracked-changes.diff")
    }

    /// Mirror of the working tree (minus VCS metadata and asset paths).
    pub fn worktree_mirror(&self) -> PathBuf {
        self.backup_root.join("worktree")
    }

    /// Mirror of untracked files.
    pub fn untracked_mirror(&self) -> PathBuf {
        self.backup_root.join("untracked")
    }

    /// Asset roots as prefixes relative to the application root.
    ///
    /// These are excluded from every snapshot: the bundle vault, not the
    /// working-tree snapshot, is the rollback mechanism for assets.
    pub fn asset_prefixes(&self) -> Vec<PathBuf> {
        [&self.asset_root, &self.books_root, &self.games_root]
            .iter()
            .filter_map(|root| root.strip_prefix(&self.app_root).ok().map(Path::to_path_buf))
            .collect()
    }
}

/// The canonical repository the device tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Remote URL of the application repository
    pub remote: String,
    /// The single release branch production devices follow
    pub branch: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            remote: "https://github.com/gambit-dev/gambit-app.git".to_string(),
            branch: "main".to_string(),
        }
    }
}

/// Update policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Minimum seconds between non-forced update attempts
    pub cooldown_secs: u64,
    /// Variant installed by the full update flow
    pub variant: Variant,
    /// Run the OS package refresh hook before updating
    pub os_refresh: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            variant: Variant::Small,
            os_refresh: false,
        }
    }
}

/// Bundle source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Base URL the bundle archive names are appended to
    pub base_url: String,
    /// Optional expected SHA-256 digests, keyed by resolved bundle name.
    /// A bundle with an entry here is verified before extraction.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub checksums: HashMap<String, String>,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            base_url: "https://assets.gambit-dev.org/bundles".to_string(),
            checksums: HashMap::new(),
        }
    }
}

/// The low-privilege operating account that must own everything the
/// updater creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Account user name
    pub user: String,
    /// Account group name
    pub group: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            user: "gambit".to_string(),
            group: "gambit".to_string(),
        }
    }
}

/// External collaborator commands, as argv vectors.
///
/// An empty vector disables the step. The first element must resolve to an
/// executable on PATH; a configured-but-missing command is a configuration
/// error, not a silent skip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// OS package refresh (e.g. `apt-get update`), gated by `update.os_refresh`
    pub os_refresh: Vec<String>,
    /// Runtime dependency sync for the application
    pub dependency_sync: Vec<String>,
    /// Service (re)registration with the service manager
    pub service_register: Vec<String>,
    /// Capability grants for hardware access, one argv per grant
    pub capability_grants: Vec<Vec<String>>,
}

/// The full deployment configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Filesystem layout
    pub paths: PathsConfig,
    /// Canonical repository
    pub repository: RepositoryConfig,
    /// Update policy
    pub update: UpdateConfig,
    /// Bundle source
    pub bundles: BundleConfig,
    /// Operating account
    pub account: AccountConfig,
    /// External collaborator commands
    pub hooks: HooksConfig,
}

impl DeployConfig {
    /// Load configuration, resolving the file location as documented on the
    /// module. An explicitly requested path (flag or environment) must
    /// exist; the default path falls back to defaults when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_required(path);
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load_required(Path::new(&env_path));
        }
        let default = Path::new(DEFAULT_CONFIG_PATH);
        if default.exists() {
            Self::load_from(default)
        } else {
            Ok(Self::default())
        }
    }

    fn load_required(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(GambitError::ConfigNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        Self::load_from(path)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration: {}", path.display()))?;
        let config: Self = toml::from_str(&content).map_err(|e| GambitError::ConfigError {
            reason: format!("{}: {e}", path.display()),
        })?;
        Ok(config)
    }

    /// Serialize the configuration to a file (used by tests and the
    /// first-boot provisioning script).
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        crate::utils::fs::atomic_write(path, content.as_bytes())
    }

    /// The cooldown as a [`chrono::Duration`].
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.update.cooldown_secs as i64)
    }
}
