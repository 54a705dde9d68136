//! Source-control operations for the application repository.
//!
//! Gambit drives the system `git` binary rather than an embedded library,
//! the same way Cargo does with `git-fetch-with-cli`: the device's git
//! configuration, credential helpers, and platform quirks all keep working,
//! and failures surface as ordinary non-zero exits that map onto typed
//! errors.
//!
//! The module has three layers:
//! - [`GitRepo`]: a thin handle over a repository path with the query and
//!   mutation operations the updater consumes
//! - [`RepoState`]: the classification of the checkout, computed fresh on
//!   every run and never cached
//! - [`RepositoryUpdater`]: the state-specific transition toward "up to date
//!   with the remote", with an explicit fatal-vs-warn policy per state

pub mod command_builder;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::RepositoryConfig;
use crate::core::GambitError;
use crate::git::command_builder::GitCommand;
use crate::utils::fs::ensure_dir;

/// Check that the git binary is available.
pub fn ensure_git_available() -> Result<()> {
    which::which("git").map_err(|_| GambitError::GitNotFound)?;
    Ok(())
}

/// The classified state of the application checkout.
///
/// Derived, never stored: every orchestrator run recomputes it from
/// source-control queries so external changes (an operator poking at the
/// device over SSH) are always observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    /// No repository at the configured path
    Absent,
    /// Checked out on the canonical release branch
    OnCanonicalBranch,
    /// Checked out on some other named branch
    OnDevelopmentBranch(String),
    /// Detached HEAD resting exactly on a tag (a release pin)
    DetachedAtTag(String),
    /// Detached HEAD with no tag; no well-defined upstream target
    DetachedNoTag,
}

impl RepoState {
    /// Whether the rolling snapshot should run in this state.
    ///
    /// Snapshots are taken on the canonical branch and in detached states,
    /// never on a development branch: half-finished work must not become
    /// the rollback target.
    pub const fn snapshot_allowed(&self) -> bool {
        !matches!(self, Self::OnDevelopmentBranch(_) | Self::Absent)
    }
}

impl std::fmt::Display for RepoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::OnCanonicalBranch => write!(f, "on canonical branch"),
            Self::OnDevelopmentBranch(b) => write!(f, "on development branch '{b}'"),
            Self::DetachedAtTag(t) => write!(f, "detached at tag '{t}'"),
            Self::DetachedNoTag => write!(f, "detached without tag"),
        }
    }
}

/// A git repository handle providing async operations via CLI commands.
///
/// Holds only the repository path; all state is queried from git directly.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

impl GitRepo {
    /// Create a handle for a repository path (existing or not).
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The repository path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the path contains a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.path.join(".git").exists()
    }

    /// Clone a repository at a specific branch.
    pub async fn clone_branch(url: &str, branch: &str, target: impl AsRef<Path>) -> Result<Self> {
        let target_path = target.as_ref();
        if let Some(parent) = target_path.parent() {
            ensure_dir(parent)?;
        }
        GitCommand::clone_branch(url, branch, target_path).execute().await?;
        Ok(Self::new(target_path))
    }

    /// Fetch updates (all remotes, tags forced) without touching the tree.
    pub async fn fetch(&self) -> Result<()> {
        GitCommand::fetch().current_dir(&self.path).execute_success().await
    }

    /// Checkout a reference (branch, tag, or commit).
    pub async fn checkout(&self, ref_name: &str) -> Result<()> {
        GitCommand::checkout(ref_name).current_dir(&self.path).execute_success().await
    }

    /// Hard reset the working tree to a reference. Destroys local changes.
    pub async fn reset_hard(&self, ref_name: &str) -> Result<()> {
        GitCommand::reset_hard_to(ref_name).current_dir(&self.path).execute_success().await
    }

    /// Merge-pull a branch from a remote.
    pub async fn pull_merge(&self, remote: &str, branch: &str) -> Result<()> {
        GitCommand::pull(remote, branch).current_dir(&self.path).execute_success().await
    }

    /// The current branch name, or `None` when HEAD is detached.
    pub async fn current_branch(&self) -> Result<Option<String>> {
        let name = GitCommand::current_branch().current_dir(&self.path).execute_stdout().await?;
        Ok(if name.is_empty() { None } else { Some(name) })
    }

    /// The tag HEAD rests exactly on, if any.
    pub async fn exact_tag(&self) -> Option<String> {
        match GitCommand::describe_exact_tag().current_dir(&self.path).execute_stdout().await {
            Ok(tag) if !tag.is_empty() => Some(tag),
            _ => None,
        }
    }

    /// Untracked files (honoring ignore rules), relative to the repository.
    pub async fn untracked_files(&self) -> Result<Vec<PathBuf>> {
        let out = GitCommand::ls_untracked().current_dir(&self.path).execute().await?;
        Ok(out
            .stdout
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// Diff of tracked-file modifications against HEAD.
    pub async fn tracked_diff(&self) -> Result<String> {
        let out = GitCommand::diff_tracked().current_dir(&self.path).execute().await?;
        Ok(out.stdout)
    }

    /// Classify the checkout against the canonical branch.
    pub async fn classify(&self, canonical_branch: &str) -> Result<RepoState> {
        if !self.is_git_repo() {
            return Ok(RepoState::Absent);
        }
        match self.current_branch().await? {
            Some(branch) if branch == canonical_branch => Ok(RepoState::OnCanonicalBranch),
            Some(branch) => Ok(RepoState::OnDevelopmentBranch(branch)),
            None => match self.exact_tag().await {
                Some(tag) => Ok(RepoState::DetachedAtTag(tag)),
                None => Ok(RepoState::DetachedNoTag),
            },
        }
    }
}

/// How a failed update step is treated for a given repository state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Error propagates and aborts the orchestrator run
    Fatal,
    /// Error is logged and the run continues with the tree as-is
    WarnContinue,
}

/// Applies the minimal safe transition toward "up to date with the remote".
///
/// The per-state actions and their failure policies:
///
/// | state | action | on failure |
/// |---|---|---|
/// | absent | clone canonical branch | fatal |
/// | detached at tag | fetch tags, re-pin to the tag | fatal |
/// | detached, no tag | none ("no forced update") | - |
/// | canonical branch | fetch, hard reset to remote tip | fatal |
/// | development branch | fetch, merge-pull same-named branch | warn |
///
/// The canonical-branch reset is destructive by design: the device is meant
/// to run the latest official revision, and local drift was captured by the
/// snapshot before this runs. Development branches may hold intentional
/// unmerged work, so they only ever get a non-destructive merge.
pub struct RepositoryUpdater {
    repo: GitRepo,
    config: RepositoryConfig,
}

impl RepositoryUpdater {
    /// Create an updater for the repository described by the configuration.
    pub fn new(repo: GitRepo, config: RepositoryConfig) -> Self {
        Self { repo, config }
    }

    /// The failure policy for a repository state.
    pub const fn failure_policy(state: &RepoState) -> FailurePolicy {
        match state {
            RepoState::OnDevelopmentBranch(_) => FailurePolicy::WarnContinue,
            _ => FailurePolicy::Fatal,
        }
    }

    /// Apply the state-specific update action.
    pub async fn apply(&self, state: &RepoState) -> Result<()> {
        let result = self.apply_inner(state).await;
        match (result, Self::failure_policy(state)) {
            (Ok(()), _) => Ok(()),
            (Err(e), FailurePolicy::WarnContinue) => {
                warn!("Repository update failed ({state}), keeping local state: {e:#}");
                Ok(())
            }
            (Err(e), FailurePolicy::Fatal) => Err(e),
        }
    }

    async fn apply_inner(&self, state: &RepoState) -> Result<()> {
        match state {
            RepoState::Absent => {
                info!(
                    "No repository at {}, cloning {} at branch {}",
                    self.repo.path().display(),
                    self.config.remote,
                    self.config.branch
                );
                GitRepo::clone_branch(&self.config.remote, &self.config.branch, self.repo.path())
                    .await
                    .context("Initial clone failed")?;
                Ok(())
            }
            RepoState::DetachedAtTag(tag) => {
                // A detached tag is an immutable release pin; the only
                // legitimate transition is re-pinning to the same (possibly
                // recreated) tag object.
                info!("Re-pinning release tag {tag}");
                self.repo.fetch().await?;
                self.repo.checkout(tag).await?;
                self.repo.reset_hard(tag).await?;
                Ok(())
            }
            RepoState::DetachedNoTag => {
                info!("Detached HEAD without tag: no forced update");
                Ok(())
            }
            RepoState::OnCanonicalBranch => {
                info!("Updating canonical branch {} from remote", self.config.branch);
                self.repo.fetch().await?;
                self.repo.reset_hard(&format!("origin/{}", self.config.branch)).await?;
                Ok(())
            }
            RepoState::OnDevelopmentBranch(branch) => {
                info!("Development branch '{branch}': attempting merge-pull");
                self.repo.fetch().await?;
                self.repo.pull_merge("origin", branch).await?;
                Ok(())
            }
        }
    }

    /// Pin the working tree to a specific release tag (operator-driven).
    pub async fn checkout_tag(&self, tag: &str) -> Result<()> {
        self.repo.fetch().await?;
        self.repo
            .checkout(tag)
            .await
            .with_context(|| format!("Failed to pin release tag {tag}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Run git in a directory, panicking on failure (test setup only).
    async fn git(dir: &Path, args: &[&str]) {
        GitCommand::new()
            .current_dir(dir)
            .args(args.iter().copied())
            .execute_success()
            .await
            .unwrap_or_else(|e| panic!("git {args:?} failed: {e:#}"));
    }

    async fn init_repo(dir: &Path) {
        git(dir, &["init", "-b", "main"]).await;
        git(dir, &["config", "user.email", "test@example.com"]).await;
        git(dir, &["config", "user.name", "Test"]).await;
        std::fs::write(dir.join("app.py"), "print('hello')\n").unwrap();
        git(dir, &["add", "."]).await;
        git(dir, &["commit", "-m", "initial"]).await;
    }

    #[tokio::test]
    async fn classify_absent_when_no_repository() {
        let tmp = TempDir::new().unwrap();
        let repo = GitRepo::new(tmp.path().join("missing"));
        assert_eq!(repo.classify("main").await.unwrap(), RepoState::Absent);
    }

    #[tokio::test]
    async fn classify_canonical_and_development_branches() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path()).await;
        let repo = GitRepo::new(tmp.path());

        assert_eq!(repo.classify("main").await.unwrap(), RepoState::OnCanonicalBranch);
        assert_eq!(
            repo.classify("release").await.unwrap(),
            RepoState::OnDevelopmentBranch("main".to_string())
        );
    }

    #[tokio::test]
    async fn classify_detached_at_tag_beats_development() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path()).await;
        git(tmp.path(), &["tag", "v3.1"]).await;
        git(tmp.path(), &["checkout", "--detach", "v3.1"]).await;

        let repo = GitRepo::new(tmp.path());
        assert_eq!(
            repo.classify("main").await.unwrap(),
            RepoState::DetachedAtTag("v3.1".to_string())
        );
    }

    #[tokio::test]
    async fn classify_detached_without_tag() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path()).await;
        std::fs::write(tmp.path().join("more.py"), "pass\n").unwrap();
        git(tmp.path(), &["add", "."]).await;
        git(tmp.path(), &["commit", "-m", "second"]).await;
        git(tmp.path(), &["checkout", "--detach", "HEAD~1"]).await;

        let repo = GitRepo::new(tmp.path());
        assert_eq!(repo.classify("main").await.unwrap(), RepoState::DetachedNoTag);
    }

    #[tokio::test]
    async fn untracked_files_respect_ignore_rules() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path()).await;
        std::fs::write(tmp.path().join(".gitignore"), "ignored.log\n").unwrap();
        git(tmp.path(), &["add", ".gitignore"]).await;
        git(tmp.path(), &["commit", "-m", "ignore"]).await;
        std::fs::write(tmp.path().join("new-file.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("ignored.log"), "x").unwrap();

        let repo = GitRepo::new(tmp.path());
        let untracked = repo.untracked_files().await.unwrap();
        assert!(untracked.contains(&PathBuf::from("new-file.txt")));
        assert!(!untracked.contains(&PathBuf::from("ignored.log")));
    }

    #[tokio::test]
    async fn canonical_reset_discards_local_drift() {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin");
        std::fs::create_dir(&origin).unwrap();
        init_repo(&origin).await;

        let clone_path = tmp.path().join("device");
        let repo = GitRepo::clone_branch(&origin.display().to_string(), "main", &clone_path)
            .await
            .unwrap();
        // Local drift on the canonical branch
        std::fs::write(clone_path.join("app.py"), "print('drifted')\n").unwrap();

        let updater = RepositoryUpdater::new(
            repo,
            RepositoryConfig {
                remote: origin.display().to_string(),
                branch: "main".to_string(),
            },
        );
        updater.apply(&RepoState::OnCanonicalBranch).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(clone_path.join("app.py")).unwrap(),
            "print('hello')\n"
        );
    }

    #[tokio::test]
    async fn development_branch_failure_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        init_repo(tmp.path()).await;
        git(tmp.path(), &["checkout", "-b", "feature"]).await;

        // No remote configured: fetch/pull fail, but the policy downgrades
        // that to a warning.
        let updater = RepositoryUpdater::new(GitRepo::new(tmp.path()), RepositoryConfig::default());
        updater
            .apply(&RepoState::OnDevelopmentBranch("feature".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn absent_state_clones_the_remote() {
        let tmp = TempDir::new().unwrap();
        let origin = tmp.path().join("origin");
        std::fs::create_dir(&origin).unwrap();
        init_repo(&origin).await;

        let target = tmp.path().join("deep/nested/device");
        let updater = RepositoryUpdater::new(
            GitRepo::new(&target),
            RepositoryConfig {
                remote: origin.display().to_string(),
                branch: "main".to_string(),
            },
        );
        updater.apply(&RepoState::Absent).await.unwrap();
        assert!(target.join("app.py").exists());
    }

    #[test]
    fn policy_table_matches_contract() {
        assert_eq!(
            RepositoryUpdater::failure_policy(&RepoState::OnCanonicalBranch),
            FailurePolicy::Fatal
        );
        assert_eq!(
            RepositoryUpdater::failure_policy(&RepoState::DetachedAtTag("v1".into())),
            FailurePolicy::Fatal
        );
        assert_eq!(
            RepositoryUpdater::failure_policy(&RepoState::OnDevelopmentBranch("x".into())),
            FailurePolicy::WarnContinue
        );
    }

    #[test]
    fn snapshot_gate_follows_state() {
        assert!(RepoState::OnCanonicalBranch.snapshot_allowed());
        assert!(RepoState::DetachedAtTag("v1".into()).snapshot_allowed());
        assert!(RepoState::DetachedNoTag.snapshot_allowed());
        assert!(!RepoState::OnDevelopmentBranch("wip".into()).snapshot_allowed());
        assert!(!RepoState::Absent.snapshot_allowed());
    }
}
