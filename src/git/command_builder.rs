//! Type-safe git command builder for consistent command execution.
//!
//! This module provides a fluent API for building and executing git
//! commands, eliminating duplication and ensuring consistent timeout and
//! error handling across the updater.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::constants::{GIT_CLONE_TIMEOUT, GIT_COMMAND_TIMEOUT};
use crate::core::GambitError;

/// Builder for constructing and executing git commands.
///
/// All repository operations go through this builder so that every git call
/// gets the same treatment: a finite timeout, captured output, debug-level
/// command logging, and mapping of non-zero exits onto typed errors.
///
/// Commands are created with a 5-minute default timeout; clone operations
/// get a longer one. Arguments are always passed as separate parameters,
/// never through a shell.
pub struct GitCommand {
    /// Arguments passed to git (e.g. ["fetch", "--all", "--tags"])
    args: Vec<String>,

    /// Working directory, passed via `git -C` so execution is independent
    /// of the process working directory
    current_dir: Option<std::path::PathBuf>,

    /// Maximum duration to wait for completion
    timeout_duration: Duration,

    /// For clone commands, the URL for better error messages
    clone_url: Option<String>,
}

impl Default for GitCommand {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            current_dir: None,
            timeout_duration: GIT_COMMAND_TIMEOUT,
            clone_url: None,
        }
    }
}

impl GitCommand {
    /// Create a new git command builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory for command execution.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Add multiple arguments to the command.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a custom timeout for the command.
    pub const fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Execute the command and return its output.
    pub async fn execute(self) -> Result<GitCommandOutput> {
        let mut cmd = Command::new("git");

        let mut full_args = Vec::new();
        if let Some(ref dir) = self.current_dir {
            full_args.push("-C".to_string());
            full_args.push(dir.display().to_string());
        }
        full_args.extend(self.args.clone());
        cmd.args(&full_args);

        tracing::debug!(target: "git", "Executing command: git {}", full_args.join(" "));

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = match timeout(self.timeout_duration, cmd.output()).await {
            Ok(result) => {
                result.context(format!("Failed to execute git {}", full_args.join(" ")))?
            }
            Err(_) => {
                tracing::warn!(
                    target: "git",
                    "Command timed out after {} seconds: git {}",
                    self.timeout_duration.as_secs(),
                    full_args.join(" ")
                );
                return Err(GambitError::GitCommandError {
                    operation: effective_operation(&full_args),
                    stderr: format!(
                        "git command timed out after {} seconds",
                        self.timeout_duration.as_secs()
                    ),
                }
                .into());
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);

            tracing::debug!(
                target: "git",
                "Command failed with exit code {:?}: {}",
                output.status.code(),
                if stderr.is_empty() { &stdout } else { &stderr }
            );

            let operation = effective_operation(&full_args);
            let error = if operation == "clone" {
                GambitError::GitCloneFailed {
                    url: self.clone_url.unwrap_or_else(|| "unknown".to_string()),
                    reason: stderr.to_string(),
                }
            } else if operation == "checkout" {
                let reference = effective_args(&full_args).get(1).cloned().unwrap_or_default();
                GambitError::GitCheckoutFailed {
                    reference,
                    reason: stderr.to_string(),
                }
            } else {
                GambitError::GitCommandError {
                    operation,
                    stderr: if stderr.is_empty() {
                        stdout.to_string()
                    } else {
                        stderr.to_string()
                    },
                }
            };
            return Err(error.into());
        }

        Ok(GitCommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Execute the command and return only stdout as a trimmed string.
    pub async fn execute_stdout(self) -> Result<String> {
        let output = self.execute().await?;
        Ok(output.stdout.trim().to_string())
    }

    /// Execute the command and check for success, discarding output.
    pub async fn execute_success(self) -> Result<()> {
        self.execute().await?;
        Ok(())
    }
}

/// The git operation name, skipping the `-C <dir>` prefix if present.
fn effective_operation(full_args: &[String]) -> String {
    effective_args(full_args)
        .first()
        .cloned()
        .unwrap_or_else(|| "unknown".to_string())
}

fn effective_args(full_args: &[String]) -> &[String] {
    if full_args.first().map(String::as_str) == Some("-C") && full_args.len() > 2 {
        &full_args[2..]
    } else {
        full_args
    }
}

/// Output from a git command.
#[derive(Debug)]
pub struct GitCommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

// Convenience builders for the operations the updater consumes.

impl GitCommand {
    /// Clone a repository at a specific branch.
    pub fn clone_branch(url: &str, branch: &str, target: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new()
            .args(["clone", "--branch", branch, url])
            .args([target.as_ref().display().to_string()])
            .with_timeout(GIT_CLONE_TIMEOUT);
        cmd.clone_url = Some(url.to_string());
        cmd
    }

    /// Fetch all remotes including tags, forcing tag updates so a
    /// recreated release tag is picked up.
    pub fn fetch() -> Self {
        Self::new().args(["fetch", "--all", "--tags", "--force"])
    }

    /// Checkout a reference (branch, tag, or commit).
    pub fn checkout(ref_name: &str) -> Self {
        Self::new().args(["checkout", ref_name])
    }

    /// Hard reset the working tree to a reference.
    pub fn reset_hard_to(ref_name: &str) -> Self {
        Self::new().args(["reset", "--hard", ref_name])
    }

    /// Merge-pull a branch from a remote (non-destructive update).
    pub fn pull(remote: &str, branch: &str) -> Self {
        Self::new().args(["pull", "--no-rebase", remote, branch])
    }

    /// Current branch name; empty output when HEAD is detached.
    pub fn current_branch() -> Self {
        Self::new().args(["branch", "--show-current"])
    }

    /// The tag HEAD points at exactly, if any.
    pub fn describe_exact_tag() -> Self {
        Self::new().args(["describe", "--tags", "--exact-match", "HEAD"])
    }

    /// Untracked files, honoring ignore rules, NUL-separated.
    pub fn ls_untracked() -> Self {
        Self::new().args(["ls-files", "--others", "--exclude-standard", "-z"])
    }

    /// Diff of tracked-file modifications.
    pub fn diff_tracked() -> Self {
        Self::new().args(["diff", "HEAD"])
    }
}
