//! Error handling for Gambit
//!
//! This module provides the error types and user-facing error reporting for
//! the updater. The error system is designed around two principles:
//! 1. **Strongly-typed errors** for precise handling in code
//! 2. **User-friendly messages** with actionable suggestions on the console
//!
//! # Error Categories
//!
//! - **Configuration**: missing collaborator binaries, unreadable
//!   configuration, unsupported host architecture. Always fatal, never
//!   retried, and mapped to their own exit codes.
//! - **Source control**: git command failures. Fatal on the canonical-branch
//!   and tag flows; downgraded to warnings on development branches by the
//!   caller.
//! - **Asset handling**: download failures (transient, per-bundle fatal),
//!   archive extraction failures (per-bundle fatal, trigger a restore), and
//!   checksum mismatches.
//! - **Restore**: a requested rollback with no backup copy available.
//!
//! Use [`user_friendly_error`] to convert any error into a displayable
//! context with a suggestion and a process exit code.

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::constants::{EXIT_CONFIG, EXIT_FAILURE, EXIT_UNSUPPORTED_ARCH, EXIT_USAGE};

/// The main error type for Gambit operations.
///
/// Each variant represents a specific failure mode and carries the context
/// needed to explain it to the operator reading the device log.
#[derive(Error, Debug)]
pub enum GambitError {
    /// Git operation failed during execution.
    ///
    /// Returned when a git command exits non-zero. Common causes are network
    /// issues during fetch and invalid repository states.
    #[error("Git operation failed: {operation}")]
    GitCommandError {
        /// The git operation that failed (e.g. "fetch", "reset", "merge")
        operation: String,
        /// The error output from the git command
        stderr: String,
    },

    /// Git executable not found in PATH.
    ///
    /// The updater drives the system git binary; a missing binary is a
    /// deployment configuration problem, not a transient failure.
    #[error("Git is not installed or not found in PATH")]
    GitNotFound,

    /// Repository cloning failed.
    #[error("Failed to clone repository: {url}")]
    GitCloneFailed {
        /// The repository URL that failed to clone
        url: String,
        /// The error output from git
        reason: String,
    },

    /// Git checkout operation failed.
    #[error("Failed to checkout {reference}")]
    GitCheckoutFailed {
        /// The reference that could not be checked out
        reference: String,
        /// The error output from git
        reason: String,
    },

    /// Deployment configuration file could not be read or parsed.
    #[error("Configuration error: {reason}")]
    ConfigError {
        /// What went wrong with the configuration
        reason: String,
    },

    /// An explicitly requested configuration file does not exist.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// The path that was requested
        path: String,
    },

    /// An external collaborator command is missing or not executable.
    ///
    /// Covers the service manager, dependency sync, and capability grant
    /// commands the orchestrator shells out to.
    #[error("Required command for {step} not found: {command}")]
    HookMissing {
        /// The orchestrator step that needed the command
        step: String,
        /// The command that could not be resolved
        command: String,
    },

    /// The host CPU architecture has no bundle set.
    #[error("Unsupported host architecture: {arch}")]
    UnsupportedArchitecture {
        /// The detected architecture string
        arch: String,
    },

    /// The restore scope argument was not recognized.
    #[error("Unrecognized restore scope: {value}")]
    InvalidRestoreScope {
        /// The value that failed to parse
        value: String,
    },

    /// A bundle download failed after retries.
    ///
    /// Transient by nature: fatal to the current bundle, but a later
    /// invocation may succeed without any operator action.
    #[error("Failed to download bundle '{bundle}': {reason}")]
    FetchFailed {
        /// The bundle being downloaded
        bundle: String,
        /// Why the download failed
        reason: String,
    },

    /// A downloaded archive did not match its expected digest.
    #[error("Checksum mismatch for bundle '{bundle}'")]
    ChecksumMismatch {
        /// The bundle being verified
        bundle: String,
        /// The digest the configuration expects
        expected: String,
        /// The digest actually computed
        actual: String,
    },

    /// A bundle archive could not be extracted.
    #[error("Failed to extract bundle '{bundle}': {reason}")]
    ExtractionFailed {
        /// The bundle being extracted
        bundle: String,
        /// Why extraction failed
        reason: String,
    },

    /// A rollback was requested for a bundle with no saved copy.
    ///
    /// Non-fatal per item; bulk restores aggregate these into an overall
    /// failure while still restoring everything that can be restored.
    #[error("No backup available for bundle '{bundle}'")]
    RestoreUnavailable {
        /// The bundle that has no backup copy
        bundle: String,
    },

    /// A bulk restore satisfied only part of the request.
    #[error("Restored {restored} bundle(s), {failed} could not be restored")]
    RestoreIncomplete {
        /// Bundles successfully restored
        restored: usize,
        /// Bundles with no backup copy
        failed: usize,
    },

    /// IO operation failed.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parsing failed.
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl GambitError {
    /// The process exit code this error maps to.
    ///
    /// Configuration-class failures get their own codes so the invoking
    /// systemd unit (and the status reporter reading its result) can tell
    /// them apart from transient runtime failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnsupportedArchitecture { .. } => EXIT_UNSUPPORTED_ARCH,
            Self::GitNotFound
            | Self::ConfigError { .. }
            | Self::ConfigNotFound { .. }
            | Self::HookMissing { .. } => EXIT_CONFIG,
            Self::InvalidRestoreScope { .. } => EXIT_USAGE,
            _ => EXIT_FAILURE,
        }
    }
}

/// An error wrapped with user-facing context for display.
///
/// Carries the underlying error plus an optional suggestion and the exit
/// code the process should terminate with.
pub struct ErrorContext {
    /// The underlying error
    pub error: anyhow::Error,
    /// An actionable suggestion, when one exists
    pub suggestion: Option<String>,
    exit_code: i32,
}

impl ErrorContext {
    /// Wrap an error with no suggestion and the default failure exit code.
    pub fn new(error: anyhow::Error) -> Self {
        Self {
            error,
            suggestion: None,
            exit_code: EXIT_FAILURE,
        }
    }

    /// Attach a suggestion shown beneath the error message.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Override the exit code.
    #[must_use]
    pub const fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// The exit code the process should terminate with.
    pub const fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Print the error (and suggestion, if any) to stderr with colors.
    pub fn display(&self) {
        eprintln!("{} {}", "Error:".red().bold(), self.error);
        if let Some(ref suggestion) = self.suggestion {
            eprintln!("{} {}", "Hint:".yellow().bold(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, "\n  hint: {suggestion}")?;
        }
        Ok(())
    }
}

/// Convert any error into a user-friendly [`ErrorContext`].
///
/// Typed [`GambitError`]s get targeted suggestions and exit codes; anything
/// else falls through with the generic failure code.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let Some(gambit_err) = error.downcast_ref::<GambitError>() else {
        return ErrorContext::new(error);
    };

    let code = gambit_err.exit_code();
    let suggestion = match gambit_err {
        GambitError::GitNotFound => {
            Some("Install git on the device (e.g. apt install git)".to_string())
        }
        GambitError::ConfigNotFound { path } => {
            Some(format!("Create the configuration file at {path} or pass --config"))
        }
        GambitError::HookMissing { command, .. } => {
            Some(format!("Install '{command}' or remove the hook from the configuration"))
        }
        GambitError::UnsupportedArchitecture { .. } => {
            Some("Bundles are published for aarch64 and x86_64 only".to_string())
        }
        GambitError::InvalidRestoreScope { .. } => {
            Some("Valid scopes: 'all [ARCH]', 'arch [ARCH]', or a bundle name".to_string())
        }
        GambitError::FetchFailed { .. } => {
            Some("Check the device network connection and retry".to_string())
        }
        GambitError::RestoreUnavailable { bundle } => Some(format!(
            "Bundle '{bundle}' was never installed or its backup was removed; reinstall it instead"
        )),
        _ => None,
    };

    let mut ctx = ErrorContext::new(error).with_exit_code(code);
    if let Some(s) = suggestion {
        ctx = ctx.with_suggestion(s);
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_error_classes() {
        assert_eq!(
            GambitError::UnsupportedArchitecture {
                arch: "riscv64".to_string()
            }
            .exit_code(),
            EXIT_UNSUPPORTED_ARCH
        );
        assert_eq!(GambitError::GitNotFound.exit_code(), EXIT_CONFIG);
        assert_eq!(
            GambitError::FetchFailed {
                bundle: "books".to_string(),
                reason: "timed out".to_string()
            }
            .exit_code(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn user_friendly_error_maps_typed_errors() {
        let err = anyhow::Error::from(GambitError::UnsupportedArchitecture {
            arch: "mips".to_string(),
        });
        let ctx = user_friendly_error(err);
        assert_eq!(ctx.exit_code(), EXIT_UNSUPPORTED_ARCH);
        assert!(ctx.suggestion.is_some());
    }

    #[test]
    fn user_friendly_error_passes_through_unknown_errors() {
        let ctx = user_friendly_error(anyhow::anyhow!("something else"));
        assert_eq!(ctx.exit_code(), EXIT_FAILURE);
        assert!(ctx.suggestion.is_none());
    }
}
