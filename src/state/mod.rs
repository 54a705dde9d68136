//! Persisted run state: the markers that survive between invocations.
//!
//! Three small files in the state directory carry everything the runner
//! needs to remember:
//!
//! - the **update request**, written by the running application when the
//!   operator asks for an update (its content is an optional reason tag)
//! - the **last-success timestamp**, written only when an update completes
//!   successfully, read to enforce the cooldown
//! - the **failure marker**, whose mere existence records that the previous
//!   attempt failed (it bypasses the cooldown and arms restore logic)
//!
//! All mutations go through write-to-temp-then-rename so an interrupted run
//! can never leave a torn marker. An interrupted run that never wrote its
//! outcome is also recoverable: the unset/stale timestamp bypasses the
//! cooldown on the next invocation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::config::PathsConfig;
use crate::utils::fs::{atomic_write, ensure_dir};

/// Why an update was requested.
///
/// The reason decides which action runs and whether the cooldown applies:
/// asset refreshes are operator-initiated and always run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateReason {
    /// General software update (the default when the tag is absent/empty)
    #[default]
    Pico,
    /// Refresh the engine asset bundles
    Engines,
    /// Refresh the opening book and game archive bundles
    BooksGames,
}

impl UpdateReason {
    /// Whether this reason bypasses the cooldown.
    pub const fn forces_run(self) -> bool {
        matches!(self, Self::Engines | Self::BooksGames)
    }

    /// The tag written into the request marker.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Pico => "pico",
            Self::Engines => "engines",
            Self::BooksGames => "books-games",
        }
    }
}

impl FromStr for UpdateReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pico" => Ok(Self::Pico),
            "engines" => Ok(Self::Engines),
            "books-games" => Ok(Self::BooksGames),
            other => Err(format!("unknown update reason '{other}'")),
        }
    }
}

/// Accessor over the persisted markers.
///
/// There is at most one live update request: writing a new request before
/// the old one is consumed overwrites the reason, not the existence.
#[derive(Debug, Clone)]
pub struct RunState {
    request_path: PathBuf,
    last_success_path: PathBuf,
    failure_path: PathBuf,
}

impl RunState {
    /// Create the accessor for the configured state directory.
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            request_path: paths.request_marker(),
            last_success_path: paths.last_success_file(),
            failure_path: paths.failure_marker(),
        }
    }

    /// Read the pending update request, if any.
    ///
    /// An empty file is a request with the default reason. An unrecognized
    /// tag is logged and treated as the default: a stale or hand-edited
    /// marker should still trigger a general update rather than wedge the
    /// runner.
    pub fn read_request(&self) -> Result<Option<UpdateReason>> {
        if !self.request_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.request_path)
            .with_context(|| format!("Failed to read {}", self.request_path.display()))?;
        let tag = content.trim();
        if tag.is_empty() {
            return Ok(Some(UpdateReason::default()));
        }
        match tag.parse() {
            Ok(reason) => Ok(Some(reason)),
            Err(e) => {
                warn!("{e}; treating as a general update request");
                Ok(Some(UpdateReason::default()))
            }
        }
    }

    /// Write (or overwrite) the update request.
    pub fn write_request(&self, reason: UpdateReason) -> Result<()> {
        atomic_write(&self.request_path, reason.tag().as_bytes())
    }

    /// Delete the update request once acted upon or explicitly skipped.
    pub fn clear_request(&self) -> Result<()> {
        remove_if_exists(&self.request_path)
    }

    /// The instant of the last successful update, if any.
    ///
    /// An unparsable timestamp is treated as unset, which errs on the side
    /// of allowing the update to run.
    pub fn last_success(&self) -> Result<Option<DateTime<Utc>>> {
        if !self.last_success_path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.last_success_path)
            .with_context(|| format!("Failed to read {}", self.last_success_path.display()))?;
        match DateTime::parse_from_rfc3339(content.trim()) {
            Ok(t) => Ok(Some(t.with_timezone(&Utc))),
            Err(e) => {
                warn!("Unparsable last-success timestamp ({e}); treating as unset");
                Ok(None)
            }
        }
    }

    /// Record a successful update at the given instant.
    pub fn write_last_success(&self, at: DateTime<Utc>) -> Result<()> {
        atomic_write(&self.last_success_path, at.to_rfc3339().as_bytes())
    }

    /// Whether the previous attempt failed.
    pub fn failure_exists(&self) -> bool {
        self.failure_path.exists()
    }

    /// Record a failed attempt. The content is a human-readable note; only
    /// the file's existence carries meaning.
    pub fn write_failure(&self, note: &str) -> Result<()> {
        let line = format!("{} {note}\n", Utc::now().to_rfc3339());
        atomic_write(&self.failure_path, line.as_bytes())
    }

    /// Clear the failure marker after a success.
    pub fn clear_failure(&self) -> Result<()> {
        remove_if_exists(&self.failure_path)
    }

    /// Make sure the state directory exists.
    pub fn ensure_layout(&self) -> Result<()> {
        if let Some(parent) = self.request_path.parent() {
            ensure_dir(parent)?;
        }
        Ok(())
    }
}

fn remove_if_exists(path: &std::path::Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}
