//! Global constants used throughout the Gambit codebase.
//!
//! This module contains timeout durations, retry parameters, and process
//! exit codes that are used across multiple modules. Defining them centrally
//! improves maintainability and makes magic numbers more discoverable.

use std::time::Duration;

/// Timeout for most git operations (5 minutes).
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for git clone operations (10 minutes).
///
/// The initial clone of the application repository happens over the
/// device's (often slow) uplink and may transfer the full history.
pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(600);

/// Timeout for a single bundle download (30 minutes).
///
/// Engine and weight bundles run to hundreds of megabytes; the device
/// uplink can be slow, but a hung connection must not block forever.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(1800);

/// Timeout for external collaborator commands (10 minutes).
///
/// Covers service registration, dependency sync, and capability grants.
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(600);

/// Number of download attempts per bundle before giving up.
pub const FETCH_ATTEMPTS: usize = 3;

/// Base of the download retry backoff exponent.
///
/// Combined with [`FETCH_BACKOFF_FACTOR_MS`], retries wait 2s then 4s.
pub const FETCH_BACKOFF_BASE: u64 = 2;

/// Scale factor applied to the backoff exponent, in milliseconds.
pub const FETCH_BACKOFF_FACTOR_MS: u64 = 1000;

/// Default minimum time between non-forced update attempts (1 hour).
pub const DEFAULT_COOLDOWN_SECS: u64 = 3600;

/// Exit code for runtime failures.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for usage errors (also produced by clap itself).
pub const EXIT_USAGE: i32 = 2;

/// Exit code when the host CPU architecture has no bundle set.
///
/// Distinct from [`EXIT_USAGE`] so the calling unit can tell a broken
/// invocation apart from hardware this build does not support.
pub const EXIT_UNSUPPORTED_ARCH: i32 = 3;

/// Exit code for configuration errors (missing collaborator binaries,
/// unreadable configuration file).
pub const EXIT_CONFIG: i32 = 4;
