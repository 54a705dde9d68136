//! Gambit - self-updating deployment orchestrator for chess appliance devices
//!
//! Gambit keeps an unattended, appliance-style chess device current: the
//! application repository it runs from, and the large binary asset bundles it
//! depends on (per-architecture engine sets, neural-network weights, emulator
//! resources, opening books, game archives, narrated-replay audio). It is
//! designed to survive partial failures of downloads and source-control
//! operations, and to never leave the device worse off than before an update
//! attempt.
//!
//! # Architecture Overview
//!
//! The running application asks for an update by writing a request marker;
//! a systemd timer invokes `gambit run`, which decides (cooldown, failure
//! history, forced reasons) whether to act, and dispatches to the update
//! orchestrator or the asset installer. Failures write a failure marker and
//! keep the request alive so a later invocation retries; asset failures roll
//! back to the last good copy of each bundle.
//!
//! # Core Modules
//!
//! - [`runner`] - flag-triggered entry point with cooldown/failure policy
//! - [`orchestrator`] - full update sequence (snapshot, repo update, assets)
//! - [`git`] - source-control operations via the system git binary
//! - [`backup`] - rolling snapshot of the working tree
//! - [`installer`] - idempotent asset-bundle installs
//! - [`restore`] - bundle backup vault and rollback
//! - [`bundles`] - the static bundle descriptor table
//! - [`state`] - persisted markers (request, last success, failure)
//!
//! # Supporting Modules
//!
//! - [`cli`] - command-line interface
//! - [`config`] - deployment configuration (paths, remote, cooldown, hooks)
//! - [`core`] - error types and user-facing error reporting
//! - [`fetch`] - archive download and extraction
//! - [`utils`] - filesystem helpers

// Core functionality modules
pub mod backup;
pub mod bundles;
pub mod installer;
pub mod orchestrator;
pub mod restore;
pub mod runner;
pub mod state;

// Git integration
pub mod git;

// Supporting modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod fetch;
pub mod utils;
