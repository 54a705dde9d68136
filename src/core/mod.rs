//! Core types and error handling for Gambit.
//!
//! The error taxonomy lives in [`error`]; everything that can fail in the
//! updater maps onto one of its variants so that the CLI layer can translate
//! failures into stable exit codes and actionable messages.

pub mod error;

pub use error::{ErrorContext, GambitError, user_friendly_error};
