//! Filesystem utilities and helpers.
//!
//! Everything here is deliberately small: atomic writes so markers are never
//! torn, recursive copy/remove used by the backup and restore paths, and the
//! ownership repair that keeps created paths owned by the operating account.

pub mod fs;

pub use fs::{atomic_write, copy_dir_all, ensure_dir, remove_dir_all, repair_ownership};
