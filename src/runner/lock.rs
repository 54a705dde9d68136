//! Advisory lock scoped to one runner invocation.
//!
//! The runner is invoked by a timer, and nothing stops the timer from
//! firing again while a long download is still in flight. The lock closes
//! that hole: the second invocation observes the held lock, logs, and exits
//! successfully — it must *not* queue up behind an hour-long download.
//!
//! The lock is a `fs4` OS file lock, released automatically when the
//! process exits, so a crashed run never wedges the device.

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Holds the invocation lock for as long as it is alive.
pub struct InvocationLock {
    _file: File,
    path: PathBuf,
}

impl InvocationLock {
    /// Try to acquire the lock in the state directory.
    ///
    /// Returns `None` when another invocation already holds it.
    pub fn try_acquire(state_dir: &Path) -> Result<Option<Self>> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;
        let lock_path = state_dir.join("run.lock");

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;

        let acquired = file
            .try_lock_exclusive()
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
        if acquired {
            Ok(Some(Self {
                _file: file,
                path: lock_path,
            }))
        } else {
            Ok(None)
        }
    }
}

impl Drop for InvocationLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self._file) {
            tracing::warn!("Failed to unlock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_and_release() {
        let tmp = TempDir::new().unwrap();
        let lock = InvocationLock::try_acquire(tmp.path()).unwrap();
        assert!(lock.is_some());
        drop(lock);
        // Released: can be taken again
        assert!(InvocationLock::try_acquire(tmp.path()).unwrap().is_some());
    }

    #[test]
    fn creates_the_state_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/state");
        let _lock = InvocationLock::try_acquire(&dir).unwrap().unwrap();
        assert!(dir.join("run.lock").exists());
    }
}
