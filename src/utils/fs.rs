//! File system operations with atomic writes and safe copying.
//!
//! The persisted markers that survive between invocations (update request,
//! last-success timestamp, failure marker) are written through
//! [`atomic_write`] so an interrupted run can never leave a torn file.
//! Directory copies preserve relative structure and are used by both the
//! snapshot and the bundle vault.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};

/// Create a directory and all parents if they do not exist.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("Path exists but is not a directory: {}", path.display());
        }
        return Ok(());
    }
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}

/// Write a file atomically: write to a temporary sibling, then rename.
///
/// The rename is atomic on the same filesystem, so readers observe either
/// the old content or the new content, never a partial write.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Path has no parent directory: {}", path.display()))?;
    ensure_dir(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    std::io::Write::write_all(&mut tmp, content)
        .with_context(|| format!("Failed to write temporary file for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist file: {}", path.display()))?;
    Ok(())
}

/// Recursively copy a directory tree, preserving relative structure.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;
    for entry in std::fs::read_dir(src)
        .with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else if file_type.is_symlink() {
            // Recreate the link rather than following it; engine bundles
            // ship relative symlinks between variant binaries.
            let link = std::fs::read_link(entry.path())?;
            if target.exists() {
                std::fs::remove_file(&target)?;
            }
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target).with_context(|| {
                format!("Failed to create symlink: {}", target.display())
            })?;
            #[cfg(not(unix))]
            std::fs::copy(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Remove a directory tree, tolerating a path that is already gone.
pub fn remove_dir_all(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove directory: {}", path.display())),
    }
}

/// Ensure a path tree ends up owned by the operating account.
///
/// Some orchestrator steps run with elevated privilege (package refresh,
/// service registration), so every component that creates files finishes by
/// handing ownership back to the low-privilege account. When the process is
/// not running as root this is a no-op: everything it created is already
/// owned correctly.
pub async fn repair_ownership(path: &Path, user: &str, group: &str) -> Result<()> {
    if !running_as_root().await {
        debug!(
            "Not running as root; skipping ownership repair for {}",
            path.display()
        );
        return Ok(());
    }
    if !path.exists() {
        return Ok(());
    }

    let spec = format!("{user}:{group}");
    let status = tokio::process::Command::new("chown")
        .arg("-R")
        .arg(&spec)
        .arg(path)
        .status()
        .await
        .with_context(|| format!("Failed to run chown on {}", path.display()))?;
    if !status.success() {
        // Ownership repair failing should not abort an otherwise good
        // update; the next run retries it.
        warn!("chown -R {} {} exited non-zero", spec, path.display());
    }
    Ok(())
}

async fn running_as_root() -> bool {
    match tokio::process::Command::new("id").arg("-u").output().await {
        Ok(out) => String::from_utf8_lossy(&out.stdout).trim() == "0",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_dir_creates_nested_paths() {
        let tmp = TempDir::new().unwrap();
        let deep = tmp.path().join("a/b/c");
        ensure_dir(&deep).unwrap();
        assert!(deep.is_dir());
        // Second call is a no-op
        ensure_dir(&deep).unwrap();
    }

    #[test]
    fn ensure_dir_rejects_file_at_path() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        assert!(ensure_dir(&file).is_err());
    }

    #[test]
    fn atomic_write_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("marker");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn atomic_write_creates_parent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state/last-success");
        atomic_write(&path, b"2024-01-01T00:00:00Z").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn copy_dir_all_preserves_structure() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("top.txt"), b"t").unwrap();
        std::fs::write(src.join("sub/nested.txt"), b"n").unwrap();

        let dst = tmp.path().join("dst");
        copy_dir_all(&src, &dst).unwrap();
        assert_eq!(std::fs::read(dst.join("top.txt")).unwrap(), b"t");
        assert_eq!(std::fs::read(dst.join("sub/nested.txt")).unwrap(), b"n");
    }

    #[test]
    fn remove_dir_all_tolerates_missing_path() {
        let tmp = TempDir::new().unwrap();
        remove_dir_all(&tmp.path().join("never-existed")).unwrap();
    }
}
