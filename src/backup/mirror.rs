//! Delta mirror of a directory tree.
//!
//! Mirror semantics: after [`mirror_tree`] returns, the destination holds
//! exactly the files of the source (minus excluded prefixes) — unchanged
//! files are not re-copied, changed files are, and files that disappeared
//! from the source are deleted from the destination. This is what keeps the
//! rolling snapshot cheap on a device where almost nothing changes between
//! updates.
//!
//! A file counts as changed when its size differs or its modification time
//! is newer than the mirror copy's.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Counters for one mirror pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorStats {
    /// Files copied (new or changed)
    pub copied: usize,
    /// Files left alone (unchanged)
    pub unchanged: usize,
    /// Destination entries deleted (gone from the source or excluded)
    pub deleted: usize,
}

/// Mirror `src` into `dst`, excluding the given source-relative prefixes.
///
/// Exclusions apply to both directions: excluded paths are neither copied
/// nor allowed to linger in the destination.
pub fn mirror_tree(src: &Path, dst: &Path, exclude: &[PathBuf]) -> Result<MirrorStats> {
    let mut stats = MirrorStats::default();
    std::fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create mirror root: {}", dst.display()))?;

    // Copy pass: walk the source, skipping excluded subtrees entirely.
    let mut walker = WalkDir::new(src).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.context("Failed to walk source tree")?;
        let Ok(rel) = entry.path().strip_prefix(src).map(Path::to_path_buf) else {
            continue;
        };
        if is_excluded(&rel, exclude) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        let target = dst.join(&rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
        } else if needs_copy(entry.path(), &target)? {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            // A file may replace a directory (or vice versa) between runs
            if target.is_dir() {
                std::fs::remove_dir_all(&target)?;
            }
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), target.display())
            })?;
            stats.copied += 1;
        } else {
            stats.unchanged += 1;
        }
    }

    // Deletion pass: anything in the mirror that no longer exists in the
    // source (or is excluded) goes away.
    let mut dead: Vec<(PathBuf, bool)> = Vec::new();
    for entry in WalkDir::new(dst).min_depth(1) {
        let entry = entry.context("Failed to walk mirror tree")?;
        let Ok(rel) = entry.path().strip_prefix(dst).map(Path::to_path_buf) else {
            continue;
        };
        let source = src.join(&rel);
        if is_excluded(&rel, exclude) || !source.exists() {
            dead.push((entry.path().to_path_buf(), entry.file_type().is_dir()));
        }
    }
    // Deepest first so directories empty out before removal
    dead.sort_by(|a, b| b.0.components().count().cmp(&a.0.components().count()));
    for (path, is_dir) in dead {
        let result = if is_dir {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => stats.deleted += 1,
            // Already removed along with a parent
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", path.display()));
            }
        }
    }

    debug!(
        "Mirror {} -> {}: {} copied, {} unchanged, {} deleted",
        src.display(),
        dst.display(),
        stats.copied,
        stats.unchanged,
        stats.deleted
    );
    Ok(stats)
}

fn is_excluded(rel: &Path, exclude: &[PathBuf]) -> bool {
    exclude.iter().any(|prefix| rel.starts_with(prefix))
}

fn needs_copy(src: &Path, dst: &Path) -> Result<bool> {
    let Ok(dst_meta) = dst.metadata() else {
        return Ok(true);
    };
    let src_meta = src
        .metadata()
        .with_context(|| format!("Failed to stat {}", src.display()))?;
    if src_meta.len() != dst_meta.len() {
        return Ok(true);
    }
    match (src_meta.modified(), dst_meta.modified()) {
        (Ok(s), Ok(d)) => Ok(s > d),
        // No usable mtimes: copy to be safe
        _ => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn first_pass_copies_everything() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.txt"), "a");
        write(&src.join("sub/b.txt"), "b");

        let dst = tmp.path().join("dst");
        let stats = mirror_tree(&src, &dst, &[]).unwrap();
        assert_eq!(stats.copied, 2);
        assert!(dst.join("sub/b.txt").exists());
    }

    #[test]
    fn unchanged_files_are_not_recopied() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.txt"), "a");

        let dst = tmp.path().join("dst");
        mirror_tree(&src, &dst, &[]).unwrap();
        let stats = mirror_tree(&src, &dst, &[]).unwrap();
        assert_eq!(stats.copied, 0);
        assert_eq!(stats.unchanged, 1);
    }

    #[test]
    fn changed_files_are_recopied() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("a.txt"), "a");

        let dst = tmp.path().join("dst");
        mirror_tree(&src, &dst, &[]).unwrap();
        write(&src.join("a.txt"), "different length");
        let stats = mirror_tree(&src, &dst, &[]).unwrap();
        assert_eq!(stats.copied, 1);
        assert_eq!(
            std::fs::read_to_string(dst.join("a.txt")).unwrap(),
            "different length"
        );
    }

    #[test]
    fn deletions_propagate() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("keep.txt"), "k");
        write(&src.join("gone/old.txt"), "o");

        let dst = tmp.path().join("dst");
        mirror_tree(&src, &dst, &[]).unwrap();
        std::fs::remove_dir_all(src.join("gone")).unwrap();

        mirror_tree(&src, &dst, &[]).unwrap();
        assert!(dst.join("keep.txt").exists());
        assert!(!dst.join("gone").exists());
    }

    #[test]
    fn excluded_prefixes_are_skipped_and_purged() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        write(&src.join("code.py"), "pass");
        write(&src.join("engines/x86_64/stockfish"), "binary");
        write(&src.join("books/opening.bin"), "book");

        let dst = tmp.path().join("dst");
        let exclude = vec![PathBuf::from("engines"), PathBuf::from("books")];
        mirror_tree(&src, &dst, &exclude).unwrap();
        assert!(dst.join("code.py").exists());
        assert!(!dst.join("engines").exists());
        assert!(!dst.join("books").exists());

        // A stale excluded path in the mirror is cleaned up too
        write(&dst.join("engines/leftover"), "stale");
        mirror_tree(&src, &dst, &exclude).unwrap();
        assert!(!dst.join("engines").exists());
    }
}
