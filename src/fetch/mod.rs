//! Bundle archive download and extraction.
//!
//! Downloads stream to a scratch file with a generous but finite timeout and
//! a capped exponential retry for transient network failures. Archives are
//! gzip-compressed tar, packaged without an enclosing top-level directory,
//! so the extraction target is the bundle destination itself.
//!
//! Extraction and hashing are blocking work and run on the blocking pool.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, warn};

use crate::constants::{
    FETCH_ATTEMPTS, FETCH_BACKOFF_BASE, FETCH_BACKOFF_FACTOR_MS, FETCH_TIMEOUT,
};
use crate::core::GambitError;

/// Build the HTTP client used for bundle downloads.
pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Download a URL to a file, retrying transient failures.
///
/// The scratch file is created (or truncated) on each attempt; callers own
/// its lifecycle and must remove it on both success and failure paths.
pub async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let strategy = ExponentialBackoff::from_millis(FETCH_BACKOFF_BASE)
        .factor(FETCH_BACKOFF_FACTOR_MS)
        .take(FETCH_ATTEMPTS - 1);
    let mut attempt = 0usize;
    Retry::spawn(strategy, || {
        attempt += 1;
        if attempt > 1 {
            warn!("Retrying download of {url} (attempt {attempt}/{FETCH_ATTEMPTS})");
        }
        download_once(client, url, dest)
    })
    .await
}

async fn download_once(client: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    debug!("Downloading {url} to {}", dest.display());
    let mut response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Request failed: {url}"))?
        .error_for_status()
        .with_context(|| format!("Server rejected request: {url}"))?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("Failed to create scratch file: {}", dest.display()))?;
    while let Some(chunk) = response
        .chunk()
        .await
        .with_context(|| format!("Connection interrupted while downloading {url}"))?
    {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

/// Compute the SHA-256 digest of a file as lowercase hex.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String> {
        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .context("Hashing task failed")?
}

/// Verify a downloaded archive against an expected digest.
pub async fn verify_sha256(path: &Path, bundle: &str, expected: &str) -> Result<()> {
    let actual = sha256_file(path).await?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(GambitError::ChecksumMismatch {
            bundle: bundle.to_string(),
            expected: expected.to_string(),
            actual,
        }
        .into())
    }
}

/// Extract a gzip-compressed tar archive into a destination directory.
pub async fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let archive: PathBuf = archive.to_path_buf();
    let dest: PathBuf = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&archive)
            .with_context(|| format!("Failed to open archive {}", archive.display()))?;
        let decoder = flate2::read::GzDecoder::new(file);
        let mut tar = tar::Archive::new(decoder);
        tar.unpack(&dest)
            .with_context(|| format!("Failed to extract archive into {}", dest.display()))?;
        Ok(())
    })
    .await
    .context("Extraction task failed")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a tar.gz of a directory's contents (no enclosing directory),
    /// the way bundles are packaged.
    fn pack_tar_gz(src: &Path, archive: &Path) {
        let file = std::fs::File::create(archive).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", src).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[tokio::test]
    async fn extraction_lands_directly_in_destination() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("payload");
        std::fs::create_dir_all(src.join("bin")).unwrap();
        std::fs::write(src.join("bin/engine"), b"\x7fELF").unwrap();
        std::fs::write(src.join("notes.txt"), b"opening book notes").unwrap();

        let archive = tmp.path().join("bundle.tar.gz");
        pack_tar_gz(&src, &archive);

        let dest = tmp.path().join("installed");
        std::fs::create_dir_all(&dest).unwrap();
        extract_tar_gz(&archive, &dest).await.unwrap();

        assert_eq!(std::fs::read(dest.join("bin/engine")).unwrap(), b"\x7fELF");
        assert_eq!(std::fs::read(dest.join("notes.txt")).unwrap(), b"opening book notes");
    }

    #[tokio::test]
    async fn corrupt_archive_fails_extraction() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("corrupt.tar.gz");
        std::fs::write(&archive, b"this is not a gzip stream").unwrap();

        let dest = tmp.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        assert!(extract_tar_gz(&archive, &dest).await.is_err());
    }

    #[tokio::test]
    async fn sha256_verification_accepts_matching_digest() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data");
        std::fs::write(&path, b"gambit accepted").unwrap();

        let digest = sha256_file(&path).await.unwrap();
        verify_sha256(&path, "books", &digest).await.unwrap();
        verify_sha256(&path, "books", &digest.to_uppercase()).await.unwrap();
    }

    #[tokio::test]
    async fn sha256_verification_rejects_mismatch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data");
        std::fs::write(&path, b"gambit declined").unwrap();

        let err = verify_sha256(&path, "books", &"0".repeat(64)).await.unwrap_err();
        let gambit = err.downcast_ref::<GambitError>().unwrap();
        assert!(matches!(gambit, GambitError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn download_fails_cleanly_when_unreachable() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("scratch");
        // The discard port is closed: connection refused immediately
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap();
        let result = download(&client, "http://127.0.0.1:9/bundle.tar.gz", &dest).await;
        assert!(result.is_err());
    }
}
