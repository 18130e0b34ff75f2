//! Checksum-keyed download cache
//!
//! Archives are cached under their manifest digest. A hit skips the
//! network entirely, but only after the cached bytes re-verify against
//! the digest; anything that fails verification is evicted. The cache
//! is pruned oldest-first above a configurable size budget.

use crate::digest::hash_file;
use plugget_errors::Error;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

/// Content-addressed archive cache
#[derive(Debug, Clone)]
pub struct DownloadCache {
    dir: PathBuf,
    max_bytes: u64,
}

impl DownloadCache {
    /// Default cache budget: 1GiB, matching typical plugin archive sizes
    pub const DEFAULT_MAX_BYTES: u64 = 1024 * 1024 * 1024;

    pub fn new(dir: impl AsRef<Path>, max_bytes: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_bytes,
        }
    }

    fn entry_path(&self, checksum: &str) -> PathBuf {
        self.dir.join(checksum.to_ascii_lowercase())
    }

    /// Look up an archive by digest, re-verifying its content
    ///
    /// Returns the cached path on a verified hit. A cached file whose
    /// recomputed digest no longer matches is evicted and treated as a
    /// miss.
    ///
    /// # Errors
    ///
    /// Returns an error only on filesystem failures other than the
    /// entry being absent.
    pub async fn lookup(&self, checksum: &str) -> Result<Option<PathBuf>, Error> {
        let path = self.entry_path(checksum);
        if fs::metadata(&path).await.is_err() {
            return Ok(None);
        }

        let actual = hash_file(&path).await?;
        if !actual.eq_ignore_ascii_case(checksum) {
            let _ = fs::remove_file(&path).await;
            return Ok(None);
        }

        touch(&path);
        Ok(Some(path))
    }

    /// Copy a verified download into the cache and prune to budget
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the
    /// copy fails.
    pub async fn insert(&self, checksum: &str, src: &Path) -> Result<PathBuf, Error> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io_with_path(&e, self.dir.clone()))?;

        let path = self.entry_path(checksum);
        fs::copy(src, &path)
            .await
            .map_err(|e| Error::io_with_path(&e, path.clone()))?;
        touch(&path);

        self.prune().await?;
        Ok(path)
    }

    /// Remove oldest entries until the cache fits its budget
    async fn prune(&self) -> Result<(), Error> {
        let mut entries = Vec::new();
        let mut total: u64 = 0;

        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(_) => return Ok(()),
        };
        while let Some(entry) = dir.next_entry().await? {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            total += metadata.len();
            entries.push((entry.path(), metadata.len(), modified));
        }

        entries.sort_by_key(|(_, _, modified)| *modified);

        let mut oldest_first = entries.into_iter();
        while total > self.max_bytes {
            let Some((path, len, _)) = oldest_first.next() else {
                break;
            };
            if fs::remove_file(&path).await.is_ok() {
                total -= len;
            }
        }

        Ok(())
    }
}

/// Bump the entry's mtime so pruning tracks recency of use
fn touch(path: &Path) {
    if let Ok(file) = std::fs::File::options().write(true).open(path) {
        let _ = file.set_modified(SystemTime::now());
    }
}
