//! Local manifest cache
//!
//! The cache is a single JSON envelope holding the fetched entries plus
//! the fetch timestamp, written atomically (temp file + rename) so a
//! crash mid-write never leaves a truncated cache behind.

use crate::models::{Manifest, ManifestEntry};
use chrono::{DateTime, Utc};
use plugget_errors::{Error, ManifestError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const CACHE_FILE: &str = "manifest.json";

#[derive(Serialize, Deserialize)]
struct CacheEnvelope {
    fetched_at: DateTime<Utc>,
    entries: Vec<ManifestEntry>,
}

/// Disk cache for the manifest document
#[derive(Debug, Clone)]
pub struct ManifestCache {
    dir: PathBuf,
}

impl ManifestCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn cache_path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    /// Load the cached manifest and its fetch timestamp
    ///
    /// # Errors
    ///
    /// Returns `ManifestError::CacheMiss` if no cache file exists, or a
    /// format error if it cannot be parsed.
    pub async fn load(&self) -> Result<(Manifest, DateTime<Utc>), Error> {
        let path = self.cache_path();
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ManifestError::CacheMiss.into());
            }
            Err(e) => return Err(Error::io_with_path(&e, path)),
        };

        let envelope: CacheEnvelope =
            serde_json::from_str(&json).map_err(|e| ManifestError::InvalidFormat {
                message: format!("corrupt manifest cache: {e}"),
            })?;

        let entries_json = serde_json::to_string(&envelope.entries)?;
        let manifest = Manifest::from_json(&entries_json)?;
        Ok((manifest, envelope.fetched_at))
    }

    /// Save the manifest with its fetch timestamp
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created or the
    /// file cannot be written.
    pub async fn save(&self, manifest: &Manifest, fetched_at: DateTime<Utc>) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io_with_path(&e, self.dir.clone()))?;

        let envelope = CacheEnvelope {
            fetched_at,
            entries: manifest.entries().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&envelope)?;

        let path = self.cache_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json)
            .await
            .map_err(|e| Error::io_with_path(&e, tmp.clone()))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::io_with_path(&e, path))?;

        Ok(())
    }
}
