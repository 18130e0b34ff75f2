#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Plugin manifest for plugget
//!
//! The manifest is the remote index mapping plugin identifiers to
//! download locations and compatibility metadata. It is consumed
//! read-only and cached locally with a freshness window so the editor
//! stays usable when the endpoint is briefly unreachable.

mod cache;
mod models;

pub use cache::ManifestCache;
pub use models::{Manifest, ManifestEntry};

use chrono::{DateTime, Duration, Utc};
use plugget_errors::{Error, ManifestError};
use plugget_types::PluginId;
use std::path::Path;

/// Manifest manager: holds the active manifest plus its disk cache
#[derive(Clone)]
pub struct ManifestStore {
    manifest: Option<Manifest>,
    fetched_at: Option<DateTime<Utc>>,
    cache: ManifestCache,
}

impl ManifestStore {
    /// Create a new manifest store with the given cache directory
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            manifest: None,
            fetched_at: None,
            cache: ManifestCache::new(cache_dir),
        }
    }

    /// Install freshly fetched manifest JSON, replacing the active
    /// manifest and updating the disk cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the document fails to parse or validate, or
    /// if the cache cannot be written.
    pub async fn update(&mut self, json: &str) -> Result<(), Error> {
        let manifest = Manifest::from_json(json)?;
        manifest.validate()?;

        let now = Utc::now();
        self.cache.save(&manifest, now).await?;
        self.manifest = Some(manifest);
        self.fetched_at = Some(now);
        Ok(())
    }

    /// Load the cached manifest from disk
    ///
    /// # Errors
    ///
    /// Returns `ManifestError::CacheMiss` if no cache exists, or a
    /// format error if the cached document is damaged.
    pub async fn load_cached(&mut self) -> Result<(), Error> {
        let (manifest, fetched_at) = self.cache.load().await?;
        manifest.validate()?;
        self.manifest = Some(manifest);
        self.fetched_at = Some(fetched_at);
        Ok(())
    }

    /// Whether the active manifest is older than `max_age` (or absent)
    #[must_use]
    pub fn is_stale(&self, max_age: Duration) -> bool {
        match self.fetched_at {
            Some(fetched_at) => Utc::now() - fetched_at > max_age,
            None => true,
        }
    }

    /// Resolve a plugin identifier to its manifest entry
    ///
    /// # Errors
    ///
    /// Returns `ManifestError::UnknownPlugin` if the identifier is not
    /// listed, or `CacheMiss` if no manifest has been loaded at all.
    pub fn resolve(&self, id: &PluginId) -> Result<&ManifestEntry, Error> {
        let manifest = self.manifest.as_ref().ok_or(ManifestError::CacheMiss)?;
        manifest.get(id).ok_or_else(|| {
            ManifestError::UnknownPlugin {
                id: id.to_string(),
            }
            .into()
        })
    }

    /// The active manifest, if one has been loaded
    #[must_use]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }
}
