//! Manifest data models

use plugget_errors::{Error, ManifestError};
use plugget_types::{HostVersion, PluginId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One plugin listing from the manifest endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(rename = "identifier")]
    pub id: PluginId,
    /// Human-readable display name
    pub name: String,
    /// Plugin release version, recorded on install
    #[serde(default)]
    pub version: String,
    /// Package endpoint serving the archive
    pub url: String,
    /// Hex-encoded BLAKE3 digest of the archive bytes
    pub checksum: String,
    /// Inclusive lower bound of supported host versions
    pub min_version: String,
    /// Inclusive upper bound of supported host versions
    pub max_version: String,
    /// Reject early access hosts even when numerically in range
    #[serde(default)]
    pub exclude_early_access: bool,
}

/// The manifest document: a read-only set of entries keyed by identifier
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: HashMap<PluginId, ManifestEntry>,
}

impl Manifest {
    /// Parse a manifest from the endpoint's JSON document (an array of
    /// entries)
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or an identifier is
    /// duplicated.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(json).map_err(|e| ManifestError::InvalidFormat {
                message: format!("invalid manifest JSON: {e}"),
            })?;

        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            let id = entry.id.clone();
            if map.insert(id.clone(), entry).is_some() {
                return Err(ManifestError::InvalidFormat {
                    message: format!("duplicate plugin identifier: {id}"),
                }
                .into());
            }
        }

        Ok(Self { entries: map })
    }

    /// Serialize back to the endpoint's array form, sorted by identifier
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        let mut entries: Vec<&ManifestEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        serde_json::to_string_pretty(&entries).map_err(|e| {
            ManifestError::InvalidFormat {
                message: format!("failed to serialize manifest: {e}"),
            }
            .into()
        })
    }

    /// Validate every entry
    ///
    /// # Errors
    ///
    /// Returns an error if a URL or checksum is missing or malformed,
    /// or a version bound does not parse. Bad bounds are rejected here
    /// rather than at compatibility-check time so a damaged manifest
    /// surfaces immediately.
    pub fn validate(&self) -> Result<(), Error> {
        for (id, entry) in &self.entries {
            if entry.url.is_empty() {
                return Err(ManifestError::InvalidFormat {
                    message: format!("missing download URL for {id}"),
                }
                .into());
            }

            if !matches!(hex::decode(&entry.checksum), Ok(bytes) if bytes.len() == 32) {
                return Err(ManifestError::InvalidFormat {
                    message: format!("invalid checksum for {id}: not a 32-byte hex digest"),
                }
                .into());
            }

            for bound in [&entry.min_version, &entry.max_version] {
                if bound.parse::<HostVersion>().is_err() {
                    return Err(ManifestError::InvalidFormat {
                        message: format!("invalid version bound {bound:?} for {id}"),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Look up an entry by identifier
    #[must_use]
    pub fn get(&self, id: &PluginId) -> Option<&ManifestEntry> {
        self.entries.get(id)
    }

    /// Iterate all entries in identifier order
    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        let mut entries: Vec<&ManifestEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries.into_iter()
    }

    /// Number of listed plugins
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
