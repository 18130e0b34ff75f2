//! Plugin identifier newtype

use plugget_errors::{Error, ManifestError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key naming a plugin, unique within the manifest.
///
/// The identifier doubles as the install directory name, so path
/// separators and relative-path segments are rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    /// Create a validated plugin identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is empty, names a dot
    /// directory, or contains path separators.
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();

        if id.is_empty() || id == "." || id == ".." {
            return Err(ManifestError::InvalidFormat {
                message: format!("invalid plugin identifier: {id:?}"),
            }
            .into());
        }
        if id.contains(['/', '\\']) || id.contains('\0') {
            return Err(ManifestError::InvalidFormat {
                message: format!("plugin identifier contains path separators: {id:?}"),
            }
            .into());
        }

        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
