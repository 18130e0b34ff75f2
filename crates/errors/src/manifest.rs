//! Manifest error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    #[error("plugin not found in manifest: {id}")]
    UnknownPlugin { id: String },

    #[error("invalid manifest: {message}")]
    InvalidFormat { message: String },

    #[error("no cached manifest available")]
    CacheMiss,
}
