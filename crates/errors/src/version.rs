//! Version parsing error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VersionError {
    /// The version string did not match any known shape. Unparseable
    /// versions are treated as incompatible, never silently allowed.
    #[error("unrecognized version string: {input}")]
    UnknownVersion { input: String },
}
