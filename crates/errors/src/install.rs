//! Installation error types

use std::borrow::Cow;

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, Error)]
pub enum InstallError {
    /// Not a failure: an identical request is already running.
    #[error("install already in progress for {id}")]
    AlreadyInProgress { id: String },

    #[error("{id} is not compatible with host version {host} (supported: {min} to {max})")]
    IncompatibleVersion {
        id: String,
        host: String,
        min: String,
        max: String,
    },

    #[error("{id} is not available for early access builds")]
    EarlyAccessExcluded { id: String },

    #[error("plugin not installed: {id}")]
    NotInstalled { id: String },

    #[error("extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("atomic operation failed: {message}")]
    AtomicOperationFailed { message: String },

    #[error("filesystem operation failed: {operation} on {path}: {message}")]
    FilesystemError {
        operation: String,
        path: String,
        message: String,
    },

    #[error("invalid install record at {path}: {message}")]
    InvalidRecord { path: String, message: String },

    #[error("installation cancelled")]
    Cancelled,

    #[error("task execution failed: {message}")]
    TaskError { message: String },
}

impl UserFacingError for InstallError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::AlreadyInProgress { id } => {
                Cow::Owned(format!("{id} is already being installed."))
            }
            Self::FilesystemError { path, message, .. } => {
                Cow::Owned(format!("Could not write to {path}: {message}"))
            }
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::IncompatibleVersion { .. } | Self::EarlyAccessExcluded { .. } => {
                Some("Check the plugin page for a build matching your editor version.")
            }
            Self::FilesystemError { .. } => {
                Some("Check free disk space and permissions on the plugin directory.")
            }
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::TaskError { .. })
    }
}
