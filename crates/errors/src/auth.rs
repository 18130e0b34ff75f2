//! Authentication and credential error types

use std::borrow::Cow;

use thiserror::Error;

use crate::UserFacingError;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No credential is held; an interactive login is needed.
    #[error("not signed in")]
    Required,

    /// The refresh token was rejected; the session is over.
    #[error("session expired: {reason}")]
    Expired { reason: String },

    /// The server rejected a token that looked valid locally.
    #[error("access token rejected by server (HTTP {status})")]
    Rejected { status: u16 },

    #[error("login failed: {reason}")]
    LoginFailed { reason: String },

    #[error("secure storage error: {message}")]
    SecretStore { message: String },
}

impl UserFacingError for AuthError {
    fn user_message(&self) -> Cow<'_, str> {
        match self {
            Self::Required => Cow::Borrowed("You need to sign in before installing plugins."),
            Self::Expired { .. } => {
                Cow::Borrowed("Your session has expired. Please sign in again.")
            }
            _ => Cow::Owned(self.to_string()),
        }
    }

    fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::Required | Self::Expired { .. } => Some("Run `plugget login`."),
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        // A rejected token is retried exactly once, by the install
        // manager, after a forced refresh. Never blindly.
        false
    }
}
