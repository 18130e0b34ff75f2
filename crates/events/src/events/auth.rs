use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Credential lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthEvent {
    /// Access token expired or was rejected; refresh round-trip started
    Refreshing,

    /// Refresh succeeded
    Refreshed { expires_at: DateTime<Utc> },

    /// Credential discarded after a server-side rejection
    Invalidated,

    /// No usable credential; interactive login needed
    LoginRequired,
}
