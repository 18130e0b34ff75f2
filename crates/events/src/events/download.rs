use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Download-specific events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DownloadEvent {
    /// Download started with connection info
    Started {
        url: String,
        total_size: Option<u64>,
        supports_resume: bool,
    },

    /// Download progress update, throttled by the session
    Progress {
        url: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// Download resuming from a previous partial transfer
    Resuming { url: String, offset: u64 },

    /// Download retrying after a transient failure
    Retrying {
        url: String,
        attempt: u32,
        max_attempts: u32,
        backoff_delay: Duration,
    },

    /// Download completed successfully
    Completed { url: String, final_size: u64 },

    /// Package bytes served from the local download cache
    CacheHit { url: String, checksum: String },

    /// Download failed with a categorized error
    Failed { url: String, error: String },
}
