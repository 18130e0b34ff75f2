use plugget_types::PluginId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Install pipeline events, the progress surface consumed by the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstallEvent {
    /// Install accepted and queued
    Queued { id: PluginId },

    /// Archive transfer in progress
    Downloading { id: PluginId, percent: f64 },

    /// Archive validated, extraction to staging in progress
    Extracting { id: PluginId },

    /// Plugin live at its install path
    Installed {
        id: PluginId,
        version: String,
        path: PathBuf,
    },

    /// Plugin removed
    Uninstalled { id: PluginId },

    /// Install failed; `reason` is already user-presentable
    Failed { id: PluginId, reason: String },
}
