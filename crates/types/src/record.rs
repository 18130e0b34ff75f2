//! Durable record of an installed plugin

use crate::PluginId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The record is written inside the staging directory before the atomic
/// swap, so it exists if and only if a complete, validated plugin
/// directory exists at its recorded path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub id: PluginId,
    pub version: String,
    pub path: PathBuf,
    pub installed_at: DateTime<Utc>,
}

impl InstallRecord {
    /// File name of the record inside the installed plugin directory.
    pub const FILE_NAME: &'static str = ".plugget-record.json";
}
