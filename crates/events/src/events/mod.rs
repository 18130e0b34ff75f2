//! Domain-grouped application events

mod auth;
mod download;
mod general;
mod install;

pub use auth::AuthEvent;
pub use download::DownloadEvent;
pub use general::GeneralEvent;
pub use install::InstallEvent;

use serde::{Deserialize, Serialize};

/// Top-level event type carried on the event channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event")]
pub enum AppEvent {
    Download(DownloadEvent),
    Install(InstallEvent),
    Auth(AuthEvent),
    General(GeneralEvent),
}
