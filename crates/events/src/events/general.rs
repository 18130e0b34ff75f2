use serde::{Deserialize, Serialize};

/// Cross-cutting events that belong to no single domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeneralEvent {
    Debug { message: String },
    Warning { message: String },
}
