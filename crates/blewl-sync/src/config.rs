//! Synchronizer configuration.

use serde::{Deserialize, Serialize};

/// Which representation the synchronizer maintains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// JSON whitelist kept in sync with the remote topic.
    #[default]
    Full,
    /// Three legacy MAC slots loaded once at start; no remote updates.
    Slots,
}

/// Configuration for a [`Synchronizer`](crate::Synchronizer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Identity tag used in logs and diagnostics.
    pub component_name: String,

    /// Topic filter carrying whitelist updates. Empty disables remote updates.
    #[serde(default)]
    pub topic: String,

    #[serde(default)]
    pub mode: SyncMode,
}

impl SyncConfig {
    pub fn new(component_name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            topic: topic.into(),
            mode: SyncMode::Full,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }
}
