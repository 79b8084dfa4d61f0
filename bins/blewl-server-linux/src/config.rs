//! Service settings.
//!
//! Settings are read from a JSON file (`~/.blewl/settings.json` unless a path
//! is given on the command line or in `BLEWL_CONFIG`). Every key is optional;
//! a missing file yields the defaults.
//!
//! ```json
//! {
//!   "componentName": "ble-whitelist",
//!   "topic": "ble/whitelist",
//!   "mode": "full",
//!   "databasePath": "/var/lib/blewl/whitelist.redb",
//!   "housekeepingSecs": 30,
//!   "httpAddr": "127.0.0.1:3080",
//!   "slots": ["aa:bb:cc:dd:ee:01"]
//! }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use blewl_store::DEFAULT_NAMESPACE;
use blewl_sync::{SyncConfig, SyncMode};
use serde::Deserialize;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "BLEWL_CONFIG";
/// Overrides `topic`.
pub const TOPIC_ENV: &str = "BLEWL_TOPIC";
/// Overrides `databasePath`.
pub const DB_ENV: &str = "BLEWL_DB";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfig {
    pub component_name: String,

    /// Empty disables remote updates.
    pub topic: String,

    pub mode: SyncMode,

    pub database_path: PathBuf,

    /// Key prefix inside the database.
    pub namespace: String,

    /// Interval of the durability retry.
    pub housekeeping_secs: u64,

    pub http_addr: SocketAddr,

    /// MACs provisioned into the legacy slots at start, in slot order.
    pub slots: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            component_name: "ble-whitelist".to_string(),
            topic: "ble/whitelist".to_string(),
            mode: SyncMode::Full,
            database_path: data_dir().join("whitelist.redb"),
            namespace: DEFAULT_NAMESPACE.to_string(),
            housekeeping_secs: 30,
            http_addr: SocketAddr::from(([127, 0, 0, 1], 3080)),
            slots: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load settings from `path`, or from the default location when `None`.
    pub fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| data_dir().join("settings.json"));

        let config = Self::from_file(&path)?.with_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse the settings file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        tracing::info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(topic) = lookup(TOPIC_ENV) {
            self.topic = topic;
        }
        if let Some(path) = lookup(DB_ENV) {
            self.database_path = PathBuf::from(path);
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.component_name.is_empty() {
            bail!("componentName must not be empty");
        }
        if self.slots.len() > 3 {
            bail!("At most 3 slots can be provisioned, got {}", self.slots.len());
        }
        Ok(())
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new(self.component_name.clone(), self.topic.clone()).with_mode(self.mode)
    }
}

/// `~/.blewl`, or the working directory when `HOME` is unset.
fn data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".blewl"))
        .unwrap_or_else(|| PathBuf::from("."))
}
