//! Whitelist persistence adapter.
//!
//! Wraps a [`KvStore`] under a namespace and exposes exactly what the
//! synchronizer needs: the serialized whitelist blob and the three legacy
//! MAC slots. Each value lives under its own key, so a write to one slot can
//! never corrupt another.

use std::sync::Arc;

use blewl_core::{MacAddress, Slot};
use tracing::debug;

use crate::error::{KvError, StoreError};
use crate::kv::KvStore;

/// Key of the serialized whitelist blob.
pub const WHITELIST_KEY: &str = "whitelist";

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "mac_prefs";

/// Namespaced access to the persisted whitelist and slots.
#[derive(Clone)]
pub struct WhitelistStore {
    kv: Arc<dyn KvStore>,
    namespace: String,
}

impl WhitelistStore {
    /// Create an adapter storing keys as `<namespace>:<key>`.
    pub fn new(kv: Arc<dyn KvStore>, namespace: impl Into<String>) -> Self {
        Self {
            kv,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Load the bytes stored under `key`. Absence is `Ok(None)`.
    pub fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full = self.full_key(key);
        self.kv.get(&full).map_err(|e| read_error(full, e))
    }

    /// Durably overwrite the bytes stored under `key`.
    pub fn save(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let full = self.full_key(key);
        self.kv
            .set(&full, bytes)
            .map_err(|e| write_error(full.clone(), e))?;
        debug!(key = %full, bytes = bytes.len(), "Saved value");
        Ok(())
    }

    /// Load one legacy slot. Unwritten slots read as [`MacAddress::UNSET`].
    pub fn load_slot(&self, slot: Slot) -> Result<MacAddress, StoreError> {
        let Some(bytes) = self.load(slot.key())? else {
            return Ok(MacAddress::UNSET);
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            key: self.full_key(slot.key()),
            reason,
        };

        let text = String::from_utf8(bytes).map_err(|e| corrupt(e.to_string()))?;
        MacAddress::parse(&text).map_err(|e| corrupt(e.to_string()))
    }

    /// Persist one legacy slot in canonical string form.
    pub fn save_slot(&self, slot: Slot, mac: MacAddress) -> Result<(), StoreError> {
        self.save(slot.key(), mac.to_string().as_bytes())
    }

    /// Remove a slot so it reads as unset again.
    pub fn clear_slot(&self, slot: Slot) -> Result<(), StoreError> {
        let full = self.full_key(slot.key());
        self.kv.delete(&full).map_err(|e| write_error(full, e))
    }
}

/// An engine that could not be opened is unavailable for every key.
fn read_error(key: String, e: KvError) -> StoreError {
    match e {
        KvError::Open(_) => StoreError::Unavailable(e),
        source => StoreError::Read { key, source },
    }
}

fn write_error(key: String, e: KvError) -> StoreError {
    match e {
        KvError::Open(_) => StoreError::Unavailable(e),
        source => StoreError::Write { key, source },
    }
}

impl std::fmt::Debug for WhitelistStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
