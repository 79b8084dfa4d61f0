//! Key/value engine abstraction.
//!
//! The whitelist only needs atomic get/put/delete of named byte blobs, so
//! engines are interchangeable:
//! - `MemoryKv` for tests and as a volatile fallback
//! - `RedbKv` for durable storage on Linux
//!
//! All methods are synchronous to support embedded platforms.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::KvError;

/// Byte-blob key/value engine.
///
/// Each `set` must be atomic: after a crash a key holds either its old or its
/// new value, never a torn write.
pub trait KvStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Overwrite the value for a key.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// In-memory engine. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryKv {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.data.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), KvError> {
        self.data.write().remove(key);
        Ok(())
    }
}
