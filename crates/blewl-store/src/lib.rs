//! # blewl-store
//!
//! Persistence for the BLE whitelist.
//!
//! This crate provides:
//! - `KvStore`, the byte-blob key/value engine abstraction
//! - `MemoryKv` (volatile) and `RedbKv` (durable, crash-consistent) engines
//! - `WhitelistStore`, the namespaced adapter that reads and writes the
//!   whitelist blob and the three legacy MAC slots
//!
//! All methods are synchronous; callers on an async runtime run them on the
//! blocking pool.

pub mod error;
pub mod kv;
pub mod redb_kv;
pub mod store;

pub use error::{KvError, StoreError};
pub use kv::{KvStore, MemoryKv};
pub use redb_kv::RedbKv;
pub use store::{WhitelistStore, DEFAULT_NAMESPACE, WHITELIST_KEY};
