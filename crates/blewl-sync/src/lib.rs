//! # blewl-sync
//!
//! Whitelist synchronizer with a pluggable transport.
//!
//! The [`Synchronizer`] owns the live whitelist: it restores it from storage
//! on start, replaces it wholesale on every valid remote update, persists it
//! back, and hands immutable snapshots to the scanning pipeline.
//!
//! Enable features based on target platform:
//! - `tokio-runtime` (default) - in-process [`LocalBroker`] transport

pub mod config;
pub mod diagnostics;
pub mod stats;
pub mod synchronizer;
pub mod topic;
pub mod transport;

#[cfg(feature = "tokio-runtime")]
pub mod broker;
#[cfg(feature = "tokio-runtime")]
pub mod subscription;

pub use config::{SyncConfig, SyncMode};
pub use diagnostics::Diagnostics;
pub use stats::{StatisticsSnapshot, SyncStatistics};
pub use synchronizer::{SyncError, SyncState, Synchronizer, UpdateReport};
pub use topic::{TopicError, TopicFilter};
pub use transport::{MessageSink, Startable, Transport, TransportError};

#[cfg(feature = "tokio-runtime")]
pub use broker::{LocalBroker, Publisher};

pub use blewl_core::{MacAddress, Slot, Whitelist, WhitelistEntry};
