//! Whitelist synchronizer.
//!
//! The synchronizer is the single owner of the live whitelist. It is entered
//! from three places that may run on different threads:
//! - the transport's message callback (`on_message`)
//! - the housekeeping tick (`tick`)
//! - the scanning pipeline (`snapshot`, `contains`, `get_slot`)
//!
//! Updates are copy-on-write: the new whitelist is decoded off to the side and
//! published with a single `Arc` swap. Readers only ever take the read lock
//! around that pointer, so decoding and persisting never block them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blewl_core::{codec, DecodeError, LegacySlots, MacAddress, Slot, Whitelist};
use blewl_store::{WhitelistStore, WHITELIST_KEY};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{SyncConfig, SyncMode};
use crate::diagnostics::Diagnostics;
use crate::stats::SyncStatistics;
use crate::topic::TopicFilter;
use crate::transport::{MessageSink, Startable, Transport, TransportError};

/// Lifecycle of the live whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// `start` has not run yet; the whitelist is empty.
    Uninitialized,
    /// Restored from storage (possibly empty); no remote update applied yet.
    Loaded,
    /// At least one remote update has been applied.
    Synchronized,
}

impl SyncState {
    /// True when the scanning pipeline may rely on the whitelist.
    pub fn is_active(self) -> bool {
        !matches!(self, SyncState::Uninitialized)
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncState::Uninitialized => "uninitialized",
            SyncState::Loaded => "loaded",
            SyncState::Synchronized => "synchronized",
        };
        f.write_str(name)
    }
}

/// Errors returned by the synchronizer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Synchronizer already started")]
    AlreadyStarted,

    #[error("Synchronizer not started")]
    NotStarted,

    #[error("Whitelist is read-only in slot mode")]
    ReadOnly,

    #[error("Invalid update: {0}")]
    Decode(#[from] DecodeError),

    #[error("Subscription failed: {0}")]
    Transport(#[from] TransportError),
}

/// Outcome of an accepted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    /// Entries in the published whitelist.
    pub entries: usize,
    /// Entries dropped as malformed.
    pub skipped: usize,
    /// Whether the new whitelist reached storage.
    pub persisted: bool,
}

/// Owner of the live whitelist. Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    config: SyncConfig,
    /// Parsed `config.topic`; None when remote updates are disabled.
    filter: Option<TopicFilter>,
    store: WhitelistStore,
    /// Handed over to the subscription on start.
    transport: Mutex<Option<Arc<dyn Transport>>>,
    current: RwLock<Arc<Whitelist>>,
    slots: RwLock<LegacySlots>,
    state: RwLock<SyncState>,
    /// Serializes writers so the persisted order equals the publish order.
    writer: Mutex<()>,
    /// False while the published whitelist has not reached storage.
    durable: AtomicBool,
    stats: SyncStatistics,
}

impl Synchronizer {
    /// Create a synchronizer. Nothing is loaded until [`Startable::start`].
    ///
    /// An unparsable topic is logged and treated as "no topic".
    pub fn new(config: SyncConfig, store: WhitelistStore) -> Self {
        let filter = if config.topic.is_empty() {
            None
        } else {
            match TopicFilter::new(&config.topic) {
                Ok(filter) => Some(filter),
                Err(e) => {
                    error!(
                        component = %config.component_name,
                        topic = %config.topic,
                        error = %e,
                        "Invalid topic filter, remote updates disabled"
                    );
                    None
                }
            }
        };

        Self {
            inner: Arc::new(Inner {
                config,
                filter,
                store,
                transport: Mutex::new(None),
                current: RwLock::new(Arc::new(Whitelist::new())),
                slots: RwLock::new(LegacySlots::new()),
                state: RwLock::new(SyncState::Uninitialized),
                writer: Mutex::new(()),
                durable: AtomicBool::new(true),
                stats: SyncStatistics::new(),
            }),
        }
    }

    /// Attach the transport used to subscribe on start.
    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        *self.inner.transport.lock() = Some(transport);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn component_name(&self) -> &str {
        &self.inner.config.component_name
    }

    pub fn state(&self) -> SyncState {
        *self.inner.state.read()
    }

    /// False while a persist is outstanding.
    pub fn is_durable(&self) -> bool {
        self.inner.durable.load(Ordering::Acquire)
    }

    pub fn statistics(&self) -> &SyncStatistics {
        &self.inner.stats
    }

    /// Immutable view of the current whitelist.
    pub fn snapshot(&self) -> Arc<Whitelist> {
        self.inner.current.read().clone()
    }

    /// True if `mac`, in any accepted notation, is whitelisted.
    ///
    /// Unparsable input never matches.
    pub fn contains(&self, mac: &str) -> bool {
        match MacAddress::parse(mac) {
            Ok(mac) => self.contains_mac(&mac),
            Err(_) => false,
        }
    }

    pub fn contains_mac(&self, mac: &MacAddress) -> bool {
        self.snapshot().contains(mac)
    }

    /// Legacy slot value as loaded at start; unset slots read as the sentinel.
    pub fn get_slot(&self, slot: Slot) -> MacAddress {
        self.inner.slots.read().get(slot)
    }

    pub fn slots(&self) -> LegacySlots {
        *self.inner.slots.read()
    }

    /// True if `topic` is covered by the configured subscription.
    pub fn accepts_topic(&self, topic: &str) -> bool {
        self.inner
            .filter
            .as_ref()
            .is_some_and(|filter| filter.matches(topic))
    }

    /// Decode `payload` and, if valid, replace and persist the whitelist.
    ///
    /// Refused with [`SyncError::NotStarted`] until [`Startable::start`] ran.
    /// A structurally invalid payload leaves the current whitelist untouched.
    /// A failed persist does not roll back the published whitelist; the
    /// housekeeping tick retries it.
    pub fn apply_update(&self, payload: &[u8]) -> Result<UpdateReport, SyncError> {
        let inner = &self.inner;
        if inner.config.mode == SyncMode::Slots {
            return Err(SyncError::ReadOnly);
        }

        let _writer = inner.writer.lock();
        if self.state() == SyncState::Uninitialized {
            return Err(SyncError::NotStarted);
        }

        let report = match codec::decode_report(payload) {
            Ok(report) => report,
            Err(e) => {
                inner.stats.record_rejected();
                error!(
                    component = %inner.config.component_name,
                    error = %e,
                    "Rejected whitelist update, keeping last known-good whitelist"
                );
                return Err(e.into());
            }
        };

        for skipped in &report.skipped {
            warn!(
                component = %inner.config.component_name,
                error = %skipped,
                "Skipping malformed whitelist entry"
            );
        }

        let whitelist = Arc::new(report.whitelist);
        let encoded = codec::encode(&whitelist);
        let entries = whitelist.len();

        self.publish(whitelist, SyncState::Synchronized);
        inner.stats.record_applied();
        info!(
            component = %inner.config.component_name,
            entries,
            skipped = report.skipped.len(),
            "Applied whitelist update"
        );

        let persisted = self.persist(&encoded);

        Ok(UpdateReport {
            entries,
            skipped: report.skipped.len(),
            persisted,
        })
    }

    /// Housekeeping: retry an outstanding persist.
    ///
    /// Skips the attempt while an update is in flight. Returns whether the
    /// current whitelist is durable afterwards.
    pub fn tick(&self) -> bool {
        if self.is_durable() {
            return true;
        }

        let Some(_writer) = self.inner.writer.try_lock() else {
            debug!(
                component = %self.inner.config.component_name,
                "Update in progress, deferring persist retry"
            );
            return false;
        };

        let encoded = codec::encode(&self.snapshot());
        let persisted = self.persist(&encoded);
        if persisted {
            info!(
                component = %self.inner.config.component_name,
                "Persisted whitelist after earlier failure"
            );
        }
        persisted
    }

    /// Human-readable state dump.
    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            component_name: self.inner.config.component_name.clone(),
            topic: self.inner.config.topic.clone(),
            mode: self.inner.config.mode,
            state: self.state(),
            durable: self.is_durable(),
            statistics: self.inner.stats.snapshot(),
            whitelist: self.snapshot(),
            slots: self.slots(),
        }
    }

    /// Swap in a new whitelist. The lock covers the pointer swap only.
    fn publish(&self, whitelist: Arc<Whitelist>, state: SyncState) {
        *self.inner.current.write() = whitelist;
        *self.inner.state.write() = state;
    }

    fn persist(&self, encoded: &[u8]) -> bool {
        let inner = &self.inner;
        match inner.store.save(WHITELIST_KEY, encoded) {
            Ok(()) => {
                inner.durable.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                inner.durable.store(false, Ordering::Release);
                inner.stats.record_persist_failure();
                error!(
                    component = %inner.config.component_name,
                    error = %e,
                    "Failed to persist whitelist, in-memory whitelist stays active"
                );
                false
            }
        }
    }

    fn load_slots(&self) -> LegacySlots {
        let inner = &self.inner;
        Slot::ALL
            .into_iter()
            .fold(LegacySlots::new(), |slots, slot| match inner.store.load_slot(slot) {
                Ok(mac) => slots.with(slot, mac),
                Err(e) => {
                    warn!(
                        component = %inner.config.component_name,
                        %slot,
                        error = %e,
                        "Failed to load slot, leaving it unset"
                    );
                    slots
                }
            })
    }

    fn load_persisted(&self) -> Whitelist {
        let name = &self.inner.config.component_name;
        match self.inner.store.load(WHITELIST_KEY) {
            Ok(Some(bytes)) => match codec::decode(&bytes) {
                Ok(whitelist) => {
                    info!(component = %name, entries = whitelist.len(), "Restored persisted whitelist");
                    whitelist
                }
                Err(e) => {
                    warn!(component = %name, error = %e, "Persisted whitelist is undecodable, starting empty");
                    Whitelist::new()
                }
            },
            Ok(None) => {
                info!(component = %name, "No persisted whitelist, starting empty");
                Whitelist::new()
            }
            Err(e) => {
                warn!(component = %name, error = %e, "Failed to load persisted whitelist, starting empty");
                Whitelist::new()
            }
        }
    }

    fn subscribe(&self) -> Result<(), SyncError> {
        let inner = &self.inner;
        let name = &inner.config.component_name;

        let Some(filter) = &inner.filter else {
            info!(component = %name, "No topic configured, remote updates disabled");
            return Ok(());
        };

        let Some(transport) = inner.transport.lock().take() else {
            warn!(component = %name, topic = %filter, "No transport attached, remote updates disabled");
            return Ok(());
        };

        transport.subscribe(filter.as_str(), Arc::new(self.clone()))?;
        info!(component = %name, topic = %filter, "Subscribed to whitelist updates");
        Ok(())
    }
}

impl Startable for Synchronizer {
    type Error = SyncError;

    /// Restore state from storage, then subscribe.
    ///
    /// Storage problems never fail the start; they degrade to an empty
    /// whitelist. Only a rejected subscription is returned as an error, and
    /// the restored whitelist stays queryable in that case.
    fn start(&self) -> Result<(), SyncError> {
        {
            // Held across the load so no update lands before the restored set
            let _writer = self.inner.writer.lock();
            if self.state() != SyncState::Uninitialized {
                return Err(SyncError::AlreadyStarted);
            }

            let slots = self.load_slots();
            *self.inner.slots.write() = slots;

            let whitelist = match self.inner.config.mode {
                SyncMode::Slots => {
                    let whitelist = slots.to_whitelist();
                    info!(
                        component = %self.inner.config.component_name,
                        entries = whitelist.len(),
                        "Loaded legacy slots"
                    );
                    whitelist
                }
                SyncMode::Full => self.load_persisted(),
            };
            self.publish(Arc::new(whitelist), SyncState::Loaded);
        }

        // Outside the writer lock: a transport may deliver a retained message
        // from within subscribe.
        match self.inner.config.mode {
            SyncMode::Slots => Ok(()),
            SyncMode::Full => self.subscribe(),
        }
    }
}

impl MessageSink for Synchronizer {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        let name = &self.inner.config.component_name;

        if !self.accepts_topic(topic) {
            self.inner.stats.record_ignored();
            debug!(component = %name, topic, "Ignoring message for foreign topic");
            return;
        }

        match self.apply_update(payload) {
            Ok(_) | Err(SyncError::Decode(_)) => {}
            Err(SyncError::ReadOnly) => {
                self.inner.stats.record_ignored();
                debug!(component = %name, topic, "Slot mode is read-only, ignoring update");
            }
            Err(SyncError::NotStarted) => {
                self.inner.stats.record_ignored();
                debug!(component = %name, topic, "Not started yet, ignoring update");
            }
            Err(e) => error!(component = %name, error = %e, "Unexpected update failure"),
        }
    }
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("component_name", &self.inner.config.component_name)
            .field("topic", &self.inner.config.topic)
            .field("mode", &self.inner.config.mode)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blewl_core::DeviceType;
    use blewl_store::{KvError, KvStore, MemoryKv};
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::time::Duration;

    const TOPIC: &str = "home/ble/whitelist";
    const KITCHEN: &str =
        r#"{"ble":{"wl":[{"desc":"kitchen sensor","mac":"aa:bb:cc:dd:ee:01","type":"bthome"}]}}"#;
    const THREE: &str = r#"{"ble":{"wl":[
        {"desc":"a","mac":"aa:bb:cc:dd:ee:0a","type":"bthome"},
        {"desc":"b","mac":"aa:bb:cc:dd:ee:0b","type":"beethowen"},
        {"desc":"c","mac":"aa:bb:cc:dd:ee:0c","type":"bthome"}
    ]}}"#;

    /// Memory engine whose writes can be switched off.
    #[derive(Default)]
    struct FlakyKv {
        inner: MemoryKv,
        fail_writes: AtomicBool,
        fail_reads: AtomicBool,
    }

    impl KvStore for FlakyKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(KvError::Read("flash unavailable".to_string()));
            }
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(KvError::Write("flash unavailable".to_string()));
            }
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), KvError> {
            self.inner.delete(key)
        }
    }

    /// Transport that records subscriptions.
    #[derive(Default)]
    struct RecordingTransport {
        filters: Mutex<Vec<String>>,
    }

    impl Transport for RecordingTransport {
        fn subscribe(&self, filter: &str, _sink: Arc<dyn MessageSink>) -> Result<(), TransportError> {
            self.filters.lock().push(filter.to_string());
            Ok(())
        }
    }

    /// Memory engine that can park one read or one write until released.
    struct GatedKv {
        inner: MemoryKv,
        park_reads: AtomicBool,
        park_writes: AtomicBool,
        entered: mpsc::Sender<()>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl GatedKv {
        fn new() -> (Arc<Self>, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let kv = Arc::new(Self {
                inner: MemoryKv::new(),
                park_reads: AtomicBool::new(false),
                park_writes: AtomicBool::new(false),
                entered: entered_tx,
                release: Mutex::new(release_rx),
            });
            (kv, entered_rx, release_tx)
        }

        fn park_if(&self, flag: &AtomicBool) {
            if flag.swap(false, Ordering::SeqCst) {
                self.entered.send(()).unwrap();
                self.release.lock().recv().unwrap();
            }
        }
    }

    impl KvStore for GatedKv {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
            self.park_if(&self.park_reads);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
            self.park_if(&self.park_writes);
            self.inner.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<(), KvError> {
            self.inner.delete(key)
        }
    }

    const WAIT: Duration = Duration::from_secs(2);

    fn setup(mode: SyncMode) -> (Arc<FlakyKv>, Synchronizer) {
        let kv = Arc::new(FlakyKv::default());
        let store = WhitelistStore::new(kv.clone(), "mac_prefs");
        let config = SyncConfig::new("test-wl", TOPIC).with_mode(mode);
        (kv, Synchronizer::new(config, store))
    }

    fn persisted(kv: &FlakyKv) -> Option<String> {
        kv.inner
            .get("mac_prefs:whitelist")
            .unwrap()
            .map(|b| String::from_utf8(b).unwrap())
    }

    #[test]
    fn test_starts_uninitialized_and_empty() {
        let (_, sync) = setup(SyncMode::Full);
        assert_eq!(sync.state(), SyncState::Uninitialized);
        assert!(!sync.state().is_active());
        assert!(sync.snapshot().is_empty());
    }

    #[test]
    fn test_start_restores_persisted_whitelist() {
        let (kv, sync) = setup(SyncMode::Full);
        kv.inner.set("mac_prefs:whitelist", KITCHEN.as_bytes()).unwrap();

        sync.start().unwrap();

        assert_eq!(sync.state(), SyncState::Loaded);
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
        assert!(sync.contains("AA-BB-CC-DD-EE-01"));
        assert!(!sync.contains("ff:ff:ff:ff:ff:ff"));
        assert!(!sync.contains("not a mac"));
        assert_eq!(sync.snapshot().entries()[0].device_type, DeviceType::BtHome);
    }

    #[test]
    fn test_start_with_empty_store() {
        let (_, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        assert_eq!(sync.state(), SyncState::Loaded);
        assert!(sync.snapshot().is_empty());
    }

    #[test]
    fn test_start_with_corrupt_blob_starts_empty() {
        let (kv, sync) = setup(SyncMode::Full);
        kv.inner.set("mac_prefs:whitelist", b"{\"ble\":").unwrap();

        sync.start().unwrap();
        assert!(sync.snapshot().is_empty());
        assert!(sync.state().is_active());
    }

    #[test]
    fn test_start_with_unreadable_store_starts_empty() {
        let (kv, sync) = setup(SyncMode::Full);
        kv.inner.set("mac_prefs:whitelist", KITCHEN.as_bytes()).unwrap();
        kv.fail_reads.store(true, Ordering::SeqCst);

        sync.start().unwrap();
        assert!(sync.snapshot().is_empty());
        assert!(sync.slots().iter().all(|(_, mac)| mac.is_unset()));
    }

    #[test]
    fn test_start_twice_fails() {
        let (_, sync) = setup(SyncMode::Full);
        sync.start().unwrap();
        assert!(matches!(sync.start(), Err(SyncError::AlreadyStarted)));
    }

    #[test]
    fn test_start_subscribes_through_transport() {
        let (_, sync) = setup(SyncMode::Full);
        let transport = Arc::new(RecordingTransport::default());
        let sync = sync.with_transport(transport.clone());

        sync.start().unwrap();
        assert_eq!(*transport.filters.lock(), vec![TOPIC.to_string()]);
    }

    #[test]
    fn test_empty_topic_does_not_subscribe() {
        let kv = Arc::new(MemoryKv::new());
        let transport = Arc::new(RecordingTransport::default());
        let sync = Synchronizer::new(
            SyncConfig::new("test-wl", ""),
            WhitelistStore::new(kv, "mac_prefs"),
        )
        .with_transport(transport.clone());

        sync.start().unwrap();
        assert!(transport.filters.lock().is_empty());
        assert!(!sync.accepts_topic(TOPIC));
    }

    #[test]
    fn test_update_replaces_and_persists() {
        let (kv, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        sync.on_message(TOPIC, KITCHEN.as_bytes());

        assert_eq!(sync.state(), SyncState::Synchronized);
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
        assert_eq!(persisted(&kv).as_deref(), Some(KITCHEN));
        assert!(sync.is_durable());
    }

    #[test]
    fn test_update_is_full_replacement() {
        let (_, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        sync.on_message(TOPIC, THREE.as_bytes());
        sync.on_message(TOPIC, KITCHEN.as_bytes());

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(!sync.contains("aa:bb:cc:dd:ee:0a"));
    }

    #[test]
    fn test_same_update_twice_is_idempotent() {
        let (kv, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        sync.on_message(TOPIC, THREE.as_bytes());
        let once = sync.snapshot();
        let persisted_once = persisted(&kv);

        sync.on_message(TOPIC, THREE.as_bytes());
        assert_eq!(*sync.snapshot(), *once);
        assert_eq!(persisted(&kv), persisted_once);
    }

    #[test]
    fn test_partially_malformed_update() {
        let (_, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        let payload = br#"{"ble":{"wl":[
            {"desc":"a","mac":"aa:bb:cc:dd:ee:0a","type":"bthome"},
            {"desc":"b","mac":"aa:bb:cc:dd:ee:0b","type":"bthome"},
            {"desc":"bad","mac":"zz:bb:cc:dd:ee:0b","type":"bthome"},
            {"desc":"c","mac":"aa:bb:cc:dd:ee:0c","type":"bthome"}
        ]}}"#;

        let report = sync.apply_update(payload).unwrap();
        assert_eq!(
            report,
            UpdateReport {
                entries: 3,
                skipped: 1,
                persisted: true
            }
        );
        assert_eq!(sync.snapshot().len(), 3);
    }

    #[test]
    fn test_empty_update_clears_and_persists() {
        let (kv, sync) = setup(SyncMode::Full);
        kv.inner.set("mac_prefs:whitelist", KITCHEN.as_bytes()).unwrap();
        sync.start().unwrap();

        sync.on_message(TOPIC, br#"{"ble":{"wl":[]}}"#);

        assert!(sync.snapshot().is_empty());
        assert_eq!(persisted(&kv).as_deref(), Some(r#"{"ble":{"wl":[]}}"#));
    }

    #[test]
    fn test_invalid_update_keeps_last_good() {
        let (kv, sync) = setup(SyncMode::Full);
        sync.start().unwrap();
        sync.on_message(TOPIC, THREE.as_bytes());
        let before = sync.snapshot();

        sync.on_message(TOPIC, br#"{"ble":{}}"#);
        sync.on_message(TOPIC, b"garbage");

        assert_eq!(*sync.snapshot(), *before);
        assert!(matches!(
            sync.apply_update(br#"{"other":1}"#),
            Err(SyncError::Decode(DecodeError::MissingSection))
        ));
        assert_eq!(sync.statistics().snapshot().updates_rejected, 3);
        assert_eq!(sync.state(), SyncState::Synchronized);
        assert_eq!(
            persisted(&kv),
            Some(String::from_utf8(codec::encode(&before)).unwrap())
        );
    }

    #[test]
    fn test_foreign_topic_is_ignored() {
        let (kv, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        sync.on_message("home/ble/other", KITCHEN.as_bytes());

        assert!(sync.snapshot().is_empty());
        assert_eq!(sync.state(), SyncState::Loaded);
        assert!(persisted(&kv).is_none());
        assert_eq!(sync.statistics().snapshot().messages_ignored, 1);
    }

    #[test]
    fn test_wildcard_topic_filter() {
        let kv = Arc::new(MemoryKv::new());
        let sync = Synchronizer::new(
            SyncConfig::new("test-wl", "home/+/whitelist"),
            WhitelistStore::new(kv, "mac_prefs"),
        );
        sync.start().unwrap();

        sync.on_message("home/garage/whitelist", KITCHEN.as_bytes());
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
    }

    #[test]
    fn test_persist_failure_keeps_update_and_tick_retries() {
        let (kv, sync) = setup(SyncMode::Full);
        sync.start().unwrap();
        kv.fail_writes.store(true, Ordering::SeqCst);

        let report = sync.apply_update(KITCHEN.as_bytes()).unwrap();

        assert!(!report.persisted);
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
        assert!(!sync.is_durable());
        assert!(persisted(&kv).is_none());

        assert!(!sync.tick());
        assert_eq!(sync.statistics().snapshot().persist_failures, 2);

        kv.fail_writes.store(false, Ordering::SeqCst);
        assert!(sync.tick());
        assert!(sync.is_durable());
        assert_eq!(persisted(&kv).as_deref(), Some(KITCHEN));
    }

    #[test]
    fn test_tick_when_durable_is_noop() {
        let (kv, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        assert!(sync.tick());
        assert!(persisted(&kv).is_none());
    }

    #[test]
    fn test_slots_loaded_in_full_mode() {
        let (kv, sync) = setup(SyncMode::Full);
        kv.inner
            .set("mac_prefs:mac_address_2", b"aa:bb:cc:dd:ee:02")
            .unwrap();

        sync.start().unwrap();

        assert_eq!(sync.get_slot(Slot::One), MacAddress::UNSET);
        assert_eq!(sync.get_slot(Slot::Two).to_string(), "aa:bb:cc:dd:ee:02");
        assert!(!sync.contains("aa:bb:cc:dd:ee:02"));
    }

    #[test]
    fn test_slot_mode_is_read_only_view() {
        let (kv, sync) = setup(SyncMode::Slots);
        kv.inner
            .set("mac_prefs:mac_address_1", b"aa:bb:cc:dd:ee:01")
            .unwrap();
        kv.inner.set("mac_prefs:mac_address_3", b"garbage").unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let sync = sync.with_transport(transport.clone());

        sync.start().unwrap();

        assert!(transport.filters.lock().is_empty());
        assert_eq!(sync.get_slot(Slot::Three), MacAddress::UNSET);
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
        assert_eq!(sync.snapshot().entries()[0].description, "slot 1");

        sync.on_message(TOPIC, br#"{"ble":{"wl":[]}}"#);
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
        assert!(matches!(
            sync.apply_update(KITCHEN.as_bytes()),
            Err(SyncError::ReadOnly)
        ));
        assert_eq!(sync.state(), SyncState::Loaded);
    }

    #[test]
    fn test_snapshot_is_isolated_from_updates() {
        let (_, sync) = setup(SyncMode::Full);
        sync.start().unwrap();
        sync.on_message(TOPIC, THREE.as_bytes());

        let held = sync.snapshot();
        sync.on_message(TOPIC, br#"{"ble":{"wl":[]}}"#);

        assert_eq!(held.len(), 3);
        assert!(sync.snapshot().is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_whole_sets() {
        let (_, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        let reader = {
            let sync = sync.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    let len = sync.snapshot().len();
                    assert!(len == 0 || len == 1 || len == 3, "torn read: {len}");
                }
            })
        };

        for i in 0..200 {
            let payload = if i % 2 == 0 { THREE } else { KITCHEN };
            sync.on_message(TOPIC, payload.as_bytes());
        }

        reader.join().unwrap();
    }

    #[test]
    fn test_update_before_start_is_refused() {
        let (kv, sync) = setup(SyncMode::Full);
        kv.inner
            .set("mac_prefs:mac_address_1", b"11:22:33:44:55:66")
            .unwrap();
        kv.inner.set("mac_prefs:whitelist", THREE.as_bytes()).unwrap();

        assert!(matches!(
            sync.apply_update(KITCHEN.as_bytes()),
            Err(SyncError::NotStarted)
        ));
        sync.on_message(TOPIC, KITCHEN.as_bytes());

        assert_eq!(sync.state(), SyncState::Uninitialized);
        assert!(sync.snapshot().is_empty());
        assert_eq!(persisted(&kv).as_deref(), Some(THREE));
        assert_eq!(sync.statistics().snapshot().messages_ignored, 1);

        sync.start().unwrap();

        assert_eq!(sync.state(), SyncState::Loaded);
        assert_eq!(sync.get_slot(Slot::One).to_string(), "11:22:33:44:55:66");
        assert_eq!(sync.snapshot().len(), 3);
    }

    #[test]
    fn test_update_during_start_lands_after_load() {
        let (kv, entered, release) = GatedKv::new();
        kv.inner.set("mac_prefs:whitelist", THREE.as_bytes()).unwrap();
        let sync = Synchronizer::new(
            SyncConfig::new("test-wl", TOPIC),
            WhitelistStore::new(kv.clone(), "mac_prefs"),
        );

        kv.park_reads.store(true, Ordering::SeqCst);
        let starter = {
            let sync = sync.clone();
            std::thread::spawn(move || sync.start())
        };
        entered.recv_timeout(WAIT).unwrap();

        let updater = {
            let sync = sync.clone();
            std::thread::spawn(move || sync.apply_update(KITCHEN.as_bytes()))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sync.state(), SyncState::Uninitialized);

        release.send(()).unwrap();
        starter.join().unwrap().unwrap();
        let report = updater.join().unwrap().unwrap();

        assert!(report.persisted);
        assert_eq!(sync.state(), SyncState::Synchronized);
        assert_eq!(sync.snapshot().len(), 1);
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
        assert_eq!(
            kv.inner.get("mac_prefs:whitelist").unwrap(),
            Some(KITCHEN.as_bytes().to_vec())
        );
    }

    #[test]
    fn test_readers_not_blocked_while_persisting() {
        let (kv, entered, release) = GatedKv::new();
        let sync = Synchronizer::new(
            SyncConfig::new("test-wl", TOPIC),
            WhitelistStore::new(kv.clone(), "mac_prefs"),
        );
        sync.start().unwrap();

        kv.park_writes.store(true, Ordering::SeqCst);
        let writer = {
            let sync = sync.clone();
            std::thread::spawn(move || sync.apply_update(KITCHEN.as_bytes()))
        };
        entered.recv_timeout(WAIT).unwrap();

        // The save is parked; the new set is already visible
        assert!(sync.contains("aa:bb:cc:dd:ee:01"));
        assert_eq!(sync.snapshot().len(), 1);
        assert_eq!(sync.state(), SyncState::Synchronized);
        assert!(sync.diagnostics().to_string().contains("kitchen sensor"));
        assert!(kv.inner.get("mac_prefs:whitelist").unwrap().is_none());

        release.send(()).unwrap();
        assert!(writer.join().unwrap().unwrap().persisted);
        assert_eq!(
            kv.inner.get("mac_prefs:whitelist").unwrap(),
            Some(KITCHEN.as_bytes().to_vec())
        );
    }

    #[test]
    fn test_concurrent_writers_persist_last_published() {
        let (kv, sync) = setup(SyncMode::Full);
        sync.start().unwrap();

        let writers: Vec<_> = [THREE, KITCHEN]
            .into_iter()
            .map(|payload| {
                let sync = sync.clone();
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        sync.on_message(TOPIC, payload.as_bytes());
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(sync.statistics().snapshot().updates_applied, 400);
        assert_eq!(
            persisted(&kv),
            Some(String::from_utf8(codec::encode(&sync.snapshot())).unwrap())
        );
    }
}
