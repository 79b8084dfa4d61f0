//! In-process publish/subscribe transport.
//!
//! This module provides a tokio-based broker that stands in for a network
//! pub/sub client:
//! - Publishers push `(topic, payload)` into a bounded channel
//! - A single dispatch task routes each message to every matching sink
//! - Sinks run on the blocking pool, one at a time, so delivery order is
//!   preserved and sinks may do synchronous storage I/O
//!
//! Shutdown stops the dispatch task between messages; a sink that is already
//! running (and any save it is doing) always completes.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::subscription::SubscriptionTable;
use crate::topic::TopicFilter;
use crate::transport::{MessageSink, Transport, TransportError};

/// A message in flight.
#[derive(Debug)]
struct Message {
    topic: String,
    payload: Arc<[u8]>,
}

/// Sending half of a broker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: mpsc::Sender<Message>,
}

impl Publisher {
    /// Queue a message for delivery. Waits while the queue is full.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), TransportError> {
        let message = Message {
            topic: topic.into(),
            payload: Arc::from(payload.into()),
        };
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// The in-process broker. Cloning yields another handle to the same broker.
#[derive(Clone)]
pub struct LocalBroker {
    shared: Arc<Shared>,
}

struct Shared {
    subscriptions: Arc<RwLock<SubscriptionTable>>,
    publisher: Publisher,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl LocalBroker {
    /// Start a broker with a queue of `capacity` messages.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let subscriptions = Arc::new(RwLock::new(SubscriptionTable::new()));

        let dispatcher = tokio::spawn(dispatch(rx, shutdown_rx, subscriptions.clone()));

        Self {
            shared: Arc::new(Shared {
                subscriptions,
                publisher: Publisher { tx },
                shutdown_tx,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// Get a publisher for submitting messages.
    pub fn publisher(&self) -> Publisher {
        self.shared.publisher.clone()
    }

    /// Queue a message for delivery.
    pub async fn publish(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), TransportError> {
        self.shared.publisher.publish(topic, payload).await
    }

    /// Remove every subscription registered with this exact filter.
    pub fn unsubscribe(&self, filter: &str) {
        self.shared.subscriptions.write().remove(filter);
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.read().len()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shared.shutdown_tx.borrow()
    }

    /// Stop accepting messages and wait for the in-flight delivery to finish.
    ///
    /// Messages still queued are dropped. Subscriptions are released so sinks
    /// holding a handle back to the broker are freed.
    pub async fn shutdown(&self) {
        if self.shared.shutdown_tx.send_replace(true) {
            return;
        }

        let handle = self.shared.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Broker dispatcher ended abnormally: {}", e);
            }
        }

        self.shared.subscriptions.write().clear();
        info!("Broker stopped");
    }
}

impl Transport for LocalBroker {
    fn subscribe(&self, filter: &str, sink: Arc<dyn MessageSink>) -> Result<(), TransportError> {
        if self.is_shut_down() {
            return Err(TransportError::Closed);
        }

        let filter = TopicFilter::new(filter)?;
        debug!(filter = %filter, "Adding subscription");
        self.shared.subscriptions.write().add(filter, sink);
        Ok(())
    }
}

/// Route messages until shutdown or until every publisher is gone.
async fn dispatch(
    mut rx: mpsc::Receiver<Message>,
    mut shutdown_rx: watch::Receiver<bool>,
    subscriptions: Arc<RwLock<SubscriptionTable>>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,

            message = rx.recv() => match message {
                Some(message) => deliver(&subscriptions, message).await,
                None => {
                    info!("All publishers dropped");
                    break;
                }
            },
        }
    }

    debug!("Dispatcher stopped");
}

/// Hand one message to each matching sink in turn.
async fn deliver(subscriptions: &RwLock<SubscriptionTable>, message: Message) {
    let sinks = subscriptions.read().matching(&message.topic);
    if sinks.is_empty() {
        debug!(topic = %message.topic, "No subscribers for message");
        return;
    }

    for sink in sinks {
        let topic = message.topic.clone();
        let payload = message.payload.clone();

        let result = tokio::task::spawn_blocking(move || sink.on_message(&topic, &payload)).await;
        if let Err(e) = result {
            warn!(topic = %message.topic, error = %e, "Subscriber failed while handling message");
        }
    }
}
