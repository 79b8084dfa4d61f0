//! Subscription table for the in-process broker.
//!
//! Maps topic filters to the sinks that asked for them.

use std::sync::Arc;

use crate::topic::TopicFilter;
use crate::transport::MessageSink;

/// One registered filter and its sink.
#[derive(Clone)]
pub struct Subscription {
    /// Compiled filter
    pub filter: TopicFilter,
    pub sink: Arc<dyn MessageSink>,
}

/// All subscriptions of a broker.
#[derive(Default)]
pub struct SubscriptionTable {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink for a filter. Duplicates are kept; each gets a copy.
    pub fn add(&mut self, filter: TopicFilter, sink: Arc<dyn MessageSink>) {
        self.subscriptions.push(Subscription { filter, sink });
    }

    /// Remove every subscription registered with this exact filter string.
    pub fn remove(&mut self, filter: &str) {
        self.subscriptions.retain(|s| s.filter.as_str() != filter);
    }

    /// Drop all subscriptions.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Sinks whose filter matches `topic`, in registration order.
    pub fn matching(&self, topic: &str) -> Vec<Arc<dyn MessageSink>> {
        self.subscriptions
            .iter()
            .filter(|s| s.filter.matches(topic))
            .map(|s| s.sink.clone())
            .collect()
    }
}
