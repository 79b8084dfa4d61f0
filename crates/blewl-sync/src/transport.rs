//! Capabilities composed by the process harness.
//!
//! Components do not inherit lifecycle or transport behaviour; they implement
//! the capabilities they need and the harness wires them together:
//! - [`Startable`]: one start entry point
//! - [`MessageSink`]: one message callback
//! - [`Transport`]: the pub/sub client that feeds sinks

use std::sync::Arc;

use thiserror::Error;

use crate::topic::TopicError;

/// Receives messages delivered by a [`Transport`].
///
/// A transport shared by several subscribers may hand a sink messages for
/// topics it did not ask for; sinks filter on `topic` themselves.
pub trait MessageSink: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}

/// A component with a single start entry point.
pub trait Startable {
    type Error;

    fn start(&self) -> Result<(), Self::Error>;
}

/// Publish/subscribe client.
///
/// Connection, reconnection and delivery guarantees are the transport's own
/// business; callers only register a filter and a sink.
pub trait Transport: Send + Sync {
    fn subscribe(&self, filter: &str, sink: Arc<dyn MessageSink>) -> Result<(), TransportError>;
}

/// Errors that can occur in a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid topic filter: {0}")]
    InvalidFilter(#[from] TopicError),

    #[error("Transport is shut down")]
    Closed,
}
