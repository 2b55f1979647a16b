//! Event dispatch to the external collaborator.
//!
//! The protocol layer hands decoded events to an [`EventSink`] by value and
//! forgets about them: retry and durability are the collaborator's problem.
//! A sink may answer with a [`Command`]: the dispatcher's caller frames it
//! into the standard envelope and enqueues it on the session's outbound
//! queue (e.g. an acknowledgement for a location report).
//!
//! # Example
//!
//! ```ignore
//! struct Intake;
//!
//! #[async_trait::async_trait]
//! impl EventSink for Intake {
//!     async fn on_device_event(&self, device_id: &str, event: DeviceEvent) -> Option<Command> {
//!         store(device_id, &event).await;
//!         None
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::event::DeviceEvent;

/// A server-to-device message: a reply produced by the sink, or a command
/// injected through [`crate::server::ServerHandle::enqueue_command`].
///
/// Outbound framing mirrors inbound:
/// `[<token>,<msg_type>,<body_len>,<device_id>@<payload>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Outbound message type code.
    pub msg_type: String,
    /// Payload text, placed verbatim after the `@` separator.
    pub payload: String,
}

impl Command {
    /// Create a new outbound command.
    pub fn new(msg_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: payload.into(),
        }
    }
}

/// Intake interface of the external collaborator (device-management API).
///
/// Implementations must be concurrency-safe: every session calls into the
/// same sink.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Consume one decoded event. Returning `Some` enqueues a reply on the
    /// originating session's outbound queue.
    async fn on_device_event(&self, device_id: &str, event: DeviceEvent) -> Option<Command>;
}

/// Routes decoded events to the collaborator.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn EventSink>,
}

impl Dispatcher {
    /// Create a dispatcher over the given sink.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Forward one event, returning the sink's optional reply.
    pub async fn dispatch(&self, device_id: &str, event: DeviceEvent) -> Option<Command> {
        trace!(device_id, msg_type = event.msg_type(), "dispatching event");
        self.sink.on_device_event(device_id, event).await
    }
}

/// Default sink for the standalone daemon: logs every event as a JSON
/// document, the same shape the device-management intake consumes.
#[derive(Debug, Default)]
pub struct JsonLogSink;

#[async_trait]
impl EventSink for JsonLogSink {
    async fn on_device_event(&self, device_id: &str, event: DeviceEvent) -> Option<Command> {
        match serde_json::to_string(&event) {
            Ok(doc) => tracing::info!(device_id, event = %doc, "device event"),
            Err(e) => tracing::error!(device_id, error = %e, "event serialization failed"),
        }
        None
    }
}
