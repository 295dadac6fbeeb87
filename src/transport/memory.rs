//! In-process transport
//!
//! Delivers published messages synchronously to every handler subscribed to
//! the topic. Useful for tests and for single-process meshes where agents
//! share a runtime. Messages published while disconnected are rejected, and
//! published payloads are round-tripped through JSON so serialization bugs
//! surface here rather than against a real broker.

use super::{MessageHandler, Transport, TransportError};
use crate::protocol::AgentMessage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, trace};

/// Transport that dispatches within the current process.
#[derive(Default)]
pub struct MemoryTransport {
    connected: AtomicBool,
    handlers: Mutex<HashMap<String, Vec<MessageHandler>>>,
    published: Mutex<Vec<(String, AgentMessage)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message published so far, in order, with its topic.
    pub fn published(&self) -> Vec<(String, AgentMessage)> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn handlers_for(&self, topic: &str) -> Vec<MessageHandler> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        debug!("in-memory transport connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        debug!("in-memory transport disconnected");
        Ok(())
    }

    async fn publish(&self, topic: &str, message: &AgentMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        // Round-trip through the wire format to keep parity with real brokers
        let payload = serde_json::to_vec(message)?;
        let delivered: AgentMessage = serde_json::from_slice(&payload)?;

        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((topic.to_string(), delivered.clone()));

        let handlers = self.handlers_for(topic);
        trace!(topic, handlers = handlers.len(), message_id = %message.id, "dispatching");
        for handler in handlers {
            handler(delivered.clone());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        debug!(topic, "subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.handlers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(topic);
        debug!(topic, "unsubscribed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
