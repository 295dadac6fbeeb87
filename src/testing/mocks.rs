//! Mock implementations for testing
//!
//! Provides mock Transport and Responder implementations plus message
//! fixtures, so routing and delivery behavior can be tested without external
//! dependencies.

use crate::conversation::ConversationContext;
use crate::llm::{Responder, ResponderError};
use crate::protocol::{AgentMessage, MessageKind, MessagePriority};
use crate::transport::{MessageHandler, Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

/// Mock transport that records publishes and can be made to fail.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    /// Number of publish calls that fail before publishes start succeeding
    failures_remaining: AtomicU32,
    failure_message: Mutex<String>,
    published: Mutex<Vec<(String, AgentMessage)>>,
    handlers: Mutex<HashMap<String, Vec<MessageHandler>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publishes with the given error text.
    pub fn fail_next(&self, count: u32, message: &str) {
        self.failures_remaining.store(count, Ordering::SeqCst);
        *self.failure_message.lock().unwrap() = message.to_string();
    }

    pub fn published(&self) -> Vec<(String, AgentMessage)> {
        self.published.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field(
                "failures_remaining",
                &self.failures_remaining.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, message: &AgentMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: self.failure_message.lock().unwrap().clone(),
            });
        }

        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), message.clone()));
        let handlers = self
            .handlers
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(message.clone());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        self.handlers
            .lock()
            .unwrap()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.handlers.lock().unwrap().remove(topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Mock responder returning a canned reply, optionally failing first.
#[derive(Debug)]
pub struct MockResponder {
    reply: String,
    failures_remaining: AtomicU32,
    calls: AtomicU32,
}

impl MockResponder {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            failures_remaining: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing_times(reply: impl Into<String>, failures: u32) -> Self {
        let responder = Self::new(reply);
        responder.failures_remaining.store(failures, Ordering::SeqCst);
        responder
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for MockResponder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _context: Option<&ConversationContext>,
    ) -> Result<String, ResponderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ResponderError::Network("connection reset".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// Build a plain text message fixture.
pub fn text_message(sender_id: &str, topic: &str, content: &str) -> AgentMessage {
    AgentMessage::builder()
        .sender(sender_id, sender_id, "worker")
        .kind(MessageKind::Text)
        .content(content)
        .topic(topic)
        .build()
        .expect("fixture message is valid")
}

/// Build a message fixture with explicit kind and priority.
pub fn message_with(
    sender_id: &str,
    topic: &str,
    content: &str,
    kind: MessageKind,
    priority: MessagePriority,
) -> AgentMessage {
    AgentMessage::builder()
        .sender(sender_id, sender_id, "worker")
        .kind(kind)
        .priority(priority)
        .content(content)
        .topic(topic)
        .build()
        .expect("fixture message is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_transport_failure_sequencing() {
        let transport = MockTransport::new();
        transport.connect().await.unwrap();
        transport.fail_next(2, "broker unavailable");

        let message = text_message("a1", "ops", "hi");
        assert!(transport.publish("ops", &message).await.is_err());
        assert!(transport.publish("ops", &message).await.is_err());
        assert!(transport.publish("ops", &message).await.is_ok());
        assert_eq!(transport.publish_count(), 1);
    }

    #[test]
    fn test_mock_transport_debug_does_not_require_handler_debug() {
        let transport = MockTransport::new();
        let rendered = format!("{transport:?}");
        assert!(rendered.contains("MockTransport"));
        assert!(rendered.contains("connected"));
    }

    #[tokio::test]
    async fn test_mock_responder_failure_sequencing() {
        let responder = MockResponder::failing_times("done", 1);
        assert!(responder.generate("x", None).await.is_err());
        assert_eq!(responder.generate("x", None).await.unwrap(), "done");
        assert_eq!(responder.call_count(), 2);
    }
}
