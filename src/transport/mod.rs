//! Transport layer for agent communication
//!
//! This module provides the transport abstraction the mesh publishes and
//! subscribes through, plus an in-process implementation suitable for tests
//! and single-process deployments.

use crate::protocol::AgentMessage;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;

pub use memory::MemoryTransport;

/// Callback invoked for each message arriving on a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(AgentMessage) + Send + Sync>;

/// Errors raised by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,
    #[error("publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transport trait for agent communication
///
/// This trait provides an abstraction over different transport mechanisms
/// to enable dependency injection and testing.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the transport broker/server
    async fn connect(&self) -> Result<(), TransportError>;

    /// Disconnect from the transport broker/server
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Publish a message to a topic
    async fn publish(&self, topic: &str, message: &AgentMessage) -> Result<(), TransportError>;

    /// Subscribe to a topic, invoking the handler for each arriving message
    async fn subscribe(&self, topic: &str, handler: MessageHandler)
        -> Result<(), TransportError>;

    /// Remove all handlers for a topic
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Check if transport is currently connected
    fn is_connected(&self) -> bool;
}
