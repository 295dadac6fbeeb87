//! Crate-wide error type
//!
//! Module-level errors stay local to their modules; this type aggregates them
//! at the agent orchestration boundary where several subsystems meet.

use thiserror::Error;

/// Top-level error for mesh operations.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Message validation failed: {0}")]
    Message(#[from] crate::protocol::MessageValidationError),

    #[error("Filter error: {0}")]
    Filter(#[from] crate::routing::FilterError),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Responder error: {0}")]
    Responder(#[from] crate::llm::ResponderError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Topic access denied: agent '{agent_id}' lacks {needed} on '{topic}'")]
    AccessDenied {
        agent_id: String,
        topic: String,
        needed: crate::topics::PermissionLevel,
    },

    #[error("Invalid topic name '{name}': {reasons}")]
    InvalidTopicName { name: String, reasons: String },

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for mesh operations.
pub type MeshResult<T> = Result<T, MeshError>;
