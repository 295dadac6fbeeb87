//! Message protocol types shared across the routing core.

pub mod message;

pub use message::{
    AgentMessage, MessageBuilder, MessageKind, MessagePriority, MessageValidationError,
};
