//! agentmesh - message coordination core for cooperating agents
//!
//! # Overview
//!
//! This crate provides the coordination layer agents use to exchange messages
//! over shared topics, including:
//! - Structured message types with validation and retry/TTL lifecycle
//! - Subscription filters with kind, priority, keyword, regex, sender,
//!   role, metadata, and custom predicate clauses
//! - A priority-ordered routing rule engine for topic fan-out
//! - Topic naming policy and permission checks
//! - Conversation threading with bounded context windows
//! - A delivery coordinator with classification-driven retries
//!
//! # Quick Start
//!
//! ```rust
//! use agentmesh::protocol::{AgentMessage, MessageKind, MessagePriority};
//! use agentmesh::routing::SubscriptionFilter;
//!
//! let message = AgentMessage::builder()
//!     .sender("scout-1", "Scout", "researcher")
//!     .kind(MessageKind::Notification)
//!     .priority(MessagePriority::Urgent)
//!     .content("Important: pipeline stalled")
//!     .topic("ops")
//!     .build()
//!     .unwrap();
//!
//! let filter = SubscriptionFilter::new()
//!     .min_priority(MessagePriority::High)
//!     .keywords(["urgent", "important"]);
//!
//! assert!(filter.matches(&message));
//! ```

pub mod agent;
pub mod config;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod llm;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod testing;
pub mod topics;
pub mod transport;

pub use agent::MeshAgent;
pub use config::{AgentSection, ConfigError, ConversationSection, MeshConfig, RetrySection};
pub use error::{MeshError, MeshResult};
pub use protocol::{AgentMessage, MessageKind, MessagePriority};
pub use transport::{MemoryTransport, Transport};
