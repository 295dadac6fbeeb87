//! Message types for agent communication
//!
//! This module defines the structured message format exchanged between agents,
//! including kind/priority taxonomies and retry/TTL lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Kinds of messages agents can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Task,
    Result,
    Query,
    Response,
    Notification,
    Error,
    Heartbeat,
}

/// Message priority levels, ordered low < normal < high < urgent.
///
/// The derived `Ord` relies on variant declaration order; priority-threshold
/// filters and routing rules compare with `>=`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Standard message format for agent communication
///
/// Messages are immutable once constructed; use [`AgentMessage::builder`] to
/// create one with identity and content validation applied. Serializes to JSON
/// with ISO-8601 timestamps and string-encoded UUIDs for transport.
///
/// # Examples
/// ```
/// use agentmesh::protocol::{AgentMessage, MessageKind, MessagePriority};
///
/// let message = AgentMessage::builder()
///     .sender("scout-1", "Scout", "researcher")
///     .kind(MessageKind::Text)
///     .priority(MessagePriority::High)
///     .content("Found three candidate sources")
///     .topic("research")
///     .build()
///     .unwrap();
///
/// assert_eq!(message.priority, MessagePriority::High);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    /// Unique message identifier
    pub id: Uuid,
    /// Message creation timestamp
    pub timestamp: DateTime<Utc>,
    /// ID of the sending agent
    pub sender_id: String,
    /// Human-readable name of the sending agent
    pub sender_name: String,
    /// Role or type of the sending agent
    pub sender_role: String,
    /// Kind of message
    pub kind: MessageKind,
    /// Message priority
    #[serde(default)]
    pub priority: MessagePriority,
    /// Main message content
    pub content: String,
    /// Target topic name
    pub topic: String,
    /// Topic to reply to (for request-response patterns)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// ID correlating request-response pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    /// Whether this message requires a response
    #[serde(default)]
    pub requires_response: bool,
    /// Response timeout in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_timeout: Option<u64>,
    /// Additional message metadata
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Message tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Time to live in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Number of retry attempts so far
    #[serde(default)]
    pub retry_count: u32,
    /// Maximum retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl AgentMessage {
    /// Start building a message with defaults applied.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Check whether the message has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(self.timestamp);
                age.num_seconds() >= 0 && age.num_seconds() as u64 > ttl
            }
            None => false,
        }
    }

    /// Check whether another delivery attempt is permitted.
    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries && !self.is_expired()
    }

    /// Produce a copy of the message with the retry counter advanced.
    pub fn increment_retry(&self) -> AgentMessage {
        AgentMessage {
            retry_count: self.retry_count + 1,
            ..self.clone()
        }
    }
}

/// Validation errors raised when constructing a message.
#[derive(Debug, Error, PartialEq)]
pub enum MessageValidationError {
    #[error("message content cannot be empty")]
    EmptyContent,
    #[error("required field '{0}' cannot be empty")]
    EmptyField(&'static str),
}

/// Builder for [`AgentMessage`] with required-field validation.
///
/// Identity fields and content are trimmed; empty values after trimming are
/// rejected at `build()`.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    sender_id: String,
    sender_name: String,
    sender_role: String,
    kind: Option<MessageKind>,
    priority: MessagePriority,
    content: String,
    topic: String,
    reply_to: Option<String>,
    correlation_id: Option<Uuid>,
    requires_response: bool,
    response_timeout: Option<u64>,
    metadata: HashMap<String, Value>,
    tags: Vec<String>,
    ttl: Option<u64>,
    max_retries: Option<u32>,
}

impl MessageBuilder {
    pub fn sender(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        self.sender_id = id.into();
        self.sender_name = name.into();
        self.sender_role = role.into();
        self
    }

    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn requires_response(mut self, timeout_secs: Option<u64>) -> Self {
        self.requires_response = true;
        self.response_timeout = timeout_secs;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = Some(ttl_secs);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Validate and construct the message.
    pub fn build(self) -> Result<AgentMessage, MessageValidationError> {
        let content = self.content.trim().to_string();
        if content.is_empty() {
            return Err(MessageValidationError::EmptyContent);
        }

        let required = [
            ("sender_id", self.sender_id.trim()),
            ("sender_name", self.sender_name.trim()),
            ("sender_role", self.sender_role.trim()),
            ("topic", self.topic.trim()),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(MessageValidationError::EmptyField(field));
            }
        }

        Ok(AgentMessage {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender_id: self.sender_id.trim().to_string(),
            sender_name: self.sender_name.trim().to_string(),
            sender_role: self.sender_role.trim().to_string(),
            kind: self.kind.unwrap_or(MessageKind::Text),
            priority: self.priority,
            content,
            topic: self.topic.trim().to_string(),
            reply_to: self.reply_to,
            correlation_id: self.correlation_id,
            requires_response: self.requires_response,
            response_timeout: self.response_timeout,
            metadata: self.metadata,
            tags: self.tags,
            ttl: self.ttl,
            retry_count: 0,
            max_retries: self.max_retries.unwrap_or_else(default_max_retries),
        })
    }
}
