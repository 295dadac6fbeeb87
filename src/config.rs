//! Configuration for the message mesh
//!
//! TOML-backed configuration covering agent identity, conversation threading,
//! and delivery retry behavior. Every section has workable defaults so a
//! minimal config only needs the `[agent]` block.

use crate::delivery::{ErrorKind, RetryPolicy, RetryStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeshConfig {
    pub agent: AgentSection,
    #[serde(default)]
    pub conversation: ConversationSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Agent identity section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSection {
    /// Agent identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
    /// Human-readable agent name
    pub name: String,
    /// Role used by role-based filters and routing rules
    pub role: String,
    /// Description of what this agent does
    #[serde(default)]
    pub description: String,
    /// Capabilities advertised for discovery
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Conversation threading section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationSection {
    /// Rolling context window size per thread
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
    /// Idle hours before a thread stops accepting new messages
    #[serde(default = "default_thread_timeout_hours")]
    pub thread_timeout_hours: i64,
}

fn default_max_context_messages() -> usize {
    10
}

fn default_thread_timeout_hours() -> i64 {
    24
}

impl Default for ConversationSection {
    fn default() -> Self {
        Self {
            max_context_messages: default_max_context_messages(),
            thread_timeout_hours: default_thread_timeout_hours(),
        }
    }
}

impl ConversationSection {
    pub fn thread_timeout(&self) -> chrono::Duration {
        chrono::Duration::hours(self.thread_timeout_hours)
    }
}

/// Delivery retry section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_strategy")]
    pub strategy: RetryStrategy,
    /// Error kinds worth retrying
    #[serde(default = "default_retryable")]
    pub retryable: Vec<ErrorKind>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_strategy() -> RetryStrategy {
    RetryStrategy::ExponentialBackoff
}

fn default_retryable() -> Vec<ErrorKind> {
    vec![ErrorKind::Network, ErrorKind::Timeout, ErrorKind::Transport]
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            strategy: default_strategy(),
            retryable: default_retryable(),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            strategy: self.strategy,
            retryable: self.retryable.iter().copied().collect::<HashSet<_>>(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid agent ID format: {0}")]
    InvalidAgentId(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MeshConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: MeshConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_agent_id(&self.agent.id)?;
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidConfig(
                "retry multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.conversation.max_context_messages == 0 {
            return Err(ConfigError::InvalidConfig(
                "conversation context window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[agent]
id = "test-agent"
name = "Test Agent"
role = "tester"
description = "A test agent"
capabilities = ["testing", "mock-responses"]
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

/// Validate agent ID format.
fn validate_agent_id(agent_id: &str) -> Result<(), ConfigError> {
    let valid_chars = agent_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if agent_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidAgentId(format!(
            "Agent ID '{agent_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}
