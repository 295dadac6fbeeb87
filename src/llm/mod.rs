//! Response generation abstraction
//!
//! Agents generate replies through a [`Responder`], a provider-agnostic
//! interface over whatever backs the generation (a hosted model, a local one,
//! or a canned mock in tests). The mesh hands the responder a prompt plus the
//! thread's rolling context and publishes whatever comes back.

use crate::conversation::ConversationContext;
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised during response generation.
#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("provider request failed: {0}")]
    Provider(String),
    #[error("provider network error: {0}")]
    Network(String),
    #[error("generation timed out after {0} seconds")]
    Timeout(u64),
    #[error("responder not configured: {0}")]
    NotConfigured(String),
}

/// Generates replies for incoming messages.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic", "mock")
    fn name(&self) -> &str;

    /// Generate a reply to `prompt`, given the thread's recent context.
    async fn generate(
        &self,
        prompt: &str,
        context: Option<&ConversationContext>,
    ) -> Result<String, ResponderError>;

    /// Check the responder is configured and reachable.
    async fn health_check(&self) -> Result<(), ResponderError> {
        Ok(())
    }
}

/// Responder that echoes a summary of what it was asked.
///
/// Stands in where no real provider is configured; keeps the mesh functional
/// for wiring tests and demos.
#[derive(Debug, Default)]
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(
        &self,
        prompt: &str,
        context: Option<&ConversationContext>,
    ) -> Result<String, ResponderError> {
        let context_len = context.map_or(0, |c| c.recent_messages.len());
        Ok(format!(
            "ack ({context_len} messages in context): {prompt}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_responder() {
        let responder = EchoResponder;
        assert_eq!(responder.name(), "echo");
        let reply = responder.generate("status?", None).await.unwrap();
        assert!(reply.contains("status?"));
        assert!(reply.contains("0 messages"));
        assert!(responder.health_check().await.is_ok());
    }
}
