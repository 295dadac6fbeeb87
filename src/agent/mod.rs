//! Agent orchestration
//!
//! [`MeshAgent`] wires the coordination pieces together: the subscription
//! registry and rule engine for routing, the access validator and topic
//! catalog for topic governance, the conversation threader for context, and
//! the delivery coordinator for resilient publishing. Outbound messages flow
//! through `send_message`; inbound ones through `handle_message`.

use crate::config::MeshConfig;
use crate::conversation::ConversationThreader;
use crate::delivery::DeliveryCoordinator;
use crate::error::{MeshError, MeshResult};
use crate::llm::Responder;
use crate::protocol::{AgentMessage, MessageKind};
use crate::routing::{
    MessageRouter, SubscriptionFilter, SubscriptionKind, SubscriptionRegistry, TopicSubscription,
};
use crate::topics::{validate_topic_name, AccessValidator, PermissionLevel, TopicCatalog};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Coordination core for one agent on the mesh.
pub struct MeshAgent<T: Transport> {
    config: MeshConfig,
    transport: Arc<T>,
    responder: Arc<dyn Responder>,
    registry: Arc<SubscriptionRegistry>,
    router: Arc<MessageRouter>,
    access: Arc<AccessValidator>,
    catalog: Arc<TopicCatalog>,
    threader: Arc<ConversationThreader>,
    coordinator: Arc<DeliveryCoordinator>,
    shutdown_tx: watch::Sender<bool>,
}

impl<T: Transport> MeshAgent<T> {
    pub fn new(config: MeshConfig, transport: Arc<T>, responder: Arc<dyn Responder>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = Arc::new(
            DeliveryCoordinator::new(config.retry.to_policy()).with_shutdown(shutdown_rx),
        );
        let threader = Arc::new(ConversationThreader::with_settings(
            config.conversation.max_context_messages,
            config.conversation.thread_timeout(),
        ));

        Self {
            config,
            transport,
            responder,
            registry: Arc::new(SubscriptionRegistry::new()),
            router: Arc::new(MessageRouter::new()),
            access: Arc::new(AccessValidator::new()),
            catalog: Arc::new(TopicCatalog::new()),
            threader,
            coordinator,
            shutdown_tx,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.config.agent.id
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn access(&self) -> &Arc<AccessValidator> {
        &self.access
    }

    pub fn catalog(&self) -> &Arc<TopicCatalog> {
        &self.catalog
    }

    pub fn threader(&self) -> &Arc<ConversationThreader> {
        &self.threader
    }

    pub fn coordinator(&self) -> &Arc<DeliveryCoordinator> {
        &self.coordinator
    }

    /// Connect the transport.
    pub async fn start(&self) -> MeshResult<()> {
        self.transport.connect().await?;
        info!(agent_id = %self.config.agent.id, "agent started");
        Ok(())
    }

    /// Signal shutdown and disconnect the transport.
    pub async fn shutdown(&self) -> MeshResult<()> {
        self.shutdown_tx.send(true).ok();
        self.transport.disconnect().await?;
        info!(agent_id = %self.config.agent.id, "agent stopped");
        Ok(())
    }

    /// Create a topic after validating its name, granting the creator owner
    /// permission.
    pub async fn create_topic(
        &self,
        name: &str,
        description: Option<String>,
        is_private: bool,
        tags: Vec<String>,
    ) -> MeshResult<()> {
        let report = validate_topic_name(name, None);
        if !report.is_valid {
            return Err(MeshError::InvalidTopicName {
                name: name.to_string(),
                reasons: report
                    .violations
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        }

        self.catalog
            .create_topic(name, self.agent_id(), description, is_private, tags)
            .await;
        self.access
            .grant(
                name,
                self.agent_id(),
                PermissionLevel::Owner,
                self.agent_id(),
            )
            .await;
        Ok(())
    }

    /// Subscribe this agent to a topic, optionally with a filter.
    pub async fn subscribe(
        &self,
        topic: &str,
        kind: SubscriptionKind,
        filter: Option<SubscriptionFilter>,
    ) -> MeshResult<TopicSubscription> {
        let subscription = self
            .registry
            .subscribe(self.agent_id(), topic, kind, filter)
            .await;
        self.catalog.add_subscriber(topic, self.agent_id()).await;
        Ok(subscription)
    }

    /// Validate, thread, route, and publish an outbound message.
    ///
    /// The message goes to its own topic plus every additional topic the rule
    /// engine selects. Returns the conversation thread the message joined.
    #[instrument(skip(self, message), fields(agent_id = %self.config.agent.id, message_id = %message.id))]
    pub async fn send_message(&self, message: AgentMessage) -> MeshResult<Uuid> {
        self.check_access(&message.topic, &message.sender_id, PermissionLevel::Write)
            .await?;

        self.catalog
            .ensure_topic(&message.topic, self.agent_id(), &self.config.agent.name)
            .await;

        let thread_id = self.threader.add_message(message.clone(), None).await;
        let fan_out = self.router.route(&message).await;

        self.publish(&message.topic, &message).await?;
        self.catalog.record_message(&message.topic).await;
        for topic in &fan_out {
            let mut forwarded = message.clone();
            forwarded.topic = topic.clone();
            self.publish(topic, &forwarded).await?;
            self.catalog.record_message(topic).await;
        }

        debug!(thread_id = %thread_id, fan_out = fan_out.len(), "message sent");
        Ok(thread_id)
    }

    /// Process an inbound message, generating a reply when one is requested.
    ///
    /// Expired messages and the agent's own are dropped. The message is
    /// threaded into its conversation either way; replies are generated for
    /// queries and messages flagged `requires_response`.
    #[instrument(skip(self, message), fields(agent_id = %self.config.agent.id, message_id = %message.id))]
    pub async fn handle_message(&self, message: AgentMessage) -> MeshResult<Option<AgentMessage>> {
        if message.sender_id == self.config.agent.id {
            return Ok(None);
        }
        if message.is_expired() {
            warn!(topic = %message.topic, "dropping expired message");
            return Ok(None);
        }
        self.check_access(&message.topic, self.agent_id(), PermissionLevel::Read)
            .await?;

        let thread_id = self.threader.add_message(message.clone(), None).await;

        let wants_reply =
            message.requires_response || message.kind == MessageKind::Query;
        if !wants_reply {
            return Ok(None);
        }

        let context = self.threader.context(thread_id).await;
        let reply_text = self
            .responder
            .generate(&message.content, context.as_ref())
            .await?;

        let reply_topic = message.reply_to.clone().unwrap_or_else(|| message.topic.clone());
        let reply = AgentMessage::builder()
            .sender(
                self.config.agent.id.clone(),
                self.config.agent.name.clone(),
                self.config.agent.role.clone(),
            )
            .kind(MessageKind::Response)
            .priority(message.priority)
            .content(reply_text)
            .topic(reply_topic.clone())
            .correlation_id(message.correlation_id.unwrap_or(message.id))
            .build()?;

        self.threader.add_message(reply.clone(), Some(thread_id)).await;
        self.publish(&reply_topic, &reply).await?;
        Ok(Some(reply))
    }

    /// Access check for governed topics. Topics with no recorded permissions
    /// are open.
    async fn check_access(
        &self,
        topic: &str,
        agent_id: &str,
        needed: PermissionLevel,
    ) -> MeshResult<()> {
        if self.access.topic_permissions(topic).await.is_empty() {
            return Ok(());
        }
        if self.access.check(topic, agent_id, needed).await {
            return Ok(());
        }
        Err(MeshError::AccessDenied {
            agent_id: agent_id.to_string(),
            topic: topic.to_string(),
            needed,
        })
    }

    async fn publish(&self, topic: &str, message: &AgentMessage) -> MeshResult<()> {
        self.coordinator
            .execute("publish", || self.transport.publish(topic, message))
            .await
            .map_err(|e| MeshError::Delivery(e.to_string()))
    }
}
