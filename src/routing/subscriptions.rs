//! Subscription registry
//!
//! Tracks active and paused filtered subscriptions per topic and per agent,
//! and selects delivery targets for incoming messages. Routing only computes
//! the matching set; invoking handlers is the caller's responsibility so one
//! slow handler can never stall routing for others.

use crate::protocol::AgentMessage;
use crate::routing::filter::SubscriptionFilter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Kinds of topic subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    AllMessages,
    RoleBased,
    ContentFiltered,
    PriorityFiltered,
    Custom,
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 5] = [
        SubscriptionKind::AllMessages,
        SubscriptionKind::RoleBased,
        SubscriptionKind::ContentFiltered,
        SubscriptionKind::PriorityFiltered,
        SubscriptionKind::Custom,
    ];
}

/// An agent's registered interest in a topic.
#[derive(Debug, Clone)]
pub struct TopicSubscription {
    pub topic: String,
    pub agent_id: String,
    pub kind: SubscriptionKind,
    pub filter: Option<SubscriptionFilter>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub message_count: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Counts describing the registry's current state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionStats {
    pub total: usize,
    pub active: usize,
    pub paused: usize,
    pub topics: usize,
    pub agents: usize,
    pub by_kind: HashMap<String, usize>,
}

/// Registry of filtered topic subscriptions.
///
/// State is owned by the instance and guarded by a mutex; construct one per
/// agent (or per test) rather than sharing a process-wide registry. The
/// registry does not deduplicate: callers must not subscribe the same
/// (agent, topic) pair twice.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    by_topic: Mutex<HashMap<String, Vec<TopicSubscription>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent's subscription to a topic.
    pub async fn subscribe(
        &self,
        agent_id: &str,
        topic: &str,
        kind: SubscriptionKind,
        filter: Option<SubscriptionFilter>,
    ) -> TopicSubscription {
        let subscription = TopicSubscription {
            topic: topic.to_string(),
            agent_id: agent_id.to_string(),
            kind,
            filter,
            active: true,
            created_at: Utc::now(),
            message_count: 0,
            last_message_at: None,
        };

        let mut by_topic = self.by_topic.lock().await;
        by_topic
            .entry(topic.to_string())
            .or_default()
            .push(subscription.clone());

        info!(agent_id, topic, kind = ?kind, "agent subscribed to topic");
        subscription
    }

    /// Remove an agent's subscription. Returns whether anything was removed.
    pub async fn unsubscribe(&self, agent_id: &str, topic: &str) -> bool {
        let mut by_topic = self.by_topic.lock().await;
        let Some(subscriptions) = by_topic.get_mut(topic) else {
            return false;
        };

        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.agent_id != agent_id);
        let removed = subscriptions.len() < before;
        if subscriptions.is_empty() {
            by_topic.remove(topic);
        }

        if removed {
            info!(agent_id, topic, "agent unsubscribed from topic");
        }
        removed
    }

    /// Pause a subscription without removing it.
    pub async fn pause(&self, agent_id: &str, topic: &str) -> bool {
        self.set_active(agent_id, topic, false).await
    }

    /// Resume a paused subscription.
    pub async fn resume(&self, agent_id: &str, topic: &str) -> bool {
        self.set_active(agent_id, topic, true).await
    }

    async fn set_active(&self, agent_id: &str, topic: &str, active: bool) -> bool {
        let mut by_topic = self.by_topic.lock().await;
        let Some(subscriptions) = by_topic.get_mut(topic) else {
            return false;
        };
        for sub in subscriptions.iter_mut() {
            if sub.agent_id == agent_id {
                sub.active = active;
                info!(
                    agent_id,
                    topic,
                    state = if active { "resumed" } else { "paused" },
                    "subscription state changed"
                );
                return true;
            }
        }
        false
    }

    /// Replace the filter on an existing subscription.
    pub async fn update_filter(
        &self,
        agent_id: &str,
        topic: &str,
        filter: Option<SubscriptionFilter>,
    ) -> bool {
        let mut by_topic = self.by_topic.lock().await;
        let Some(subscriptions) = by_topic.get_mut(topic) else {
            return false;
        };
        for sub in subscriptions.iter_mut() {
            if sub.agent_id == agent_id {
                sub.filter = filter;
                info!(agent_id, topic, "subscription filter updated");
                return true;
            }
        }
        false
    }

    /// Select the subscriptions that should receive a message.
    ///
    /// Returns active subscriptions on the message's topic whose agent is not
    /// the sender and whose filter accepts the message. Delivery counters and
    /// last-message timestamps are updated for each match.
    pub async fn route(&self, message: &AgentMessage) -> Vec<TopicSubscription> {
        let mut by_topic = self.by_topic.lock().await;
        let Some(subscriptions) = by_topic.get_mut(&message.topic) else {
            return Vec::new();
        };

        let mut matched = Vec::new();
        for sub in subscriptions.iter_mut() {
            if !sub.active || sub.agent_id == message.sender_id {
                continue;
            }
            let accepted = match &sub.filter {
                Some(filter) => filter.matches(message),
                None => true,
            };
            if accepted {
                sub.message_count += 1;
                sub.last_message_at = Some(message.timestamp);
                matched.push(sub.clone());
            }
        }

        debug!(
            message_id = %message.id,
            topic = %message.topic,
            matched = matched.len(),
            "routed message to subscribers"
        );
        matched
    }

    /// All subscriptions held by an agent.
    pub async fn agent_subscriptions(&self, agent_id: &str) -> Vec<TopicSubscription> {
        let by_topic = self.by_topic.lock().await;
        by_topic
            .values()
            .flatten()
            .filter(|sub| sub.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// All subscriptions on a topic.
    pub async fn topic_subscribers(&self, topic: &str) -> Vec<TopicSubscription> {
        let by_topic = self.by_topic.lock().await;
        by_topic.get(topic).cloned().unwrap_or_default()
    }

    /// Counts by activity state and subscription kind.
    pub async fn stats(&self) -> SubscriptionStats {
        let by_topic = self.by_topic.lock().await;
        let mut stats = SubscriptionStats {
            topics: by_topic.len(),
            ..Default::default()
        };

        let mut agents = std::collections::HashSet::new();
        for sub in by_topic.values().flatten() {
            stats.total += 1;
            if sub.active {
                stats.active += 1;
            } else {
                stats.paused += 1;
            }
            agents.insert(sub.agent_id.as_str());
            let key = match sub.kind {
                SubscriptionKind::AllMessages => "all_messages",
                SubscriptionKind::RoleBased => "role_based",
                SubscriptionKind::ContentFiltered => "content_filtered",
                SubscriptionKind::PriorityFiltered => "priority_filtered",
                SubscriptionKind::Custom => "custom",
            };
            *stats.by_kind.entry(key.to_string()).or_default() += 1;
        }
        stats.agents = agents.len();
        stats
    }
}
