//! Topic catalog: creation, discovery, and subscriber bookkeeping
//!
//! A process-local record of known topics. The catalog is descriptive only:
//! the transport owns actual topic existence, and routing decisions never
//! depend on the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Descriptive information about a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicInfo {
    pub name: String,
    pub description: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub message_count: u64,
    pub subscribers: Vec<String>,
    pub is_private: bool,
    pub tags: Vec<String>,
}

/// Summary counts over the catalog.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogStats {
    pub total_topics: usize,
    pub public_topics: usize,
    pub private_topics: usize,
    pub total_subscribers: usize,
}

#[derive(Debug, Default)]
struct CatalogState {
    topics: HashMap<String, TopicInfo>,
    agent_topics: HashMap<String, HashSet<String>>,
}

/// Process-local topic registry.
#[derive(Debug, Default)]
pub struct TopicCatalog {
    state: Mutex<CatalogState>,
}

impl TopicCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a topic. If the name is already known, the existing record is
    /// returned unchanged.
    pub async fn create_topic(
        &self,
        name: &str,
        created_by: &str,
        description: Option<String>,
        is_private: bool,
        tags: Vec<String>,
    ) -> TopicInfo {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.topics.get(name) {
            warn!(topic = name, "topic already exists");
            return existing.clone();
        }

        let info = TopicInfo {
            name: name.to_string(),
            description,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            message_count: 0,
            subscribers: Vec::new(),
            is_private,
            tags,
        };
        state.topics.insert(name.to_string(), info.clone());
        info!(topic = name, created_by, "created topic");
        info
    }

    /// Record a topic if missing, tagging it as auto-created.
    pub async fn ensure_topic(&self, name: &str, created_by: &str, creator_name: &str) -> TopicInfo {
        {
            let state = self.state.lock().await;
            if let Some(existing) = state.topics.get(name) {
                return existing.clone();
            }
        }
        self.create_topic(
            name,
            created_by,
            Some(format!("Auto-created by {creator_name}")),
            false,
            Vec::new(),
        )
        .await
    }

    pub async fn topic(&self, name: &str) -> Option<TopicInfo> {
        self.state.lock().await.topics.get(name).cloned()
    }

    /// List topics, optionally restricted to one agent's subscriptions or by
    /// tags. Private topics are hidden unless requested.
    pub async fn list_topics(
        &self,
        agent_id: Option<&str>,
        tags: Option<&[String]>,
        include_private: bool,
    ) -> Vec<TopicInfo> {
        let state = self.state.lock().await;
        state
            .topics
            .values()
            .filter(|topic| {
                if let Some(agent_id) = agent_id {
                    if !state
                        .agent_topics
                        .get(agent_id)
                        .is_some_and(|topics| topics.contains(&topic.name))
                    {
                        return false;
                    }
                }
                if let Some(tags) = tags {
                    if !tags.iter().any(|tag| topic.tags.contains(tag)) {
                        return false;
                    }
                }
                include_private || !topic.is_private
            })
            .cloned()
            .collect()
    }

    /// Case-insensitive search over topic names and descriptions.
    pub async fn search(&self, query: &str) -> Vec<TopicInfo> {
        let query = query.to_lowercase();
        let state = self.state.lock().await;
        state
            .topics
            .values()
            .filter(|topic| {
                topic.name.to_lowercase().contains(&query)
                    || topic
                        .description
                        .as_ref()
                        .is_some_and(|d| d.to_lowercase().contains(&query))
            })
            .cloned()
            .collect()
    }

    /// Track an agent as a subscriber of a known topic.
    pub async fn add_subscriber(&self, topic: &str, agent_id: &str) -> bool {
        let mut state = self.state.lock().await;
        if !state.topics.contains_key(topic) {
            warn!(topic, "cannot subscribe to unknown topic");
            return false;
        }
        state
            .agent_topics
            .entry(agent_id.to_string())
            .or_default()
            .insert(topic.to_string());
        if let Some(info) = state.topics.get_mut(topic) {
            if !info.subscribers.iter().any(|s| s == agent_id) {
                info.subscribers.push(agent_id.to_string());
            }
        }
        true
    }

    pub async fn remove_subscriber(&self, topic: &str, agent_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state
            .agent_topics
            .get_mut(agent_id)
            .is_some_and(|topics| topics.remove(topic));
        if removed {
            if let Some(info) = state.topics.get_mut(topic) {
                info.subscribers.retain(|s| s != agent_id);
            }
        }
        removed
    }

    pub async fn record_message(&self, topic: &str) {
        let mut state = self.state.lock().await;
        if let Some(info) = state.topics.get_mut(topic) {
            info.message_count += 1;
        }
    }

    /// Delete a topic record.
    ///
    /// Deletion policy preserved from existing behavior: the creator can
    /// always delete; non-creators are rejected for public topics but pass
    /// the private-topic branch. Intentionally kept as-is.
    pub async fn delete_topic(&self, topic: &str, deleted_by: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(info) = state.topics.get(topic) else {
            return false;
        };
        if info.created_by != deleted_by && !info.is_private {
            warn!(topic, deleted_by, "agent not authorized to delete topic");
            return false;
        }

        for topics in state.agent_topics.values_mut() {
            topics.remove(topic);
        }
        state.topics.remove(topic);
        info!(topic, deleted_by, "deleted topic");
        true
    }

    pub async fn stats(&self) -> CatalogStats {
        let state = self.state.lock().await;
        let mut stats = CatalogStats {
            total_topics: state.topics.len(),
            ..Default::default()
        };
        for topic in state.topics.values() {
            if topic.is_private {
                stats.private_topics += 1;
            } else {
                stats.public_topics += 1;
            }
            stats.total_subscribers += topic.subscribers.len();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("research", "alice", Some("shared notes".into()), false, vec![])
            .await;

        let info = catalog.topic("research").await.unwrap();
        assert_eq!(info.created_by, "alice");
        assert!(catalog.topic("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_returns_existing() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("research", "alice", None, false, vec![])
            .await;
        let second = catalog
            .create_topic("research", "bob", None, false, vec![])
            .await;
        assert_eq!(second.created_by, "alice");
    }

    #[tokio::test]
    async fn test_subscriber_bookkeeping() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("research", "alice", None, false, vec![])
            .await;

        assert!(catalog.add_subscriber("research", "bob").await);
        assert!(!catalog.add_subscriber("unknown", "bob").await);

        let info = catalog.topic("research").await.unwrap();
        assert_eq!(info.subscribers, vec!["bob"]);

        assert!(catalog.remove_subscriber("research", "bob").await);
        assert!(!catalog.remove_subscriber("research", "bob").await);
    }

    #[tokio::test]
    async fn test_list_hides_private_by_default() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("public-room", "alice", None, false, vec![])
            .await;
        catalog
            .create_topic("private-room", "alice", None, true, vec![])
            .await;

        assert_eq!(catalog.list_topics(None, None, false).await.len(), 1);
        assert_eq!(catalog.list_topics(None, None, true).await.len(), 2);
    }

    #[tokio::test]
    async fn test_list_by_tags() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("a", "alice", None, false, vec!["ml".into()])
            .await;
        catalog
            .create_topic("b", "alice", None, false, vec!["infra".into()])
            .await;

        let tags = vec!["ml".to_string()];
        let listed = catalog.list_topics(None, Some(&tags), false).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
    }

    #[tokio::test]
    async fn test_search_matches_name_and_description() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("research", "alice", Some("Paper Reviews".into()), false, vec![])
            .await;

        assert_eq!(catalog.search("SEARCH").await.len(), 1);
        assert_eq!(catalog.search("reviews").await.len(), 1);
        assert!(catalog.search("nothing").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_policy_asymmetry() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("public-room", "alice", None, false, vec![])
            .await;
        catalog
            .create_topic("private-room", "alice", None, true, vec![])
            .await;

        // Non-creator cannot delete a public topic...
        assert!(!catalog.delete_topic("public-room", "bob").await);
        // ...but the private-topic branch of the policy lets them through.
        assert!(catalog.delete_topic("private-room", "bob").await);
        // Creator can always delete.
        assert!(catalog.delete_topic("public-room", "alice").await);
    }

    #[tokio::test]
    async fn test_stats() {
        let catalog = TopicCatalog::new();
        catalog
            .create_topic("a", "alice", None, false, vec![])
            .await;
        catalog.create_topic("b", "alice", None, true, vec![]).await;
        catalog.add_subscriber("a", "bob").await;

        let stats = catalog.stats().await;
        assert_eq!(stats.total_topics, 2);
        assert_eq!(stats.public_topics, 1);
        assert_eq!(stats.private_topics, 1);
        assert_eq!(stats.total_subscribers, 1);
    }
}
