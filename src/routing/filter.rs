//! Subscription filter evaluation
//!
//! Pure predicate logic deciding whether a message matches a subscription's
//! filter criteria. Evaluation is deterministic, side-effect free, and total:
//! a failing custom predicate is logged and treated as a non-match, never
//! propagated.

use crate::protocol::{AgentMessage, MessageKind, MessagePriority};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors raised while constructing a filter.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid content regex: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Error returned by a custom predicate that could not be evaluated.
#[derive(Debug, Error)]
#[error("predicate failed: {0}")]
pub struct PredicateError(pub String);

/// A named, caller-supplied predicate over messages.
///
/// Custom subscription filters and routing rule conditions are expressed
/// through this closed interface rather than an untyped callable, so
/// heterogeneous conditions can live behind one tagged representation.
/// Returning `Err` counts as a non-match.
pub trait MessagePredicate: Send + Sync {
    /// Identifier used in logs when the predicate fails.
    fn name(&self) -> &str;

    fn evaluate(&self, message: &AgentMessage) -> Result<bool, PredicateError>;
}

/// Filter criteria for topic subscriptions.
///
/// Every supplied clause must pass (logical AND). An empty filter accepts all
/// messages. Keyword matching is case-insensitive substring with ANY
/// semantics; the content regex is compiled case-insensitively at
/// construction time.
#[derive(Clone, Default)]
pub struct SubscriptionFilter {
    /// Allowed message kinds
    pub kinds: Option<HashSet<MessageKind>>,
    /// Minimum priority (ordinal comparison)
    pub min_priority: Option<MessagePriority>,
    /// Content keywords, ANY match
    pub keywords: Option<Vec<String>>,
    /// Content regex, case-insensitive search
    pub content_regex: Option<Regex>,
    /// Sender allow-list
    pub allowed_senders: Option<HashSet<String>>,
    /// Sender block-list
    pub blocked_senders: Option<HashSet<String>>,
    /// Sender role allow-list
    pub allowed_roles: Option<HashSet<String>>,
    /// Sender role block-list
    pub blocked_roles: Option<HashSet<String>>,
    /// Metadata equality constraints, all must match
    pub metadata: Option<HashMap<String, Value>>,
    /// Custom predicate, evaluated last
    pub custom: Option<Arc<dyn MessagePredicate>>,
}

impl fmt::Debug for SubscriptionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionFilter")
            .field("kinds", &self.kinds)
            .field("min_priority", &self.min_priority)
            .field("keywords", &self.keywords)
            .field("content_regex", &self.content_regex.as_ref().map(Regex::as_str))
            .field("allowed_senders", &self.allowed_senders)
            .field("blocked_senders", &self.blocked_senders)
            .field("allowed_roles", &self.allowed_roles)
            .field("blocked_roles", &self.blocked_roles)
            .field("metadata", &self.metadata)
            .field("custom", &self.custom.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl SubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = MessageKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn min_priority(mut self, priority: MessagePriority) -> Self {
        self.min_priority = Some(priority);
        self
    }

    pub fn keywords(mut self, keywords: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.keywords = Some(keywords.into_iter().map(Into::into).collect());
        self
    }

    /// Compile and attach a case-insensitive content regex.
    pub fn content_regex(mut self, pattern: &str) -> Result<Self, FilterError> {
        self.content_regex = Some(RegexBuilder::new(pattern).case_insensitive(true).build()?);
        Ok(self)
    }

    pub fn allow_senders(mut self, senders: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_senders = Some(senders.into_iter().map(Into::into).collect());
        self
    }

    pub fn block_senders(mut self, senders: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blocked_senders = Some(senders.into_iter().map(Into::into).collect());
        self
    }

    pub fn allow_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn block_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.blocked_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn metadata_equals(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn custom(mut self, predicate: Arc<dyn MessagePredicate>) -> Self {
        self.custom = Some(predicate);
        self
    }

    /// Evaluate the filter against a message.
    ///
    /// Clause order: kind, priority, keywords, regex, sender allow/block,
    /// role allow/block, metadata equality, custom predicate.
    pub fn matches(&self, message: &AgentMessage) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&message.kind) {
                return false;
            }
        }

        if let Some(min) = self.min_priority {
            if message.priority < min {
                return false;
            }
        }

        if let Some(keywords) = &self.keywords {
            let content = message.content.to_lowercase();
            if !keywords
                .iter()
                .any(|keyword| content.contains(&keyword.to_lowercase()))
            {
                return false;
            }
        }

        if let Some(regex) = &self.content_regex {
            if !regex.is_match(&message.content) {
                return false;
            }
        }

        if let Some(allowed) = &self.allowed_senders {
            if !allowed.contains(&message.sender_id) {
                return false;
            }
        }
        if let Some(blocked) = &self.blocked_senders {
            if blocked.contains(&message.sender_id) {
                return false;
            }
        }

        if let Some(allowed) = &self.allowed_roles {
            if !allowed.contains(&message.sender_role) {
                return false;
            }
        }
        if let Some(blocked) = &self.blocked_roles {
            if blocked.contains(&message.sender_role) {
                return false;
            }
        }

        if let Some(constraints) = &self.metadata {
            for (key, expected) in constraints {
                if message.metadata.get(key) != Some(expected) {
                    return false;
                }
            }
        }

        if let Some(predicate) = &self.custom {
            return match predicate.evaluate(message) {
                Ok(matched) => matched,
                Err(e) => {
                    warn!(
                        predicate = predicate.name(),
                        message_id = %message.id,
                        "custom filter predicate failed, treating as non-match: {e}"
                    );
                    false
                }
            };
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageKind;
    use serde_json::json;

    fn message(content: &str) -> AgentMessage {
        AgentMessage::builder()
            .sender("agent-1", "Agent One", "worker")
            .kind(MessageKind::Text)
            .content(content)
            .topic("ops")
            .build()
            .unwrap()
    }

    struct AlwaysErr;
    impl MessagePredicate for AlwaysErr {
        fn name(&self) -> &str {
            "always-err"
        }
        fn evaluate(&self, _message: &AgentMessage) -> Result<bool, PredicateError> {
            Err(PredicateError("boom".into()))
        }
    }

    struct ContentLongerThan(usize);
    impl MessagePredicate for ContentLongerThan {
        fn name(&self) -> &str {
            "content-longer-than"
        }
        fn evaluate(&self, message: &AgentMessage) -> Result<bool, PredicateError> {
            Ok(message.content.len() > self.0)
        }
    }

    #[test]
    fn test_empty_filter_accepts_all() {
        let filter = SubscriptionFilter::new();
        assert!(filter.matches(&message("anything at all")));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let filter = SubscriptionFilter::new().keywords(["urgent", "important"]);
        assert!(filter.matches(&message("This is URGENT")));
        assert!(!filter.matches(&message("routine update")));
    }

    #[test]
    fn test_kind_membership() {
        let filter = SubscriptionFilter::new().kinds([MessageKind::Task, MessageKind::Query]);
        let mut msg = message("do the thing");
        msg.kind = MessageKind::Task;
        assert!(filter.matches(&msg));
        msg.kind = MessageKind::Heartbeat;
        assert!(!filter.matches(&msg));
    }

    #[test]
    fn test_min_priority_is_ordinal() {
        let filter = SubscriptionFilter::new().min_priority(MessagePriority::High);
        let mut msg = message("status");
        msg.priority = MessagePriority::Urgent;
        assert!(filter.matches(&msg));
        msg.priority = MessagePriority::High;
        assert!(filter.matches(&msg));
        msg.priority = MessagePriority::Normal;
        assert!(!filter.matches(&msg));
    }

    #[test]
    fn test_regex_search_case_insensitive() {
        let filter = SubscriptionFilter::new()
            .content_regex(r"deploy (failed|aborted)")
            .unwrap();
        assert!(filter.matches(&message("Deploy FAILED on node 3")));
        assert!(!filter.matches(&message("deploy succeeded")));
    }

    #[test]
    fn test_invalid_regex_is_rejected_at_construction() {
        assert!(SubscriptionFilter::new().content_regex("(unclosed").is_err());
    }

    #[test]
    fn test_sender_allow_and_block() {
        let filter = SubscriptionFilter::new().allow_senders(["agent-1"]);
        assert!(filter.matches(&message("hi")));

        let filter = SubscriptionFilter::new().block_senders(["agent-1"]);
        assert!(!filter.matches(&message("hi")));
    }

    #[test]
    fn test_role_allow_and_block() {
        let filter = SubscriptionFilter::new().allow_roles(["worker", "general"]);
        assert!(filter.matches(&message("hi")));

        let filter = SubscriptionFilter::new().block_roles(["worker"]);
        assert!(!filter.matches(&message("hi")));
    }

    #[test]
    fn test_metadata_all_pairs_must_match() {
        let filter = SubscriptionFilter::new()
            .metadata_equals("env", json!("prod"))
            .metadata_equals("region", json!("eu"));

        let mut msg = message("hi");
        msg.metadata.insert("env".into(), json!("prod"));
        assert!(!filter.matches(&msg));

        msg.metadata.insert("region".into(), json!("eu"));
        assert!(filter.matches(&msg));
    }

    #[test]
    fn test_clauses_combine_with_and() {
        let filter = SubscriptionFilter::new()
            .min_priority(MessagePriority::High)
            .keywords(["alert"]);

        let mut msg = message("alert: disk full");
        msg.priority = MessagePriority::Low;
        assert!(!filter.matches(&msg));
        msg.priority = MessagePriority::Urgent;
        assert!(filter.matches(&msg));
    }

    #[test]
    fn test_custom_predicate_failure_is_non_match() {
        let filter = SubscriptionFilter::new().custom(Arc::new(AlwaysErr));
        assert!(!filter.matches(&message("hi")));
    }

    #[test]
    fn test_custom_predicate_drives_result() {
        let filter = SubscriptionFilter::new().custom(Arc::new(ContentLongerThan(5)));
        assert!(filter.matches(&message("long enough")));
        assert!(!filter.matches(&message("hi")));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let filter = SubscriptionFilter::new()
            .keywords(["urgent"])
            .min_priority(MessagePriority::Normal);
        let msg = message("urgent maintenance window");
        let first = filter.matches(&msg);
        for _ in 0..10 {
            assert_eq!(filter.matches(&msg), first);
        }
    }
}
