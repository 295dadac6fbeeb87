//! Priority-ordered routing rules
//!
//! The rule engine computes the additional topics a message should be fanned
//! out to. Rules are evaluated independently in priority order with no
//! short-circuiting; the final target set is the union of all matched rules'
//! targets minus the message's own topic.

use crate::protocol::{AgentMessage, MessageKind, MessagePriority};
use crate::routing::filter::{FilterError, MessagePredicate};
use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_ROUTE_HISTORY: usize = 1000;

/// Type-specific condition for a routing rule.
///
/// Conditions are a closed tagged union keyed by rule type, so heterogeneous
/// rules can be stored and matched exhaustively.
#[derive(Clone)]
pub enum RuleCondition {
    /// Case-insensitive substring match against content, ANY keyword
    Keyword(Vec<String>),
    /// Case-insensitive regex search against content
    ContentRegex(Regex),
    /// Sender role membership
    SenderRole(HashSet<String>),
    /// Message kind membership
    Kind(HashSet<MessageKind>),
    /// Priority ordinal at or above the threshold
    PriorityAtLeast(MessagePriority),
    /// All metadata key/value pairs equal
    Metadata(HashMap<String, Value>),
    /// Caller-supplied predicate; failures count as non-match
    Custom(Arc<dyn MessagePredicate>),
}

impl RuleCondition {
    /// Compile a case-insensitive content regex condition.
    pub fn content_regex(pattern: &str) -> Result<Self, FilterError> {
        Ok(RuleCondition::ContentRegex(
            RegexBuilder::new(pattern).case_insensitive(true).build()?,
        ))
    }

    /// Stable name of the condition type, used in stats and exports.
    pub fn type_name(&self) -> &'static str {
        match self {
            RuleCondition::Keyword(_) => "content_keyword",
            RuleCondition::ContentRegex(_) => "content_regex",
            RuleCondition::SenderRole(_) => "sender_role",
            RuleCondition::Kind(_) => "message_kind",
            RuleCondition::PriorityAtLeast(_) => "priority_threshold",
            RuleCondition::Metadata(_) => "metadata",
            RuleCondition::Custom(_) => "custom_predicate",
        }
    }

    fn evaluate(&self, message: &AgentMessage, rule_id: &str) -> bool {
        match self {
            RuleCondition::Keyword(keywords) => {
                let content = message.content.to_lowercase();
                keywords
                    .iter()
                    .any(|keyword| content.contains(&keyword.to_lowercase()))
            }
            RuleCondition::ContentRegex(regex) => regex.is_match(&message.content),
            RuleCondition::SenderRole(roles) => roles.contains(&message.sender_role),
            RuleCondition::Kind(kinds) => kinds.contains(&message.kind),
            RuleCondition::PriorityAtLeast(min) => message.priority >= *min,
            RuleCondition::Metadata(constraints) => constraints
                .iter()
                .all(|(key, expected)| message.metadata.get(key) == Some(expected)),
            RuleCondition::Custom(predicate) => match predicate.evaluate(message) {
                Ok(matched) => matched,
                Err(e) => {
                    warn!(
                        rule_id,
                        predicate = predicate.name(),
                        "rule predicate failed, treating as non-match: {e}"
                    );
                    false
                }
            },
        }
    }
}

impl fmt::Debug for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleCondition::Keyword(k) => f.debug_tuple("Keyword").field(k).finish(),
            RuleCondition::ContentRegex(r) => {
                f.debug_tuple("ContentRegex").field(&r.as_str()).finish()
            }
            RuleCondition::SenderRole(r) => f.debug_tuple("SenderRole").field(r).finish(),
            RuleCondition::Kind(k) => f.debug_tuple("Kind").field(k).finish(),
            RuleCondition::PriorityAtLeast(p) => {
                f.debug_tuple("PriorityAtLeast").field(p).finish()
            }
            RuleCondition::Metadata(m) => f.debug_tuple("Metadata").field(m).finish(),
            RuleCondition::Custom(p) => f.debug_tuple("Custom").field(&p.name()).finish(),
        }
    }
}

/// A routing rule: condition, fan-out targets, and evaluation priority.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub id: String,
    pub condition: RuleCondition,
    pub target_topics: Vec<String>,
    /// Higher priority rules are evaluated first; ties keep insertion order.
    pub priority: i32,
    pub active: bool,
    pub description: Option<String>,
}

impl RoutingRule {
    pub fn new(
        id: impl Into<String>,
        condition: RuleCondition,
        target_topics: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            condition,
            target_topics: target_topics.into_iter().map(Into::into).collect(),
            priority: 0,
            active: true,
            description: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One entry in the bounded route history.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub message_id: Uuid,
    pub source_topic: String,
    pub matched_rules: Vec<String>,
    pub target_topics: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Counts describing the rule set and its routing activity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingStats {
    pub total_rules: usize,
    pub active_rules: usize,
    pub inactive_rules: usize,
    pub by_type: HashMap<String, usize>,
    pub total_routes: usize,
}

/// Serializable rule form used by export/import.
///
/// Custom-predicate rules have no serializable condition and are skipped on
/// export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    #[serde(flatten)]
    pub condition: ConditionSpec,
    pub target_topics: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "rule_type", content = "condition", rename_all = "snake_case")]
pub enum ConditionSpec {
    ContentKeyword(Vec<String>),
    ContentRegex(String),
    SenderRole(Vec<String>),
    MessageKind(Vec<MessageKind>),
    PriorityThreshold(MessagePriority),
    Metadata(HashMap<String, Value>),
}

#[derive(Debug, Default)]
struct RouterState {
    rules: Vec<RoutingRule>,
    history: VecDeque<RouteRecord>,
}

/// Routes messages to additional topics based on configurable rules.
#[derive(Debug, Default)]
pub struct MessageRouter {
    state: Mutex<RouterState>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule and re-sort the rule list by descending priority.
    ///
    /// The sort is stable, so rules with equal priority keep insertion order.
    pub async fn add_rule(&self, rule: RoutingRule) -> RoutingRule {
        let mut state = self.state.lock().await;
        info!(rule_id = %rule.id, priority = rule.priority, "added routing rule");
        state.rules.push(rule.clone());
        state.rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        rule
    }

    /// Remove a rule by id. Returns whether it existed.
    pub async fn remove_rule(&self, rule_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.rules.len();
        state.rules.retain(|r| r.id != rule_id);
        let removed = state.rules.len() < before;
        if removed {
            info!(rule_id, "removed routing rule");
        }
        removed
    }

    pub async fn enable_rule(&self, rule_id: &str) -> bool {
        self.set_active(rule_id, true).await
    }

    pub async fn disable_rule(&self, rule_id: &str) -> bool {
        self.set_active(rule_id, false).await
    }

    async fn set_active(&self, rule_id: &str, active: bool) -> bool {
        let mut state = self.state.lock().await;
        for rule in state.rules.iter_mut() {
            if rule.id == rule_id {
                rule.active = active;
                info!(rule_id, active, "routing rule state changed");
                return true;
            }
        }
        false
    }

    /// Look up a rule by id.
    pub async fn rule(&self, rule_id: &str) -> Option<RoutingRule> {
        let state = self.state.lock().await;
        state.rules.iter().find(|r| r.id == rule_id).cloned()
    }

    /// Snapshot of the current rule list in evaluation order.
    pub async fn rules(&self) -> Vec<RoutingRule> {
        self.state.lock().await.rules.clone()
    }

    /// Compute the fan-out target set for a message.
    ///
    /// Every active rule is evaluated; the result is the union of matched
    /// rules' targets with the message's own topic excluded. A route record
    /// is appended to the bounded history.
    pub async fn route(&self, message: &AgentMessage) -> HashSet<String> {
        let mut state = self.state.lock().await;
        let span = crate::routing_span!(message_id = %message.id, topic = %message.topic);
        let _guard = span.enter();

        let mut targets = HashSet::new();
        let mut matched_rules = Vec::new();
        for rule in &state.rules {
            if !rule.active {
                continue;
            }
            if rule.condition.evaluate(message, &rule.id) {
                targets.extend(rule.target_topics.iter().cloned());
                matched_rules.push(rule.id.clone());
                debug!(message_id = %message.id, rule_id = %rule.id, "message matched routing rule");
            }
        }
        targets.remove(&message.topic);

        let record = RouteRecord {
            message_id: message.id,
            source_topic: message.topic.clone(),
            matched_rules,
            target_topics: targets.iter().cloned().collect(),
            timestamp: message.timestamp,
        };
        state.history.push_back(record);
        if state.history.len() > MAX_ROUTE_HISTORY {
            state.history.pop_front();
        }

        targets
    }

    /// Route history, newest last, optionally filtered by target topic.
    pub async fn history(
        &self,
        limit: Option<usize>,
        topic_filter: Option<&str>,
    ) -> Vec<RouteRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<RouteRecord> = state
            .history
            .iter()
            .filter(|record| match topic_filter {
                Some(topic) => record.target_topics.iter().any(|t| t == topic),
                None => true,
            })
            .cloned()
            .collect();
        if let Some(limit) = limit {
            let start = records.len().saturating_sub(limit);
            records.drain(..start);
        }
        records
    }

    pub async fn clear_history(&self) {
        let mut state = self.state.lock().await;
        state.history.clear();
        info!("cleared routing history");
    }

    pub async fn stats(&self) -> RoutingStats {
        let state = self.state.lock().await;
        let mut stats = RoutingStats {
            total_rules: state.rules.len(),
            total_routes: state.history.len(),
            ..Default::default()
        };
        for rule in &state.rules {
            if rule.active {
                stats.active_rules += 1;
            } else {
                stats.inactive_rules += 1;
            }
            *stats
                .by_type
                .entry(rule.condition.type_name().to_string())
                .or_default() += 1;
        }
        stats
    }

    /// Export the serializable subset of the rule list.
    ///
    /// Custom-predicate rules are skipped with a warning.
    pub async fn export_rules(&self) -> Vec<RuleSpec> {
        let state = self.state.lock().await;
        state
            .rules
            .iter()
            .filter_map(|rule| {
                let condition = match &rule.condition {
                    RuleCondition::Keyword(k) => ConditionSpec::ContentKeyword(k.clone()),
                    RuleCondition::ContentRegex(r) => {
                        ConditionSpec::ContentRegex(r.as_str().to_string())
                    }
                    RuleCondition::SenderRole(r) => {
                        ConditionSpec::SenderRole(r.iter().cloned().collect())
                    }
                    RuleCondition::Kind(k) => {
                        ConditionSpec::MessageKind(k.iter().copied().collect())
                    }
                    RuleCondition::PriorityAtLeast(p) => ConditionSpec::PriorityThreshold(*p),
                    RuleCondition::Metadata(m) => ConditionSpec::Metadata(m.clone()),
                    RuleCondition::Custom(_) => {
                        warn!(rule_id = %rule.id, "skipping custom rule during export");
                        return None;
                    }
                };
                Some(RuleSpec {
                    id: rule.id.clone(),
                    condition,
                    target_topics: rule.target_topics.clone(),
                    priority: rule.priority,
                    active: rule.active,
                    description: rule.description.clone(),
                })
            })
            .collect()
    }

    /// Import rules from their serializable form. Returns the number imported;
    /// specs with invalid regexes are skipped and logged.
    pub async fn import_rules(&self, specs: Vec<RuleSpec>) -> usize {
        let mut imported = 0;
        let mut state = self.state.lock().await;
        for spec in specs {
            let condition = match spec.condition {
                ConditionSpec::ContentKeyword(k) => RuleCondition::Keyword(k),
                ConditionSpec::ContentRegex(pattern) => match RuleCondition::content_regex(&pattern)
                {
                    Ok(condition) => condition,
                    Err(e) => {
                        warn!(rule_id = %spec.id, "skipping rule with invalid regex: {e}");
                        continue;
                    }
                },
                ConditionSpec::SenderRole(r) => {
                    RuleCondition::SenderRole(r.into_iter().collect())
                }
                ConditionSpec::MessageKind(k) => RuleCondition::Kind(k.into_iter().collect()),
                ConditionSpec::PriorityThreshold(p) => RuleCondition::PriorityAtLeast(p),
                ConditionSpec::Metadata(m) => RuleCondition::Metadata(m),
            };
            state.rules.push(RoutingRule {
                id: spec.id,
                condition,
                target_topics: spec.target_topics,
                priority: spec.priority,
                active: spec.active,
                description: spec.description,
            });
            imported += 1;
        }
        state.rules.sort_by_key(|r| std::cmp::Reverse(r.priority));
        info!(imported, "imported routing rules");
        imported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::filter::PredicateError;

    fn message(topic: &str, content: &str) -> AgentMessage {
        AgentMessage::builder()
            .sender("agent-1", "Agent One", "worker")
            .kind(MessageKind::Text)
            .content(content)
            .topic(topic)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_keyword_rule_fans_out() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "alerts",
                RuleCondition::Keyword(vec!["failure".into()]),
                ["alerts", "oncall"],
            ))
            .await;

        let targets = router.route(&message("ops", "disk FAILURE on db-2")).await;
        assert_eq!(
            targets,
            HashSet::from(["alerts".to_string(), "oncall".to_string()])
        );
    }

    #[tokio::test]
    async fn test_route_excludes_own_topic() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "echo",
                RuleCondition::Keyword(vec!["ops".into()]),
                ["ops", "audit"],
            ))
            .await;

        let targets = router.route(&message("ops", "ops report")).await;
        assert_eq!(targets, HashSet::from(["audit".to_string()]));
    }

    #[tokio::test]
    async fn test_rules_are_independent_no_short_circuit() {
        let router = MessageRouter::new();
        router
            .add_rule(
                RoutingRule::new(
                    "high-pri",
                    RuleCondition::PriorityAtLeast(MessagePriority::High),
                    ["urgent"],
                )
                .priority(100),
            )
            .await;
        router
            .add_rule(
                RoutingRule::new(
                    "tasks",
                    RuleCondition::Kind(HashSet::from([MessageKind::Task])),
                    ["work"],
                )
                .priority(50),
            )
            .await;

        let mut msg = message("ops", "please handle");
        msg.kind = MessageKind::Task;
        msg.priority = MessagePriority::Urgent;

        let targets = router.route(&msg).await;
        assert_eq!(
            targets,
            HashSet::from(["urgent".to_string(), "work".to_string()])
        );
    }

    #[tokio::test]
    async fn test_priority_order_is_stable_on_ties() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new("first", RuleCondition::Keyword(vec!["x".into()]), ["a"]).priority(10))
            .await;
        router
            .add_rule(RoutingRule::new("second", RuleCondition::Keyword(vec!["x".into()]), ["b"]).priority(10))
            .await;
        router
            .add_rule(RoutingRule::new("top", RuleCondition::Keyword(vec!["x".into()]), ["c"]).priority(20))
            .await;

        let order: Vec<String> = router.rules().await.into_iter().map(|r| r.id).collect();
        assert_eq!(order, vec!["top", "first", "second"]);
    }

    #[tokio::test]
    async fn test_disabled_rule_does_not_match() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "alerts",
                RuleCondition::Keyword(vec!["failure".into()]),
                ["alerts"],
            ))
            .await;
        assert!(router.disable_rule("alerts").await);

        let targets = router.route(&message("ops", "failure detected")).await;
        assert!(targets.is_empty());

        assert!(router.enable_rule("alerts").await);
        let targets = router.route(&message("ops", "failure detected")).await;
        assert_eq!(targets.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_rule() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "r1",
                RuleCondition::Keyword(vec!["x".into()]),
                ["a"],
            ))
            .await;
        assert!(router.remove_rule("r1").await);
        assert!(!router.remove_rule("r1").await);
    }

    #[tokio::test]
    async fn test_regex_rule() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "incident",
                RuleCondition::content_regex(r"sev[12]").unwrap(),
                ["incidents"],
            ))
            .await;

        assert_eq!(router.route(&message("ops", "SEV1 declared")).await.len(), 1);
        assert!(router.route(&message("ops", "sev3 logged")).await.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_rule_requires_all_pairs() {
        let router = MessageRouter::new();
        let mut constraints = HashMap::new();
        constraints.insert("env".to_string(), serde_json::json!("prod"));
        constraints.insert("service".to_string(), serde_json::json!("billing"));
        router
            .add_rule(RoutingRule::new(
                "billing-prod",
                RuleCondition::Metadata(constraints),
                ["billing-alerts"],
            ))
            .await;

        let mut msg = message("ops", "payment issue");
        msg.metadata.insert("env".into(), serde_json::json!("prod"));
        assert!(router.route(&msg).await.is_empty());

        msg.metadata
            .insert("service".into(), serde_json::json!("billing"));
        assert_eq!(router.route(&msg).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_custom_predicate_is_non_match() {
        struct Boom;
        impl MessagePredicate for Boom {
            fn name(&self) -> &str {
                "boom"
            }
            fn evaluate(&self, _m: &AgentMessage) -> Result<bool, PredicateError> {
                Err(PredicateError("broken".into()))
            }
        }

        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "custom",
                RuleCondition::Custom(Arc::new(Boom)),
                ["somewhere"],
            ))
            .await;

        let targets = router.route(&message("ops", "anything")).await;
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_recorded_and_bounded() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "r",
                RuleCondition::Keyword(vec!["match".into()]),
                ["dst"],
            ))
            .await;

        for i in 0..(MAX_ROUTE_HISTORY + 5) {
            router.route(&message("ops", &format!("match {i}"))).await;
        }

        let history = router.history(None, None).await;
        assert_eq!(history.len(), MAX_ROUTE_HISTORY);
        // Oldest entries evicted first
        assert!(history[0].message_id != history[history.len() - 1].message_id);

        let filtered = router.history(Some(3), Some("dst")).await;
        assert_eq!(filtered.len(), 3);
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let router = MessageRouter::new();
        router
            .add_rule(
                RoutingRule::new(
                    "kw",
                    RuleCondition::Keyword(vec!["alert".into()]),
                    ["alerts"],
                )
                .priority(5)
                .description("keyword rule"),
            )
            .await;
        router
            .add_rule(RoutingRule::new(
                "custom",
                RuleCondition::Custom(Arc::new({
                    struct Yes;
                    impl MessagePredicate for Yes {
                        fn name(&self) -> &str {
                            "yes"
                        }
                        fn evaluate(&self, _m: &AgentMessage) -> Result<bool, PredicateError> {
                            Ok(true)
                        }
                    }
                    Yes
                })),
                ["x"],
            ))
            .await;

        let exported = router.export_rules().await;
        // Custom rule is not exportable
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].id, "kw");

        let other = MessageRouter::new();
        assert_eq!(other.import_rules(exported).await, 1);
        let targets = other.route(&message("ops", "alert!")).await;
        assert_eq!(targets, HashSet::from(["alerts".to_string()]));
    }

    #[tokio::test]
    async fn test_stats() {
        let router = MessageRouter::new();
        router
            .add_rule(RoutingRule::new(
                "a",
                RuleCondition::Keyword(vec!["x".into()]),
                ["t"],
            ))
            .await;
        router
            .add_rule(RoutingRule::new(
                "b",
                RuleCondition::PriorityAtLeast(MessagePriority::High),
                ["t"],
            ))
            .await;
        router.disable_rule("b").await;
        router.route(&message("ops", "x")).await;

        let stats = router.stats().await;
        assert_eq!(stats.total_rules, 2);
        assert_eq!(stats.active_rules, 1);
        assert_eq!(stats.inactive_rules, 1);
        assert_eq!(stats.by_type.get("content_keyword"), Some(&1));
        assert_eq!(stats.by_type.get("priority_threshold"), Some(&1));
        assert_eq!(stats.total_routes, 1);
    }
}
