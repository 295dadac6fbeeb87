//! Topic naming policy and per-topic access control
//!
//! Topic names are lowercase alphanumeric-plus-hyphen, 3 to 50 characters,
//! with no leading, trailing, or consecutive hyphens, and must avoid a small
//! reserved set. Typed topics additionally carry a naming prefix (for example
//! `team-*`). Permission checks are monotonic over read < write < admin <
//! owner; the absence of any record for an agent always denies.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

const MIN_TOPIC_LENGTH: usize = 3;
const MAX_TOPIC_LENGTH: usize = 50;

const RESERVED_TOPICS: [&str; 6] = ["system", "admin", "config", "logs", "metrics", "health"];

static VALID_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9-]+$").expect("charset pattern is valid")
});

/// Categories of topics, each with its own naming pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicType {
    General,
    Team,
    Project,
    Private,
    System,
    Random,
}

impl TopicType {
    fn prefix(&self) -> Option<&'static str> {
        match self {
            TopicType::Team => Some("team-"),
            TopicType::Project => Some("project-"),
            TopicType::Private => Some("private-"),
            _ => None,
        }
    }
}

/// Access tiers, ordered read < write < admin < owner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    Read,
    Write,
    Admin,
    Owner,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Admin => "admin",
            PermissionLevel::Owner => "owner",
        };
        f.write_str(name)
    }
}

/// A granted permission on a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicPermission {
    pub agent_id: String,
    pub level: PermissionLevel,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
}

/// A specific naming rule violated by a topic name.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NameViolation {
    #[error("topic name too short (minimum {MIN_TOPIC_LENGTH} characters)")]
    TooShort,
    #[error("topic name too long (maximum {MAX_TOPIC_LENGTH} characters)")]
    TooLong,
    #[error("topic name '{0}' is reserved")]
    Reserved(String),
    #[error("topic name can only contain lowercase letters, numbers, and hyphens")]
    InvalidCharacters,
    #[error("topic name cannot contain consecutive hyphens")]
    ConsecutiveHyphens,
    #[error("topic name cannot start or end with a hyphen")]
    EdgeHyphen,
    #[error("topic name does not match the {0:?} naming pattern")]
    TypeMismatch(TopicType),
    #[error("topic '{0}' already exists")]
    AlreadyExists(String),
    #[error("private topics must use the private topic type")]
    PrivateTypeMismatch,
}

/// Outcome of validating a topic name: violations plus a best-effort
/// sanitized suggestion when the name is invalid.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicNameReport {
    pub is_valid: bool,
    pub violations: Vec<NameViolation>,
    pub suggestion: Option<String>,
}

/// Validate a topic name against the naming policy.
///
/// Pure and total; every violated rule is reported, not just the first.
pub fn validate_topic_name(name: &str, topic_type: Option<TopicType>) -> TopicNameReport {
    let mut violations = Vec::new();

    if name.len() < MIN_TOPIC_LENGTH {
        violations.push(NameViolation::TooShort);
    } else if name.len() > MAX_TOPIC_LENGTH {
        violations.push(NameViolation::TooLong);
    }

    if RESERVED_TOPICS.contains(&name.to_lowercase().as_str()) {
        violations.push(NameViolation::Reserved(name.to_string()));
    }

    if !VALID_CHARSET.is_match(name) {
        violations.push(NameViolation::InvalidCharacters);
    }

    if name.contains("--") {
        violations.push(NameViolation::ConsecutiveHyphens);
    }

    if name.starts_with('-') || name.ends_with('-') {
        violations.push(NameViolation::EdgeHyphen);
    }

    if let Some(topic_type) = topic_type {
        let matches_type = match topic_type {
            TopicType::Random => name == "random",
            other => match other.prefix() {
                Some(prefix) => name.starts_with(prefix),
                None => true,
            },
        };
        if !matches_type {
            violations.push(NameViolation::TypeMismatch(topic_type));
        }
    }

    let suggestion = if violations.is_empty() {
        None
    } else {
        let cleaned = sanitize_name(name);
        (cleaned.len() >= MIN_TOPIC_LENGTH).then_some(cleaned)
    };

    TopicNameReport {
        is_valid: violations.is_empty(),
        violations,
        suggestion,
    }
}

/// Sanitize a name: non-alphanumeric becomes a hyphen, runs collapse, edges
/// trim.
fn sanitize_name(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            cleaned.push(ch);
        } else if !cleaned.ends_with('-') {
            cleaned.push('-');
        }
    }
    cleaned.trim_matches('-').to_string()
}

/// Derive a valid topic name from an arbitrary base name.
pub fn suggest_topic_name(base_name: &str, topic_type: TopicType) -> String {
    let mut suggested = sanitize_name(base_name);

    if suggested.len() < MIN_TOPIC_LENGTH {
        suggested = format!("{suggested}-topic");
        suggested = suggested.trim_matches('-').to_string();
    }

    if let Some(prefix) = topic_type.prefix() {
        if !suggested.starts_with(prefix) {
            suggested = format!("{prefix}{suggested}");
        }
    }

    if suggested.len() > MAX_TOPIC_LENGTH {
        suggested.truncate(MAX_TOPIC_LENGTH);
        suggested = suggested.trim_end_matches('-').to_string();
    }

    suggested
}

/// Per-topic permission store with monotonic level checks.
///
/// Grants are upserts: re-granting to the same agent overwrites the level.
#[derive(Debug, Default)]
pub struct AccessValidator {
    permissions: Mutex<HashMap<String, Vec<TopicPermission>>>,
}

impl AccessValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant (or overwrite) a permission level for an agent on a topic.
    pub async fn grant(
        &self,
        topic: &str,
        agent_id: &str,
        level: PermissionLevel,
        granted_by: &str,
    ) {
        let mut permissions = self.permissions.lock().await;
        let entries = permissions.entry(topic.to_string()).or_default();

        for entry in entries.iter_mut() {
            if entry.agent_id == agent_id {
                entry.level = level;
                entry.granted_by = granted_by.to_string();
                entry.granted_at = Utc::now();
                info!(agent_id, topic, level = ?level, "updated topic permission");
                return;
            }
        }

        entries.push(TopicPermission {
            agent_id: agent_id.to_string(),
            level,
            granted_by: granted_by.to_string(),
            granted_at: Utc::now(),
        });
        info!(agent_id, topic, level = ?level, granted_by, "granted topic permission");
    }

    /// Revoke an agent's permission on a topic. Returns whether a record was
    /// removed.
    pub async fn revoke(&self, topic: &str, agent_id: &str, revoked_by: &str) -> bool {
        let mut permissions = self.permissions.lock().await;
        let Some(entries) = permissions.get_mut(topic) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.agent_id != agent_id);
        let removed = entries.len() < before;
        if removed {
            info!(agent_id, topic, revoked_by, "revoked topic permission");
        }
        removed
    }

    /// Check whether an agent holds at least the required level on a topic.
    ///
    /// Holding level L satisfies any requirement <= L. No record denies.
    pub async fn check(&self, topic: &str, agent_id: &str, required: PermissionLevel) -> bool {
        let permissions = self.permissions.lock().await;
        permissions
            .get(topic)
            .and_then(|entries| entries.iter().find(|entry| entry.agent_id == agent_id))
            .map(|entry| entry.level >= required)
            .unwrap_or(false)
    }

    /// All permission records on a topic.
    pub async fn topic_permissions(&self, topic: &str) -> Vec<TopicPermission> {
        let permissions = self.permissions.lock().await;
        permissions.get(topic).cloned().unwrap_or_default()
    }

    /// All topics an agent holds permissions on, with their levels.
    pub async fn agent_permissions(&self, agent_id: &str) -> HashMap<String, PermissionLevel> {
        let permissions = self.permissions.lock().await;
        permissions
            .iter()
            .filter_map(|(topic, entries)| {
                entries
                    .iter()
                    .find(|entry| entry.agent_id == agent_id)
                    .map(|entry| (topic.clone(), entry.level))
            })
            .collect()
    }

    /// Validate a topic creation request: naming policy plus duplicate and
    /// private-type consistency checks.
    pub async fn validate_topic_creation(
        &self,
        name: &str,
        topic_type: TopicType,
        is_private: bool,
    ) -> Result<(), Vec<NameViolation>> {
        let report = validate_topic_name(name, Some(topic_type));
        let mut violations = report.violations;

        let permissions = self.permissions.lock().await;
        if permissions.contains_key(name) {
            violations.push(NameViolation::AlreadyExists(name.to_string()));
        }
        if is_private && topic_type != TopicType::Private {
            violations.push(NameViolation::PrivateTypeMismatch);
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}
