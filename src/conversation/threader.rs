//! Conversation threading and context windows
//!
//! Groups messages into time-bounded threads per topic and maintains a
//! bounded rolling context window per thread for response generation. A
//! message without an explicit thread id joins the most recently active
//! thread on its topic that is still inside the thread timeout, else a new
//! thread is started (first-writer-wins).

use crate::protocol::AgentMessage;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;
use tracing::{debug, info};

const DEFAULT_MAX_CONTEXT_MESSAGES: usize = 10;
const DEFAULT_THREAD_TIMEOUT_HOURS: i64 = 24;
const TITLE_MAX_LEN: usize = 50;

/// A conversation thread within a topic.
#[derive(Debug, Clone)]
pub struct ConversationThread {
    pub thread_id: Uuid,
    pub topic: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub participants: HashSet<String>,
    pub message_count: usize,
    pub is_active: bool,
}

/// Rolling generation context for a thread.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub thread_id: Uuid,
    pub topic: String,
    pub recent_messages: Vec<AgentMessage>,
    pub participants: HashSet<String>,
    pub thread_title: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// Summary counts over all threads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadStats {
    pub total_threads: usize,
    pub active_threads: usize,
    pub archived_threads: usize,
    pub total_messages: usize,
    pub threads_by_topic: HashMap<String, usize>,
    pub total_participants: usize,
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub archived_threads: usize,
    pub removed_contexts: usize,
    pub trimmed_messages: usize,
}

#[derive(Debug, Default)]
struct ThreaderState {
    threads: HashMap<Uuid, ConversationThread>,
    topic_threads: HashMap<String, Vec<Uuid>>,
    agent_threads: HashMap<String, HashSet<Uuid>>,
    thread_messages: HashMap<Uuid, Vec<AgentMessage>>,
    contexts: HashMap<Uuid, ConversationContext>,
}

/// Manages conversation threads and their context windows.
#[derive(Debug)]
pub struct ConversationThreader {
    max_context_messages: usize,
    thread_timeout: Duration,
    state: Mutex<ThreaderState>,
}

impl Default for ConversationThreader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationThreader {
    pub fn new() -> Self {
        Self::with_settings(
            DEFAULT_MAX_CONTEXT_MESSAGES,
            Duration::hours(DEFAULT_THREAD_TIMEOUT_HOURS),
        )
    }

    pub fn with_settings(max_context_messages: usize, thread_timeout: Duration) -> Self {
        Self {
            max_context_messages,
            thread_timeout,
            state: Mutex::new(ThreaderState::default()),
        }
    }

    /// Start a new thread seeded with an initial message.
    pub async fn create_thread(
        &self,
        topic: &str,
        initial_message: AgentMessage,
        title: Option<String>,
    ) -> ConversationThread {
        let mut state = self.state.lock().await;
        let thread = Self::insert_thread(&mut state, topic, initial_message, title, Uuid::new_v4());
        info!(thread_id = %thread.thread_id, topic, "created conversation thread");
        thread
    }

    fn insert_thread(
        state: &mut ThreaderState,
        topic: &str,
        initial_message: AgentMessage,
        title: Option<String>,
        thread_id: Uuid,
    ) -> ConversationThread {
        let title = title.or_else(|| Some(derive_title(&initial_message.content)));
        let thread = ConversationThread {
            thread_id,
            topic: topic.to_string(),
            title: title.clone(),
            created_at: Utc::now(),
            last_activity: initial_message.timestamp,
            participants: HashSet::from([initial_message.sender_id.clone()]),
            message_count: 1,
            is_active: true,
        };

        state.threads.insert(thread_id, thread.clone());
        state
            .topic_threads
            .entry(topic.to_string())
            .or_default()
            .push(thread_id);
        state
            .agent_threads
            .entry(initial_message.sender_id.clone())
            .or_default()
            .insert(thread_id);
        state.contexts.insert(
            thread_id,
            ConversationContext {
                thread_id,
                topic: topic.to_string(),
                recent_messages: vec![initial_message.clone()],
                participants: HashSet::from([initial_message.sender_id.clone()]),
                thread_title: title,
                last_activity: initial_message.timestamp,
            },
        );
        state.thread_messages.insert(thread_id, vec![initial_message]);
        thread
    }

    /// Append a message to a thread, returning the thread id it landed in.
    ///
    /// Without an explicit thread id, the most recently active open thread on
    /// the message's topic inside the timeout window is reused; otherwise a
    /// new thread is created. An explicit id that is unknown starts a thread
    /// under that id.
    pub async fn add_message(&self, message: AgentMessage, thread_id: Option<Uuid>) -> Uuid {
        let mut state = self.state.lock().await;
        let span = crate::conversation_span!(message_id = %message.id, topic = %message.topic);
        let _guard = span.enter();

        let thread_id = match thread_id {
            Some(id) => id,
            None => match Self::find_reusable_thread(&state, &message, self.thread_timeout) {
                Some(id) => id,
                None => {
                    let thread = Self::insert_thread(
                        &mut state,
                        &message.topic.clone(),
                        message,
                        None,
                        Uuid::new_v4(),
                    );
                    debug!(thread_id = %thread.thread_id, "no eligible thread, created new");
                    return thread.thread_id;
                }
            },
        };

        if !state.threads.contains_key(&thread_id) {
            let topic = message.topic.clone();
            let thread = Self::insert_thread(&mut state, &topic, message, None, thread_id);
            return thread.thread_id;
        }

        state
            .thread_messages
            .entry(thread_id)
            .or_default()
            .push(message.clone());

        if let Some(thread) = state.threads.get_mut(&thread_id) {
            thread.participants.insert(message.sender_id.clone());
            thread.message_count += 1;
            thread.last_activity = message.timestamp;
        }
        state
            .agent_threads
            .entry(message.sender_id.clone())
            .or_default()
            .insert(thread_id);

        if let Some(context) = state.contexts.get_mut(&thread_id) {
            context.recent_messages.push(message.clone());
            if context.recent_messages.len() > self.max_context_messages {
                let excess = context.recent_messages.len() - self.max_context_messages;
                context.recent_messages.drain(..excess);
            }
            context.participants.insert(message.sender_id.clone());
            context.last_activity = message.timestamp;
        }

        debug!(message_id = %message.id, thread_id = %thread_id, "added message to thread");
        thread_id
    }

    fn find_reusable_thread(
        state: &ThreaderState,
        message: &AgentMessage,
        timeout: Duration,
    ) -> Option<Uuid> {
        let now = Utc::now();
        state
            .topic_threads
            .get(&message.topic)?
            .iter()
            .filter_map(|id| state.threads.get(id))
            .filter(|thread| thread.is_active && now - thread.last_activity < timeout)
            .max_by_key(|thread| thread.last_activity)
            .map(|thread| thread.thread_id)
    }

    /// Rolling context window for a thread.
    pub async fn context(&self, thread_id: Uuid) -> Option<ConversationContext> {
        self.state.lock().await.contexts.get(&thread_id).cloned()
    }

    /// Messages in a thread, optionally limited to the most recent.
    pub async fn messages(&self, thread_id: Uuid, limit: Option<usize>) -> Vec<AgentMessage> {
        let state = self.state.lock().await;
        let messages = state
            .thread_messages
            .get(&thread_id)
            .cloned()
            .unwrap_or_default();
        match limit {
            Some(limit) if messages.len() > limit => {
                messages[messages.len() - limit..].to_vec()
            }
            _ => messages,
        }
    }

    pub async fn thread(&self, thread_id: Uuid) -> Option<ConversationThread> {
        self.state.lock().await.threads.get(&thread_id).cloned()
    }

    /// Mark a thread closed. Returns whether it existed.
    pub async fn close_thread(&self, thread_id: Uuid, closed_by: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(thread) = state.threads.get_mut(&thread_id) else {
            return false;
        };
        thread.is_active = false;
        info!(thread_id = %thread_id, closed_by, "closed thread");
        true
    }

    /// Mark threads idle beyond the timeout as inactive. Returns the count.
    pub async fn archive_stale(&self) -> usize {
        let mut state = self.state.lock().await;
        let cutoff = Utc::now() - self.thread_timeout;
        let mut archived = 0;
        for thread in state.threads.values_mut() {
            if thread.is_active && thread.last_activity < cutoff {
                thread.is_active = false;
                archived += 1;
            }
        }
        if archived > 0 {
            info!(archived, "archived stale threads");
        }
        archived
    }

    /// Case-insensitive thread search over titles and message bodies.
    ///
    /// Each thread is checked title first, then body, short-circuiting on the
    /// first hit.
    pub async fn search(
        &self,
        query: &str,
        topic: Option<&str>,
        agent_id: Option<&str>,
    ) -> Vec<ConversationThread> {
        let query = query.to_lowercase();
        let state = self.state.lock().await;

        let candidates: Vec<Uuid> = if let Some(topic) = topic {
            state.topic_threads.get(topic).cloned().unwrap_or_default()
        } else if let Some(agent_id) = agent_id {
            state
                .agent_threads
                .get(agent_id)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default()
        } else {
            state.threads.keys().copied().collect()
        };

        let mut matched = Vec::new();
        for id in candidates {
            let Some(thread) = state.threads.get(&id) else {
                continue;
            };
            let title_hit = thread
                .title
                .as_ref()
                .is_some_and(|title| title.to_lowercase().contains(&query));
            let body_hit = || {
                state
                    .thread_messages
                    .get(&id)
                    .is_some_and(|messages| {
                        messages
                            .iter()
                            .any(|m| m.content.to_lowercase().contains(&query))
                    })
            };
            if title_hit || body_hit() {
                matched.push(thread.clone());
            }
        }
        matched
    }

    /// Threads a given agent has participated in.
    pub async fn agent_threads(&self, agent_id: &str) -> Vec<ConversationThread> {
        let state = self.state.lock().await;
        state
            .agent_threads
            .get(agent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.threads.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Threads on a topic, in creation order.
    pub async fn topic_threads(&self, topic: &str) -> Vec<ConversationThread> {
        let state = self.state.lock().await;
        state
            .topic_threads
            .get(topic)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.threads.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> ThreadStats {
        let state = self.state.lock().await;
        let mut stats = ThreadStats {
            total_threads: state.threads.len(),
            total_participants: state.agent_threads.len(),
            total_messages: state.thread_messages.values().map(Vec::len).sum(),
            ..Default::default()
        };
        for thread in state.threads.values() {
            if thread.is_active {
                stats.active_threads += 1;
            } else {
                stats.archived_threads += 1;
            }
            *stats
                .threads_by_topic
                .entry(thread.topic.clone())
                .or_default() += 1;
        }
        stats
    }

    /// Archive stale threads, drop contexts of inactive threads, and trim
    /// message lists that grew well past the context window.
    pub async fn cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport {
            archived_threads: self.archive_stale().await,
            ..Default::default()
        };

        let mut state = self.state.lock().await;
        let inactive: Vec<Uuid> = state
            .threads
            .values()
            .filter(|t| !t.is_active)
            .map(|t| t.thread_id)
            .collect();
        for id in inactive {
            if state.contexts.remove(&id).is_some() {
                report.removed_contexts += 1;
            }
        }

        let cap = self.max_context_messages;
        for messages in state.thread_messages.values_mut() {
            if messages.len() > cap * 2 {
                let excess = messages.len() - cap;
                messages.drain(..excess);
                report.trimmed_messages += excess;
            }
        }
        report
    }
}

/// Derive a thread title from message content, truncated to 50 characters.
fn derive_title(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() <= TITLE_MAX_LEN {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(TITLE_MAX_LEN - 3).collect();
        format!("{truncated}...")
    }
}
