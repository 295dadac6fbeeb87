//! Conversation threading through the agent: thread reuse, reply context,
//! and window bounds.

use agentmesh::config::{AgentSection, ConversationSection, MeshConfig};
use agentmesh::protocol::MessageKind;
use agentmesh::testing::{text_message, MockResponder, MockTransport};
use agentmesh::MeshAgent;
use std::sync::Arc;

fn config(context_window: usize) -> MeshConfig {
    MeshConfig {
        agent: AgentSection {
            id: "hub".to_string(),
            name: "Hub".to_string(),
            role: "coordinator".to_string(),
            description: String::new(),
            capabilities: vec![],
        },
        conversation: ConversationSection {
            max_context_messages: context_window,
            thread_timeout_hours: 24,
        },
        retry: Default::default(),
    }
}

fn mesh(context_window: usize) -> (MeshAgent<MockTransport>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let agent = MeshAgent::new(
        config(context_window),
        Arc::clone(&transport),
        Arc::new(MockResponder::new("on it")),
    );
    (agent, transport)
}

#[tokio::test]
async fn consecutive_topic_traffic_shares_one_thread() {
    let (agent, _) = mesh(10);
    agent.start().await.unwrap();

    let first = agent
        .send_message(text_message("hub", "research", "kicking off the review"))
        .await
        .unwrap();
    let second = agent
        .send_message(text_message("hub", "research", "adding more notes"))
        .await
        .unwrap();
    assert_eq!(first, second);

    let thread = agent.threader().thread(first).await.unwrap();
    assert_eq!(thread.message_count, 2);
    assert_eq!(thread.title.as_deref(), Some("kicking off the review"));
}

#[tokio::test]
async fn separate_topics_get_separate_threads() {
    let (agent, _) = mesh(10);
    agent.start().await.unwrap();

    let research = agent
        .send_message(text_message("hub", "research", "notes"))
        .await
        .unwrap();
    let ops = agent
        .send_message(text_message("hub", "ops", "status"))
        .await
        .unwrap();
    assert_ne!(research, ops);

    let stats = agent.threader().stats().await;
    assert_eq!(stats.total_threads, 2);
    assert_eq!(stats.threads_by_topic.get("research"), Some(&1));
}

#[tokio::test]
async fn query_reply_lands_in_the_same_thread() {
    let (agent, transport) = mesh(10);
    agent.start().await.unwrap();

    let mut query = text_message("peer-1", "ops", "what is the rollout status?");
    query.kind = MessageKind::Query;

    let reply = agent.handle_message(query).await.unwrap().unwrap();
    assert_eq!(reply.content, "on it");
    assert_eq!(reply.kind, MessageKind::Response);

    // Both the query and the reply are in one thread
    let stats = agent.threader().stats().await;
    assert_eq!(stats.total_threads, 1);
    assert_eq!(stats.total_messages, 2);
    assert_eq!(transport.publish_count(), 1);
}

#[tokio::test]
async fn long_titles_are_truncated() {
    let (agent, _) = mesh(10);
    agent.start().await.unwrap();

    let content = "a".repeat(80);
    let thread_id = agent
        .send_message(text_message("hub", "ops", &content))
        .await
        .unwrap();

    let thread = agent.threader().thread(thread_id).await.unwrap();
    let title = thread.title.unwrap();
    assert_eq!(title.chars().count(), 50);
    assert!(title.ends_with("..."));
}

#[tokio::test]
async fn context_window_stays_bounded_while_history_grows() {
    let (agent, _) = mesh(3);
    agent.start().await.unwrap();

    let mut thread_id = None;
    for i in 0..7 {
        let id = agent
            .send_message(text_message("hub", "ops", &format!("update {i}")))
            .await
            .unwrap();
        thread_id = Some(id);
    }
    let thread_id = thread_id.unwrap();

    let context = agent.threader().context(thread_id).await.unwrap();
    assert_eq!(context.recent_messages.len(), 3);
    assert_eq!(context.recent_messages[2].content, "update 6");

    let full = agent.threader().messages(thread_id, None).await;
    assert_eq!(full.len(), 7);
}

#[tokio::test]
async fn closed_threads_do_not_accept_new_traffic() {
    let (agent, _) = mesh(10);
    agent.start().await.unwrap();

    let first = agent
        .send_message(text_message("hub", "ops", "before close"))
        .await
        .unwrap();
    assert!(agent.threader().close_thread(first, "hub").await);

    let second = agent
        .send_message(text_message("hub", "ops", "after close"))
        .await
        .unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn search_spans_titles_and_bodies() {
    let (agent, _) = mesh(10);
    agent.start().await.unwrap();

    agent
        .send_message(text_message("hub", "ops", "Deployment window planning"))
        .await
        .unwrap();
    agent
        .send_message(text_message("hub", "research", "unrelated kickoff"))
        .await
        .unwrap();
    agent
        .send_message(text_message("hub", "research", "we should discuss the deployment"))
        .await
        .unwrap();

    let hits = agent.threader().search("deployment", None, None).await;
    assert_eq!(hits.len(), 2);

    let scoped = agent.threader().search("deployment", Some("ops"), None).await;
    assert_eq!(scoped.len(), 1);
}
