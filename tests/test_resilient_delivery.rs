//! Delivery coordinator behavior under failure: retry budgets, backoff
//! growth, classification gating, and recovery through the agent.

use agentmesh::config::{AgentSection, MeshConfig};
use agentmesh::delivery::{
    DeliveryCoordinator, DeliveryError, ErrorKind, RetryPolicy, RetryStrategy,
};
use agentmesh::llm::EchoResponder;
use agentmesh::testing::{text_message, MockTransport};
use agentmesh::MeshAgent;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct FlakyError(&'static str);

impl fmt::Display for FlakyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for FlakyError {}

#[tokio::test(start_paused = true)]
async fn exhausted_budget_records_every_attempt() {
    let coordinator = DeliveryCoordinator::new(RetryPolicy {
        max_retries: 3,
        strategy: RetryStrategy::ExponentialBackoff,
        ..Default::default()
    });
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = coordinator
        .execute("deliver", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(FlakyError("connection refused by broker")) }
        })
        .await;

    // One initial attempt plus three retries, never a fourth retry
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert!(matches!(
        result,
        Err(DeliveryError::Exhausted { attempts: 4, .. })
    ));

    let errors = coordinator.recent_errors(10).await;
    assert_eq!(errors.len(), 4);
    assert!(errors[..3].iter().all(|e| e.will_retry));
    assert!(!errors[3].will_retry);
}

#[tokio::test(start_paused = true)]
async fn exponential_delays_grow_and_stay_within_jitter() {
    let coordinator = DeliveryCoordinator::new(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_secs(1),
        multiplier: 2.0,
        strategy: RetryStrategy::ExponentialBackoff,
        ..Default::default()
    });

    let _: Result<(), _> = coordinator
        .execute("deliver", || async { Err(FlakyError("network unreachable")) })
        .await;

    let retries = coordinator.retry_history(10).await;
    assert_eq!(retries.len(), 3);

    let expected = [1.0f64, 2.0, 4.0];
    for (attempt, base_secs) in retries.iter().zip(expected) {
        let secs = attempt.delay.as_secs_f64();
        assert!(
            secs >= base_secs * 0.9 && secs <= base_secs * 1.1,
            "delay {secs}s outside jitter band around {base_secs}s"
        );
    }
}

#[tokio::test]
async fn validation_failures_never_retry() {
    let coordinator = DeliveryCoordinator::default();
    let attempts = AtomicU32::new(0);

    let result: Result<(), _> = coordinator
        .execute("deliver", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(FlakyError("invalid payload schema")) }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(matches!(
        result,
        Err(DeliveryError::NonRetryable {
            kind: ErrorKind::Validation,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn custom_retryable_set_widens_the_policy() {
    let mut policy = RetryPolicy {
        max_retries: 1,
        strategy: RetryStrategy::Immediate,
        ..Default::default()
    };
    policy.retryable.insert(ErrorKind::Provider);
    let coordinator = DeliveryCoordinator::new(policy);
    let attempts = AtomicU32::new(0);

    let _: Result<(), _> = coordinator
        .execute("generate", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(FlakyError("openai rate limit")) }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_transport_failure_recovers_through_the_agent() {
    let config = MeshConfig {
        agent: AgentSection {
            id: "hub".to_string(),
            name: "Hub".to_string(),
            role: "coordinator".to_string(),
            description: String::new(),
            capabilities: vec![],
        },
        conversation: Default::default(),
        retry: Default::default(),
    };
    let transport = Arc::new(MockTransport::new());
    let agent = MeshAgent::new(config, Arc::clone(&transport), Arc::new(EchoResponder));
    agent.start().await.unwrap();

    transport.fail_next(2, "broker connection reset");
    agent
        .send_message(text_message("hub", "ops", "eventually delivered"))
        .await
        .unwrap();

    assert_eq!(transport.publish_count(), 1);
    let stats = agent.coordinator().error_stats().await;
    assert_eq!(stats.total_errors, 2);
    assert_eq!(stats.errors_by_kind.get("network"), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn delivery_failure_surfaces_after_budget() {
    let config = MeshConfig {
        agent: AgentSection {
            id: "hub".to_string(),
            name: "Hub".to_string(),
            role: "coordinator".to_string(),
            description: String::new(),
            capabilities: vec![],
        },
        conversation: Default::default(),
        retry: Default::default(),
    };
    let transport = Arc::new(MockTransport::new());
    let agent = MeshAgent::new(config, Arc::clone(&transport), Arc::new(EchoResponder));
    agent.start().await.unwrap();

    // Default budget is 1 + 3 attempts; fail more than that
    transport.fail_next(10, "broker connection reset");
    let result = agent
        .send_message(text_message("hub", "ops", "never arrives"))
        .await;

    assert!(result.is_err());
    assert_eq!(transport.publish_count(), 0);
    assert_eq!(agent.coordinator().recent_errors(10).await.len(), 4);
}
