//! Resilient delivery: retry policies and the delivery coordinator
//!
//! The coordinator wraps fallible async operations in a retry loop driven by
//! a [`RetryPolicy`]. Failures are classified (see [`crate::delivery::classify`]),
//! only retryable kinds are re-attempted, and every failure and retry is kept
//! in bounded history buffers for inspection.

use super::classify::{classify_error, ErrorKind};
use crate::protocol::AgentMessage;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, warn, Instrument};

const MAX_HISTORY: usize = 1000;

/// How retry delays grow between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Immediate,
    FixedDelay,
    LinearBackoff,
    ExponentialBackoff,
}

/// Retry behavior for a class of operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub strategy: RetryStrategy,
    pub retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            strategy: RetryStrategy::ExponentialBackoff,
            retryable: HashSet::from([ErrorKind::Network, ErrorKind::Timeout, ErrorKind::Transport]),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay before the given retry (1-based), jittered by up to 10% in
    /// either direction. `max_delay` is a hard cap, applied after jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = match self.strategy {
            RetryStrategy::Immediate => return Duration::ZERO,
            RetryStrategy::FixedDelay => self.base_delay,
            RetryStrategy::LinearBackoff => self.base_delay.saturating_mul(retry.max(1)),
            RetryStrategy::ExponentialBackoff => {
                let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
                self.base_delay.mul_f64(factor)
            }
        };
        let jitter = rand::rng().random_range(0.9..=1.1);
        base.mul_f64(jitter).min(self.max_delay)
    }
}

/// A recorded failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
    pub attempt: u32,
    pub will_retry: bool,
}

/// A recorded retry, including the delay that preceded it.
#[derive(Debug, Clone, Serialize)]
pub struct RetryAttempt {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub attempt: u32,
    #[serde(skip)]
    pub delay: Duration,
    pub kind: ErrorKind,
}

/// Aggregate counts over recorded failures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    pub total_errors: u64,
    pub total_retries: u64,
    pub errors_by_kind: HashMap<String, u64>,
    pub errors_by_operation: HashMap<String, u64>,
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Error)]
pub enum DeliveryError<E: std::error::Error + 'static> {
    #[error("{operation} failed after {attempts} attempts")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },
    #[error("{operation} failed with non-retryable {kind} error")]
    NonRetryable {
        operation: String,
        kind: ErrorKind,
        #[source]
        source: E,
    },
    #[error("{operation} cancelled by shutdown")]
    Cancelled { operation: String },
}

impl<E: std::error::Error + 'static> DeliveryError<E> {
    /// The underlying error, if the operation was actually attempted.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => Some(source),
            Self::Cancelled { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct CoordinatorState {
    errors: VecDeque<ErrorRecord>,
    retries: VecDeque<RetryAttempt>,
}

/// Drives retry loops and keeps bounded failure history.
#[derive(Debug)]
pub struct DeliveryCoordinator {
    policy: RetryPolicy,
    shutdown: Option<watch::Receiver<bool>>,
    state: Mutex<CoordinatorState>,
}

impl Default for DeliveryCoordinator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl DeliveryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            shutdown: None,
            state: Mutex::new(CoordinatorState::default()),
        }
    }

    /// Attach a shutdown signal; a `true` value aborts the retry loop, even
    /// mid-backoff.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` up to `1 + max_retries` times.
    ///
    /// Non-retryable failures abort immediately. Between attempts the policy
    /// delay is slept; the shutdown signal aborts the loop even while the
    /// backoff sleep is in flight.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        mut f: F,
    ) -> Result<T, DeliveryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let span = crate::delivery_span!(operation);
        async {
            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                match f().await {
                    Ok(value) => {
                        if attempt > 1 {
                            debug!(operation, attempt, "operation succeeded after retry");
                        }
                        return Ok(value);
                    }
                    Err(err) => {
                        let kind = classify_error(&err);
                        let retryable = self.policy.is_retryable(kind);
                        let retries_left = attempt <= self.policy.max_retries;
                        let will_retry = retryable && retries_left;
                        self.record_error(operation, kind, &err, attempt, will_retry)
                            .await;

                        if !retryable {
                            warn!(operation, %kind, "non-retryable error, aborting");
                            return Err(DeliveryError::NonRetryable {
                                operation: operation.to_string(),
                                kind,
                                source: err,
                            });
                        }
                        if !retries_left {
                            error!(operation, attempts = attempt, "retries exhausted");
                            return Err(DeliveryError::Exhausted {
                                operation: operation.to_string(),
                                attempts: attempt,
                                source: err,
                            });
                        }

                        let delay = self.policy.delay_for(attempt);
                        self.record_retry(operation, attempt, delay, kind).await;
                        debug!(operation, attempt, delay_ms = delay.as_millis() as u64, "retrying");
                        if self.backoff_cancelled(delay).await {
                            return Err(DeliveryError::Cancelled {
                                operation: operation.to_string(),
                            });
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Retry a message delivery, driving the message's own retry budget.
    ///
    /// Unlike [`execute`](Self::execute), attempts are bounded by the
    /// message's `max_retries`, and `retry_count` is advanced on the message
    /// so the budget survives re-delivery through other paths.
    pub async fn execute_message<T, E, F, Fut>(
        &self,
        operation: &str,
        message: &mut AgentMessage,
        mut f: F,
    ) -> Result<T, DeliveryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let span = crate::delivery_span!(operation);
        async {
            loop {
                let attempt = message.retry_count + 1;
                match f().await {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        let kind = classify_error(&err);
                        let retryable = self.policy.is_retryable(kind);
                        let will_retry = retryable && message.should_retry();
                        self.record_error(operation, kind, &err, attempt, will_retry)
                            .await;

                        if !retryable {
                            return Err(DeliveryError::NonRetryable {
                                operation: operation.to_string(),
                                kind,
                                source: err,
                            });
                        }
                        if !message.should_retry() {
                            error!(
                                operation,
                                message_id = %message.id,
                                attempts = attempt,
                                "message retry budget exhausted"
                            );
                            return Err(DeliveryError::Exhausted {
                                operation: operation.to_string(),
                                attempts: attempt,
                                source: err,
                            });
                        }

                        *message = message.increment_retry();
                        let delay = self.policy.delay_for(message.retry_count);
                        self.record_retry(operation, attempt, delay, kind).await;
                        if self.backoff_cancelled(delay).await {
                            return Err(DeliveryError::Cancelled {
                                operation: operation.to_string(),
                            });
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Sleep out the backoff delay unless the shutdown signal fires first.
    /// Returns true when the retry loop must abort.
    async fn backoff_cancelled(&self, delay: Duration) -> bool {
        let Some(signal) = &self.shutdown else {
            tokio::time::sleep(delay).await;
            return false;
        };
        let mut signal = signal.clone();
        if *signal.borrow() {
            return true;
        }
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = signal.changed() => {
                    // A closed channel means shutdown can no longer fire.
                    if changed.is_err() {
                        sleep.await;
                        return false;
                    }
                    if *signal.borrow() {
                        return true;
                    }
                }
            }
        }
    }

    async fn record_error<E: std::error::Error + ?Sized>(
        &self,
        operation: &str,
        kind: ErrorKind,
        err: &E,
        attempt: u32,
        will_retry: bool,
    ) {
        let mut state = self.state.lock().await;
        state.errors.push_back(ErrorRecord {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            kind,
            message: err.to_string(),
            attempt,
            will_retry,
        });
        if state.errors.len() > MAX_HISTORY {
            state.errors.pop_front();
        }
    }

    async fn record_retry(&self, operation: &str, attempt: u32, delay: Duration, kind: ErrorKind) {
        let mut state = self.state.lock().await;
        state.retries.push_back(RetryAttempt {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            attempt,
            delay,
            kind,
        });
        if state.retries.len() > MAX_HISTORY {
            state.retries.pop_front();
        }
    }

    /// Most recent failures, newest last.
    pub async fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        let state = self.state.lock().await;
        state
            .errors
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    /// Most recent retries, newest last.
    pub async fn retry_history(&self, limit: usize) -> Vec<RetryAttempt> {
        let state = self.state.lock().await;
        state
            .retries
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    pub async fn error_stats(&self) -> ErrorStats {
        let state = self.state.lock().await;
        let mut stats = ErrorStats {
            total_errors: state.errors.len() as u64,
            total_retries: state.retries.len() as u64,
            ..Default::default()
        };
        for record in &state.errors {
            *stats
                .errors_by_kind
                .entry(record.kind.as_str().to_string())
                .or_default() += 1;
            *stats
                .errors_by_operation
                .entry(record.operation.clone())
                .or_default() += 1;
        }
        stats
    }

    pub async fn clear_history(&self) {
        let mut state = self.state.lock().await;
        state.errors.clear();
        state.retries.clear();
    }
}
