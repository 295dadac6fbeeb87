//! Resilient delivery: error classification, retry policies, and history.

pub mod classify;
pub mod coordinator;

pub use classify::{classify_error, ErrorKind};
pub use coordinator::{
    DeliveryCoordinator, DeliveryError, ErrorRecord, ErrorStats, RetryAttempt, RetryPolicy,
    RetryStrategy,
};
