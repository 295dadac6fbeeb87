//! Message routing: filter evaluation, subscription registry, and rule engine
//!
//! Routing decides which subscribers receive a message and which additional
//! topics it fans out to. The three pieces layer bottom-up: the filter
//! evaluator is pure predicate logic, the subscription registry applies it per
//! subscriber, and the rule engine computes fan-out targets independently of
//! subscriptions.

pub mod filter;
pub mod rules;
pub mod subscriptions;

pub use filter::{FilterError, MessagePredicate, PredicateError, SubscriptionFilter};
pub use rules::{
    ConditionSpec, MessageRouter, RouteRecord, RoutingRule, RoutingStats, RuleCondition, RuleSpec,
};
pub use subscriptions::{
    SubscriptionKind, SubscriptionRegistry, SubscriptionStats, TopicSubscription,
};
