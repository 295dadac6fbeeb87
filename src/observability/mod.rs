//! Observability: structured logging setup and span helpers.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{conversation_span, delivery_span, routing_span};
