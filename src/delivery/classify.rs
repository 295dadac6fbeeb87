//! Error classification for retry decisions
//!
//! Maps arbitrary errors onto a small taxonomy so the delivery coordinator
//! can decide whether a failure is worth retrying. Classification is
//! heuristic: it looks at the error's type name and display text, and falls
//! back to [`ErrorKind::Unknown`] when nothing matches.

use serde::{Deserialize, Serialize};

/// Broad failure category used by retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Transport,
    Provider,
    Validation,
    Permission,
    Timeout,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Transport => "transport",
            Self::Provider => "provider",
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an error by its type name and display text.
pub fn classify_error<E: std::error::Error + ?Sized>(error: &E) -> ErrorKind {
    classify_text(&error.to_string(), std::any::type_name::<E>())
}

fn classify_text(message: &str, type_name: &str) -> ErrorKind {
    let haystack = format!("{} {}", type_name, message).to_lowercase();
    let contains_any =
        |needles: &[&str]| needles.iter().any(|needle| haystack.contains(needle));

    // Timeouts first: "connection timed out" is a timeout, not a network fault
    if contains_any(&["timed out", "timeout", "deadline exceeded"]) {
        ErrorKind::Timeout
    } else if contains_any(&[
        "connection",
        "network",
        "unreachable",
        "refused",
        "dns",
        "socket",
    ]) {
        ErrorKind::Network
    } else if contains_any(&["broker", "transport", "publish", "producer", "consumer"]) {
        ErrorKind::Transport
    } else if contains_any(&["openai", "anthropic", "llm", "provider", "rate limit", "api error"]) {
        ErrorKind::Provider
    } else if contains_any(&["validation", "invalid", "malformed", "schema", "parse"]) {
        ErrorKind::Validation
    } else if contains_any(&["permission", "unauthorized", "forbidden", "access denied"]) {
        ErrorKind::Permission
    } else {
        ErrorKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct TextError(String);

    impl fmt::Display for TextError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    impl std::error::Error for TextError {}

    fn classify(message: &str) -> ErrorKind {
        classify_error(&TextError(message.to_string()))
    }

    #[test]
    fn test_timeout_beats_network() {
        assert_eq!(classify("connection timed out"), ErrorKind::Timeout);
        assert_eq!(classify("request timeout after 30s"), ErrorKind::Timeout);
    }

    #[test]
    fn test_network_errors() {
        assert_eq!(classify("connection refused"), ErrorKind::Network);
        assert_eq!(classify("host unreachable"), ErrorKind::Network);
        assert_eq!(classify("DNS lookup failed"), ErrorKind::Network);
    }

    #[test]
    fn test_transport_errors() {
        assert_eq!(classify("broker rejected the batch"), ErrorKind::Transport);
        assert_eq!(classify("publish failed: queue full"), ErrorKind::Transport);
    }

    #[test]
    fn test_provider_errors() {
        assert_eq!(classify("OpenAI rate limit reached"), ErrorKind::Provider);
        assert_eq!(classify("llm returned empty choices"), ErrorKind::Provider);
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(classify("invalid message payload"), ErrorKind::Validation);
        assert_eq!(classify("schema mismatch on field x"), ErrorKind::Validation);
    }

    #[test]
    fn test_permission_errors() {
        assert_eq!(classify("unauthorized topic access"), ErrorKind::Permission);
        assert_eq!(classify("access denied for agent"), ErrorKind::Permission);
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(classify("something odd happened"), ErrorKind::Unknown);
    }

    #[test]
    fn test_type_name_contributes() {
        #[derive(Debug)]
        struct NetworkError;
        impl fmt::Display for NetworkError {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("it broke")
            }
        }
        impl std::error::Error for NetworkError {}

        assert_eq!(classify_error(&NetworkError), ErrorKind::Network);
    }
}
