//! Dispatcher error taxonomy
//!
//! Every failure inside a handler or a lifecycle transition is converted into an
//! error [`CommandResult`](crate::execution::command::CommandResult) and delivered
//! through the egress path. Only envelope encode/decode failures inside the
//! dispatcher's own infrastructure are logged and swallowed.

use thiserror::Error;

/// Dispatcher error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Inbound command or notification message could not be decoded
    #[error("unable to decode message: {0}")]
    Decode(String),

    /// Outbound result could not be encoded
    #[error("unable to encode result id={id}: {reason}")]
    Encode { id: String, reason: String },

    /// Start options were malformed or missing required fields
    #[error("{0}")]
    Config(String),

    /// Start options were well-formed but named an unsupported value
    #[error("{0}")]
    InvalidConfig(String),

    /// No handler registered for the requested package/function
    #[error("{0}")]
    HandlerNotFound(HandlerMiss),

    /// The invoked handler itself failed
    #[error("{0}")]
    HandlerExecution(String),

    /// Releasing session resources failed during stop
    #[error("{0}")]
    Teardown(String),

    /// A dispatcher queue was closed while sending
    #[error("{0} channel closed")]
    ChannelClosed(&'static str),
}

/// The three user-facing routing misses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerMiss {
    /// A start request arrived while a session is active
    AlreadyStarted,
    /// A stop request arrived while no session exists
    NotRunning,
    /// Any other unknown package/function pair
    Unknown,
}

impl std::fmt::Display for HandlerMiss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerMiss::AlreadyStarted => write!(f, "Agent already started"),
            HandlerMiss::NotRunning => write!(f, "Agent not running"),
            HandlerMiss::Unknown => write!(f, "unknown package/function"),
        }
    }
}

impl DispatchError {
    /// Shorthand for a start-option decoding failure
    pub fn config(message: impl Into<String>) -> Self {
        DispatchError::Config(message.into())
    }

    /// Shorthand for an unsupported start-option value
    pub fn invalid_config(message: impl Into<String>) -> Self {
        DispatchError::InvalidConfig(message.into())
    }

    /// Shorthand for a teardown failure
    pub fn teardown(message: impl Into<String>) -> Self {
        DispatchError::Teardown(message.into())
    }
}

/// Result type alias for DispatchError
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_render_bare_message() {
        let err = DispatchError::invalid_config("unsupported transport : smtp");
        assert_eq!(err.to_string(), "unsupported transport : smtp");

        let err = DispatchError::config("invalid type: string, expected a sequence");
        assert_eq!(err.to_string(), "invalid type: string, expected a sequence");
    }

    #[test]
    fn test_handler_miss_messages() {
        assert_eq!(
            DispatchError::HandlerNotFound(HandlerMiss::AlreadyStarted).to_string(),
            "Agent already started"
        );
        assert_eq!(
            DispatchError::HandlerNotFound(HandlerMiss::NotRunning).to_string(),
            "Agent not running"
        );
    }

    #[test]
    fn test_encode_error_carries_id() {
        let err = DispatchError::Encode {
            id: "abc".to_string(),
            reason: "key must be a string".to_string(),
        };
        assert!(err.to_string().contains("id=abc"));
    }
}
